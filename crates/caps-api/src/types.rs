use std::path::PathBuf;

use caps_types::{AnalysisStatus, BoundState, Dim, Fixed, NullState, ObjectType, SubType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use value_codec::WireValue;

/// Opaque handle to a CAPS object.
/// Valid only while the object (and its Problem) is alive in the API that
/// issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjHandle(pub(crate) usize);

impl ObjHandle {
    #[cfg(feature = "native")]
    pub(crate) fn from_ptr<T>(ptr: *mut T) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(ObjHandle(ptr as usize))
        }
    }

    #[cfg(feature = "native")]
    pub(crate) fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

/// What a Problem is initialized from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProblemSource {
    /// An OpenCSM script; the Problem is parametric.
    Csm(PathBuf),
    /// A static EGADS model.
    Egads(PathBuf),
    /// Reload the Problem previously saved in the problem directory.
    Restart,
}

/// Who last touched an object, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerInfo {
    pub process: String,
    pub pid: String,
    pub user: String,
    pub stamp: Option<DateTime<Utc>>,
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub name: String,
    pub otype: ObjectType,
    pub stype: SubType,
    /// The object is the target of a linkage.
    pub linked: bool,
    pub parent: Option<ObjHandle>,
    pub owner: OwnerInfo,
}

/// A value payload as `getValue`/`setValue` exchange it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawValue {
    pub wire: WireValue,
    pub units: Option<String>,
}

impl RawValue {
    pub fn new(wire: WireValue, units: Option<String>) -> Self {
        Self { wire, units }
    }
}

/// Shape rules attached to a Value object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueProps {
    pub dim: Dim,
    /// The value is a geometric design parameter with sensitivities.
    pub geometry_parameter: bool,
    pub length: Fixed,
    pub shape: Fixed,
    pub null: NullState,
}

/// Arguments to `makeAnalysis`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSpec {
    /// Name of the AIM plugin.
    pub aim: String,
    /// Instance name; defaults to the AIM name.
    pub name: Option<String>,
    pub unit_system: Option<String>,
    /// `;`-separated intent phrases.
    pub intent: Option<String>,
    /// Requested execution mode: 0 leaves execution to the caller.
    pub execution: i32,
}

impl AnalysisSpec {
    pub fn new(aim: impl Into<String>) -> Self {
        Self {
            aim: aim.into(),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unit_system(mut self, units: impl Into<String>) -> Self {
        self.unit_system = Some(units.into());
        self
    }

    /// Intent phrases are joined with `;`.
    pub fn intent<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined: Vec<String> = phrases.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.intent = if joined.is_empty() {
            None
        } else {
            Some(joined.join(";"))
        };
        self
    }
}

/// Result of `queryAnalysis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisQuery {
    pub inputs: usize,
    pub outputs: usize,
    pub execution: i32,
}

/// A field an AIM can provide on a Bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInfo {
    pub directory: PathBuf,
    pub unit_system: Option<String>,
    pub intent: Option<String>,
    pub parents: Vec<ObjHandle>,
    pub fields: Vec<FieldInfo>,
    pub execution: i32,
    pub status: AnalysisStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundInfo {
    pub state: BoundState,
    pub dim: usize,
    /// Parametric limits, two per dimension.
    pub limits: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexSetInfo {
    pub geometry_points: usize,
    pub data_points: usize,
    pub bound: ObjHandle,
    /// `None` for an unconnected VertexSet.
    pub analysis: Option<ObjHandle>,
}

/// Point data of a DataSet, `rank` values per point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSetData {
    pub npts: usize,
    pub rank: usize,
    pub data: Vec<f64>,
    pub units: Option<String>,
}

impl DataSetData {
    /// The data split into one slice per point.
    pub fn points(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks(self.rank.max(1))
    }
}

/// Sensitivity of a value with respect to one geometric parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DotInfo {
    pub len: usize,
    pub rank: usize,
    pub dot: Vec<f64>,
}
