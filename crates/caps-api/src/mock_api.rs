//! MockCaps: deterministic in-memory test double implementing CapsApi.
//!
//! Objects live in a handle-keyed map. Values follow the library's rules
//! for fixed shapes, null handling, limits and unit scaling; analyses move
//! through the same dirty/clean states; Bounds follow the open/complete
//! sequence. AIMs are registered up front as [`MockAim`] descriptions.
//! Used by caps-session for all wrapper tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use caps_types::status::*;
use caps_types::{
    AnalysisStatus, BoundState, CapsError, DataMethod, Dim, Fixed, NullState, ObjectType, SubType,
    TransferMethod, ValueType,
};
use caps_units::{BuiltinUnits, UnitSystem};
use chrono::Utc;
use tracing::debug;
use value_codec::{decode, encode, Limits, Value, WireData, WireValue};

use crate::traits::CapsApi;
use crate::types::*;

const MOCK_REVISION: (i32, i32) = (1, 22);

/// Name reserved for the coordinates DataSet every VertexSet carries.
const XYZ: &str = "xyz";

const GEOMETRY_FORMATS: &[&str] = &["egads", "iges", "igs", "step", "stp", "brep"];

fn err(code: i32) -> CapsError {
    CapsError::new(code)
}

type PostFn = dyn Fn(&BTreeMap<String, Value>) -> Result<BTreeMap<String, Value>, CapsError>;
type BackdoorFn = dyn Fn(&str) -> Result<String, CapsError>;

struct MockInput {
    name: String,
    value: Value,
    units: Option<String>,
    fixed: bool,
}

struct MockOutput {
    name: String,
    units: Option<String>,
}

/// Description of an Analysis Interface Module for [`MockCaps`].
///
/// Inputs carry default values; outputs start null and are filled from
/// whatever the `on_post` closure returns for them.
pub struct MockAim {
    name: String,
    inputs: Vec<MockInput>,
    outputs: Vec<MockOutput>,
    fields: Vec<FieldInfo>,
    execution: i32,
    discretization: usize,
    post: Option<Box<PostFn>>,
    backdoor: Option<Box<BackdoorFn>>,
}

impl MockAim {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            fields: Vec::new(),
            execution: 0,
            discretization: 0,
            post: None,
            backdoor: None,
        }
    }

    /// Input whose length and shape may change.
    pub fn input(mut self, name: impl Into<String>, value: impl Into<Value>, units: Option<&str>) -> Self {
        self.inputs.push(MockInput {
            name: name.into(),
            value: value.into(),
            units: units.map(str::to_string),
            fixed: false,
        });
        self
    }

    /// Input with fixed length and shape.
    pub fn fixed_input(mut self, name: impl Into<String>, value: impl Into<Value>, units: Option<&str>) -> Self {
        self.inputs.push(MockInput {
            name: name.into(),
            value: value.into(),
            units: units.map(str::to_string),
            fixed: true,
        });
        self
    }

    pub fn output(mut self, name: impl Into<String>, units: Option<&str>) -> Self {
        self.outputs.push(MockOutput {
            name: name.into(),
            units: units.map(str::to_string),
        });
        self
    }

    /// Field data the AIM can provide on a Bound.
    pub fn field(mut self, name: impl Into<String>, rank: usize) -> Self {
        self.fields.push(FieldInfo {
            name: name.into(),
            rank,
        });
        self
    }

    pub fn execution(mut self, mode: i32) -> Self {
        self.execution = mode;
        self
    }

    /// Points this AIM places in each connected VertexSet.
    pub fn discretization(mut self, points: usize) -> Self {
        self.discretization = points;
        self
    }

    /// Compute outputs from the current inputs during post-analysis.
    pub fn on_post<F>(mut self, f: F) -> Self
    where
        F: Fn(&BTreeMap<String, Value>) -> Result<BTreeMap<String, Value>, CapsError> + 'static,
    {
        self.post = Some(Box::new(f));
        self
    }

    pub fn on_backdoor<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<String, CapsError> + 'static,
    {
        self.backdoor = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for MockAim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockAim")
            .field("name", &self.name)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("fields", &self.fields)
            .finish()
    }
}

// ── Object storage ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct MockValue {
    vtype: ValueType,
    nrow: usize,
    ncol: usize,
    data: WireData,
    partial: Option<Vec<NullState>>,
    null: NullState,
    units: Option<String>,
    limits: Option<Limits>,
    dim: Dim,
    length: Fixed,
    shape: Fixed,
    geometry_parameter: bool,
    link: Option<(ObjHandle, TransferMethod)>,
    dots: BTreeMap<String, DotInfo>,
}

impl MockValue {
    fn from_raw(raw: &RawValue) -> Self {
        let w = &raw.wire;
        let null = if w.is_null() {
            NullState::IsNull
        } else if w.partial.is_some() {
            NullState::IsPartial
        } else {
            NullState::NotNull
        };
        Self {
            vtype: w.vtype,
            nrow: w.nrow,
            ncol: w.ncol,
            data: w.data.clone(),
            partial: w.partial.clone(),
            null,
            units: raw.units.clone(),
            limits: None,
            dim: Dim::of_shape(w.nrow, w.ncol),
            length: Fixed::Change,
            shape: Fixed::Change,
            geometry_parameter: false,
            link: None,
            dots: BTreeMap::new(),
        }
    }

    fn doubles(nrow: usize, ncol: usize, data: Vec<f64>) -> Self {
        Self::from_raw(&RawValue::new(
            WireValue {
                vtype: ValueType::Double,
                nrow,
                ncol,
                data: WireData::Doubles(data),
                partial: None,
            },
            None,
        ))
    }

    fn length(&self) -> usize {
        match self.vtype {
            ValueType::String => 1,
            _ => self.nrow * self.ncol,
        }
    }

    fn to_raw(&self) -> RawValue {
        let wire = if self.null == NullState::IsNull {
            WireValue {
                vtype: self.vtype,
                nrow: 0,
                ncol: 0,
                data: WireData::Null,
                partial: None,
            }
        } else {
            WireValue {
                vtype: self.vtype,
                nrow: self.nrow,
                ncol: self.ncol,
                data: self.data.clone(),
                partial: self.partial.clone(),
            }
        };
        RawValue::new(wire, self.units.clone())
    }

    /// Current non-null entries, for numeric types.
    fn numbers(&self) -> Vec<f64> {
        if self.null == NullState::IsNull {
            return Vec::new();
        }
        numbers(&self.data, self.partial.as_deref())
    }

    fn props(&self) -> ValueProps {
        ValueProps {
            dim: self.dim,
            geometry_parameter: self.geometry_parameter,
            length: self.length,
            shape: self.shape,
            null: self.null,
        }
    }
}

fn numbers(data: &WireData, partial: Option<&[NullState]>) -> Vec<f64> {
    let all: Vec<f64> = match data {
        WireData::Integers(v) => v.iter().map(|&i| f64::from(i)).collect(),
        WireData::Doubles(v) => v.clone(),
        _ => return Vec::new(),
    };
    all.into_iter()
        .enumerate()
        .filter(|(i, _)| partial.map_or(true, |mask| mask.get(*i) != Some(&NullState::IsNull)))
        .map(|(_, x)| x)
        .collect()
}

#[derive(Debug, Clone)]
struct MockProblem {
    directory: PathBuf,
    out_level: i32,
}

#[derive(Debug, Clone)]
struct MockAnalysis {
    aim: String,
    directory: PathBuf,
    unit_system: Option<String>,
    intent: Option<String>,
    execution: i32,
    status: AnalysisStatus,
}

#[derive(Debug, Clone)]
struct MockBound {
    dim: usize,
    state: BoundState,
    limits: Vec<f64>,
}

#[derive(Debug, Clone)]
struct MockVertexSet {
    analysis: Option<ObjHandle>,
    points: Vec<[f64; 3]>,
}

#[derive(Debug, Clone)]
struct MockDataSet {
    method: DataMethod,
    rank: usize,
    data: Option<(usize, Vec<f64>)>,
    startup: Option<Vec<f64>>,
    units: Option<String>,
}

#[derive(Debug, Clone)]
enum Body {
    Problem(MockProblem),
    Value(MockValue),
    Analysis(MockAnalysis),
    Bound(MockBound),
    VertexSet(MockVertexSet),
    DataSet(MockDataSet),
}

#[derive(Debug, Clone)]
struct MockObject {
    name: String,
    otype: ObjectType,
    stype: SubType,
    parent: Option<ObjHandle>,
    children: Vec<ObjHandle>,
    attrs: Vec<(String, MockValue)>,
    owner: OwnerInfo,
    body: Body,
}

/// Geometric parameters declared by an OpenCSM script or saved with a
/// Problem.
#[derive(Debug, Clone, Default)]
struct CsmParams {
    inputs: Vec<(String, usize, usize, Vec<f64>)>,
    outputs: Vec<(String, Option<f64>)>,
}

#[derive(Debug, Clone)]
struct Snapshot {
    stype: SubType,
    params: CsmParams,
}

/// Generates the typed accessors for each object body.
macro_rules! body_accessors {
    ($($get:ident, $get_mut:ident => $variant:ident($ty:ty);)+) => {
        $(
            fn $get(&self, h: ObjHandle) -> Result<&$ty, CapsError> {
                match &self.get(h)?.body {
                    Body::$variant(b) => Ok(b),
                    _ => Err(err(CAPS_BADTYPE)),
                }
            }

            fn $get_mut(&mut self, h: ObjHandle) -> Result<&mut $ty, CapsError> {
                match &mut self.get_mut(h)?.body {
                    Body::$variant(b) => Ok(b),
                    _ => Err(err(CAPS_BADTYPE)),
                }
            }
        )+
    };
}

#[derive(Debug, Default)]
struct MockState {
    next_id: usize,
    sequence: u64,
    objects: HashMap<ObjHandle, MockObject>,
    saved: HashMap<PathBuf, Snapshot>,
}

impl MockState {
    fn owner(&mut self) -> OwnerInfo {
        self.sequence += 1;
        OwnerInfo {
            process: "mockCaps".to_string(),
            pid: std::process::id().to_string(),
            user: std::env::var("USER").unwrap_or_else(|_| "caps".to_string()),
            stamp: Some(Utc::now()),
            sequence: self.sequence,
        }
    }

    fn alloc(
        &mut self,
        name: &str,
        otype: ObjectType,
        stype: SubType,
        parent: Option<ObjHandle>,
        body: Body,
    ) -> ObjHandle {
        self.next_id += 1;
        let h = ObjHandle(self.next_id);
        let owner = self.owner();
        self.objects.insert(
            h,
            MockObject {
                name: name.to_string(),
                otype,
                stype,
                parent,
                children: Vec::new(),
                attrs: Vec::new(),
                owner,
                body,
            },
        );
        h
    }

    /// Allocate and register as a child of `parent`.
    fn adopt(&mut self, parent: ObjHandle, name: &str, otype: ObjectType, stype: SubType, body: Body) -> ObjHandle {
        let h = self.alloc(name, otype, stype, Some(parent), body);
        if let Some(p) = self.objects.get_mut(&parent) {
            p.children.push(h);
        }
        h
    }

    fn get(&self, h: ObjHandle) -> Result<&MockObject, CapsError> {
        self.objects.get(&h).ok_or_else(|| err(CAPS_BADOBJECT))
    }

    fn get_mut(&mut self, h: ObjHandle) -> Result<&mut MockObject, CapsError> {
        self.objects.get_mut(&h).ok_or_else(|| err(CAPS_BADOBJECT))
    }

    body_accessors! {
        problem, problem_mut => Problem(MockProblem);
        value, value_mut => Value(MockValue);
        analysis, analysis_mut => Analysis(MockAnalysis);
        bound, bound_mut => Bound(MockBound);
        vertex_set, vertex_set_mut => VertexSet(MockVertexSet);
        data_set, data_set_mut => DataSet(MockDataSet);
    }

    fn touch(&mut self, h: ObjHandle) {
        let owner = self.owner();
        if let Some(o) = self.objects.get_mut(&h) {
            o.owner = owner;
        }
    }

    fn problem_of(&self, h: ObjHandle) -> Result<ObjHandle, CapsError> {
        let mut cur = h;
        loop {
            let o = self.get(cur)?;
            if o.otype == ObjectType::Problem {
                return Ok(cur);
            }
            cur = o.parent.ok_or_else(|| err(CAPS_NULLOBJ))?;
        }
    }

    fn expect_problem(&self, h: ObjHandle) -> Result<(), CapsError> {
        match self.get(h)?.otype {
            ObjectType::Problem => Ok(()),
            _ => Err(err(CAPS_NOTPROBLEM)),
        }
    }

    fn children(&self, h: ObjHandle, otype: ObjectType, stype: SubType) -> Result<Vec<ObjHandle>, CapsError> {
        let o = self.get(h)?;
        Ok(o.children
            .iter()
            .copied()
            .filter(|c| {
                self.objects
                    .get(c)
                    .is_some_and(|co| co.otype == otype && (stype == SubType::None || co.stype == stype))
            })
            .collect())
    }

    fn child_named(&self, h: ObjHandle, otype: ObjectType, name: &str) -> Result<Option<ObjHandle>, CapsError> {
        Ok(self
            .children(h, otype, SubType::None)?
            .into_iter()
            .find(|c| self.objects.get(c).is_some_and(|co| co.name == name)))
    }

    fn is_descendant(&self, h: ObjHandle, root: ObjHandle) -> bool {
        let mut cur = Some(h);
        while let Some(c) = cur {
            if c == root {
                return true;
            }
            cur = self.objects.get(&c).and_then(|o| o.parent);
        }
        false
    }

    /// Remove `root` and everything beneath it.
    fn remove_tree(&mut self, root: ObjHandle) {
        let doomed: HashSet<ObjHandle> = self
            .objects
            .keys()
            .copied()
            .filter(|&h| self.is_descendant(h, root))
            .collect();
        for h in &doomed {
            self.objects.remove(h);
        }
        for o in self.objects.values_mut() {
            o.children.retain(|c| !doomed.contains(c));
            if let Body::Value(v) = &mut o.body {
                if v.link.is_some_and(|(src, _)| doomed.contains(&src)) {
                    v.link = None;
                }
            }
        }
    }

    /// Follow linkages from `h` to the Value that actually holds data.
    fn link_source(&self, h: ObjHandle) -> Result<ObjHandle, CapsError> {
        let mut cur = h;
        for _ in 0..=self.objects.len() {
            match self.value(cur)?.link {
                Some((src, _)) if src == h => return Err(err(CAPS_CIRCULARLINK)),
                Some((src, _)) => cur = src,
                None => return Ok(cur),
            }
        }
        Err(err(CAPS_CIRCULARLINK))
    }

    /// Contents of `h` as seen by a reader.
    fn resolve(&self, h: ObjHandle) -> Result<RawValue, CapsError> {
        let last = self.link_source(h)?;
        let obj = self.get(last)?;
        if obj.stype == SubType::AnalysisOut {
            let analysis = obj.parent.ok_or_else(|| err(CAPS_NULLOBJ))?;
            if self.analysis(analysis)?.status != AnalysisStatus::UpToDate {
                return Err(err(CAPS_DIRTY).with_message(format!("'{}' is not current", obj.name)));
            }
        }
        Ok(self.value(last)?.to_raw())
    }

    fn analyses(&self, problem: ObjHandle) -> Result<Vec<ObjHandle>, CapsError> {
        self.children(problem, ObjectType::Analysis, SubType::None)
    }

    /// Propagate a change of `changed` to the analyses that consume it.
    fn mark_dirty(&mut self, changed: ObjHandle) -> Result<(), CapsError> {
        let problem = self.problem_of(changed)?;
        let mut queue = vec![changed];
        let mut seen = HashSet::new();
        while let Some(h) = queue.pop() {
            if !seen.insert(h) {
                continue;
            }
            let (stype, parent) = {
                let o = self.get(h)?;
                (o.stype, o.parent)
            };
            match stype {
                SubType::GeometryIn => {
                    for a in self.analyses(problem)? {
                        let analysis = self.analysis_mut(a)?;
                        analysis.status = match analysis.status {
                            AnalysisStatus::DirtyInputs | AnalysisStatus::DirtyBoth => AnalysisStatus::DirtyBoth,
                            _ => AnalysisStatus::DirtyGeometry,
                        };
                    }
                }
                SubType::AnalysisIn => {
                    if let Some(a) = parent {
                        let analysis = self.analysis_mut(a)?;
                        analysis.status = match analysis.status {
                            AnalysisStatus::DirtyGeometry | AnalysisStatus::DirtyBoth => AnalysisStatus::DirtyBoth,
                            AnalysisStatus::NewGeometry => AnalysisStatus::NewGeometry,
                            _ => AnalysisStatus::DirtyInputs,
                        };
                    }
                }
                _ => {}
            }
            queue.extend(self.objects.iter().filter_map(|(&k, o)| match &o.body {
                Body::Value(v) if v.link.is_some_and(|(src, _)| src == h) => Some(k),
                _ => None,
            }));
        }
        Ok(())
    }

    fn snapshot(&self, problem: ObjHandle) -> Result<Snapshot, CapsError> {
        let mut params = CsmParams::default();
        for h in self.children(problem, ObjectType::Value, SubType::GeometryIn)? {
            let v = self.value(h)?;
            params
                .inputs
                .push((self.get(h)?.name.clone(), v.nrow, v.ncol, numbers(&v.data, None)));
        }
        for h in self.children(problem, ObjectType::Value, SubType::GeometryOut)? {
            let v = self.value(h)?;
            params.outputs.push((self.get(h)?.name.clone(), v.numbers().first().copied()));
        }
        Ok(Snapshot {
            stype: self.get(problem)?.stype,
            params,
        })
    }
}

/// Parse the parameter statements of an OpenCSM script.
///
/// `dimension`, `despmtr`, `cfgpmtr`, `outpmtr` and `set` on an output
/// parameter are understood; every other statement is ignored.
fn parse_csm(text: &str) -> Result<CsmParams, CapsError> {
    let illegal = |line: &str| err(OCSM_ILLEGAL_VALUE).with_message(format!("cannot read '{line}'"));
    let mut dims: HashMap<String, (usize, usize)> = HashMap::new();
    let mut params = CsmParams::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let keyword = tokens.next().unwrap_or_default().to_ascii_lowercase();
        let name = tokens.next().unwrap_or_default().to_string();
        let rest: Vec<&str> = tokens.collect();
        match keyword.as_str() {
            "dimension" => {
                let [r, c] = rest.as_slice() else {
                    return Err(illegal(line));
                };
                let r = r.parse().map_err(|_| illegal(line))?;
                let c = c.parse().map_err(|_| illegal(line))?;
                dims.insert(name, (r, c));
            }
            "despmtr" | "cfgpmtr" => {
                let values = rest
                    .join(" ")
                    .trim_matches('"')
                    .split([';', ','])
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| s.trim().parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| illegal(line))?;
                let (nrow, ncol) = dims.get(&name).copied().unwrap_or((1, values.len()));
                if values.is_empty() || nrow * ncol != values.len() {
                    return Err(illegal(line));
                }
                params.inputs.push((name, nrow, ncol, values));
            }
            "outpmtr" => params.outputs.push((name, None)),
            "set" => {
                if let Some(out) = params.outputs.iter_mut().find(|(n, _)| *n == name) {
                    out.1 = rest.first().and_then(|s| s.parse().ok());
                }
            }
            _ => {}
        }
    }
    Ok(params)
}

fn format_csm(params: &CsmParams) -> String {
    let mut out = String::new();
    for (name, nrow, ncol, values) in &params.inputs {
        let text: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        if *nrow * *ncol > 1 {
            out.push_str(&format!("dimension {name} {nrow} {ncol}\n"));
        }
        out.push_str(&format!("despmtr {name} \"{}\"\n", text.join(";")));
    }
    out
}

fn io_error(path: &Path, e: std::io::Error) -> CapsError {
    err(CAPS_IOERR).with_message(format!("{}: {e}", path.display()))
}

/// Unit conversion applied to numbers as they are stored.
struct Rescale {
    units: BuiltinUnits,
    pair: Option<(String, String)>,
}

impl Rescale {
    fn apply(&self, x: f64) -> Result<f64, CapsError> {
        match &self.pair {
            None => Ok(x),
            Some((from, to)) => self.units.convert(from, x, to),
        }
    }
}

/// In-memory CAPS.
pub struct MockCaps {
    state: RefCell<MockState>,
    aims: BTreeMap<String, MockAim>,
    units: BuiltinUnits,
}

impl Default for MockCaps {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCaps {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(MockState::default()),
            aims: BTreeMap::new(),
            units: BuiltinUnits,
        }
    }

    /// Register an AIM that `make_analysis` can load.
    pub fn with_aim(mut self, aim: MockAim) -> Self {
        self.aims.insert(aim.name.clone(), aim);
        self
    }

    /// Attach a sensitivity to a DoubleDot value.
    pub fn set_dot(&self, value: ObjHandle, name: &str, dot: DotInfo) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        let v = st.value_mut(value)?;
        if v.vtype != ValueType::DoubleDot {
            return Err(err(CAPS_BADTYPE));
        }
        v.dots.insert(name.to_string(), dot);
        Ok(())
    }

    /// Number of live objects, for leak checks in tests.
    pub fn object_count(&self) -> usize {
        self.state.borrow().objects.len()
    }

    fn aim(&self, name: &str) -> Result<&MockAim, CapsError> {
        self.aims
            .get(name)
            .ok_or_else(|| err(CAPS_NOTFOUND).with_message(format!("no AIM named '{name}'")))
    }

    /// Conversion taking values in `from` units into `to` units.
    fn rescale(&self, from: Option<&str>, to: Option<&str>) -> Result<Rescale, CapsError> {
        match (from, to) {
            (None, None) => Ok(Rescale { units: self.units, pair: None }),
            (Some(a), Some(b)) => {
                self.units.convert(a, 1.0, b)?;
                Ok(Rescale {
                    units: self.units,
                    pair: Some((a.to_string(), b.to_string())),
                })
            }
            (Some(a), None) => Err(err(CAPS_UNITERR).with_message(format!("value has no units to take '{a}'"))),
            (None, Some(b)) => Err(err(CAPS_UNITERR).with_message(format!("units required, expected '{b}'"))),
        }
    }

    fn commensurable(&self, a: Option<&str>, b: Option<&str>) -> Result<(), CapsError> {
        match (a, b) {
            (None, None) => Ok(()),
            (Some(a), Some(b)) => self.units.convert(a, 1.0, b).map(|_| ()),
            _ => Err(err(CAPS_UNITERR)),
        }
    }

    /// Whether `src` may feed `dst` through a linkage or transfer.
    fn compatible(&self, src: &MockValue, dst: &MockValue) -> Result<(), CapsError> {
        self.commensurable(src.units.as_deref(), dst.units.as_deref())?;
        if src.vtype != dst.vtype {
            return Err(err(CAPS_BADTYPE));
        }
        if dst.length == Fixed::Fixed && src.length() != dst.length() {
            return Err(err(CAPS_SHAPEERR));
        }
        let fits = if dst.shape == Fixed::Fixed {
            dst.dim.as_raw() <= src.dim.as_raw() && dst.nrow == src.nrow && dst.ncol == src.ncol
        } else {
            match dst.dim {
                Dim::Scalar => src.length() == 1,
                Dim::Vector => src.nrow == 1 || src.ncol == 1,
                Dim::Array2D => true,
            }
        };
        if fits {
            Ok(())
        } else {
            Err(err(CAPS_SHAPEERR))
        }
    }

    fn new_problem(&self, st: &mut MockState, dir: &Path, snapshot: Snapshot) -> ObjHandle {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let problem = st.alloc(
            &name,
            ObjectType::Problem,
            snapshot.stype,
            None,
            Body::Problem(MockProblem {
                directory: dir.to_path_buf(),
                out_level: 1,
            }),
        );
        for (pname, nrow, ncol, values) in snapshot.params.inputs {
            let mut v = MockValue::doubles(nrow, ncol, values);
            v.length = Fixed::Fixed;
            v.shape = Fixed::Fixed;
            v.null = NullState::NotAllowed;
            v.geometry_parameter = true;
            st.adopt(problem, &pname, ObjectType::Value, SubType::GeometryIn, Body::Value(v));
        }
        for (pname, current) in snapshot.params.outputs {
            let mut v = MockValue::doubles(1, 1, vec![current.unwrap_or_default()]);
            v.vtype = ValueType::DoubleDot;
            if current.is_none() {
                v.data = WireData::Null;
                v.null = NullState::IsNull;
            }
            st.adopt(problem, &pname, ObjectType::Value, SubType::GeometryOut, Body::Value(v));
        }
        problem
    }

    fn store_value(&self, st: &mut MockState, h: ObjHandle, raw: &RawValue) -> Result<(), CapsError> {
        let problem = st.problem_of(h)?;
        let static_problem = st.get(problem)?.stype == SubType::Static;
        let stype = st.get(h)?.stype;
        if matches!(stype, SubType::GeometryOut | SubType::AnalysisOut) {
            return Err(err(CAPS_BADTYPE));
        }
        let value = st.value(h)?;
        if value.link.is_some() {
            return Err(err(CAPS_LINKERR));
        }

        let w = &raw.wire;
        let vlen = w.nrow * w.ncol;
        if vlen == 0 {
            return Err(err(CAPS_RANGEERR));
        }
        if value.vtype != ValueType::String && value.shape == Fixed::Fixed {
            let fits = match value.dim {
                Dim::Scalar => vlen == 1,
                Dim::Vector => w.nrow == 1 || w.ncol == 1,
                Dim::Array2D => true,
            };
            if !fits {
                return Err(err(CAPS_SHAPEERR)
                    .with_message(format!("{}x{} does not fit a {:?} value", w.nrow, w.ncol, value.dim)));
            }
        }
        if let Some(mask) = &w.partial {
            if mask
                .iter()
                .any(|m| !matches!(m, NullState::NotNull | NullState::IsNull))
            {
                return Err(err(CAPS_NULLVALUE));
            }
        }
        let rescale = self.rescale(raw.units.as_deref(), value.units.as_deref())?;
        if stype == SubType::GeometryIn && static_problem {
            return Err(err(CAPS_READONLYERR));
        }

        if w.is_null() {
            if value.null == NullState::NotAllowed {
                return Err(err(CAPS_NULLVALUE));
            }
            st.value_mut(h)?.null = NullState::IsNull;
            return self.finish_store(st, h, stype);
        }

        if value.vtype != w.vtype && !(value.vtype.is_real() && (w.vtype.is_real() || w.vtype == ValueType::Integer)) {
            return Err(err(CAPS_BADTYPE)
                .with_message(format!("cannot store {:?} in a {:?} value", w.vtype, value.vtype)));
        }
        let data = match &w.data {
            WireData::Integers(v) if value.vtype.is_real() => {
                WireData::Doubles(v.iter().map(|&i| rescale.apply(f64::from(i))).collect::<Result<_, _>>()?)
            }
            WireData::Doubles(v) if value.vtype.is_real() => {
                WireData::Doubles(v.iter().map(|&d| rescale.apply(d)).collect::<Result<_, _>>()?)
            }
            other => other.clone(),
        };
        if let Some(limits) = &value.limits {
            if numbers(&data, w.partial.as_deref()).iter().any(|&x| !limits.contains(x)) {
                return Err(err(CAPS_RANGEERR).with_message(format!("outside limits {:?}", limits.bounds())));
            }
        }
        let new_length = if value.vtype == ValueType::String { 1 } else { vlen };
        if new_length != value.length()
            && value.length == Fixed::Fixed
            && !matches!(value.vtype, ValueType::String | ValueType::Tuple | ValueType::Pointer)
        {
            return Err(err(CAPS_SHAPEERR).with_message(format!(
                "length is fixed at {}, got {new_length}",
                value.length()
            )));
        }

        let value = st.value_mut(h)?;
        value.data = data;
        value.nrow = w.nrow;
        value.ncol = w.ncol;
        match &w.partial {
            Some(mask) => {
                value.partial = Some(mask.clone());
                value.null = NullState::IsPartial;
            }
            None => {
                value.partial = None;
                if value.null != NullState::NotAllowed {
                    value.null = NullState::NotNull;
                }
            }
        }
        self.finish_store(st, h, stype)
    }

    fn finish_store(&self, st: &mut MockState, h: ObjHandle, stype: SubType) -> Result<(), CapsError> {
        if stype != SubType::User {
            st.touch(h);
        }
        st.mark_dirty(h)
    }

    fn vertex_set_bound(&self, st: &MockState, vs: ObjHandle) -> Result<ObjHandle, CapsError> {
        st.vertex_set(vs)?;
        st.get(vs)?.parent.ok_or_else(|| err(CAPS_NULLOBJ))
    }

    fn require_open(&self, st: &MockState, bound: ObjHandle) -> Result<(), CapsError> {
        match st.bound(bound)?.state {
            BoundState::Open => Ok(()),
            state => Err(err(CAPS_STATEERR).with_message(format!("Bound is {state:?}, not Open"))),
        }
    }
}

impl CapsApi for MockCaps {
    fn revision(&self) -> (i32, i32) {
        MOCK_REVISION
    }

    fn open(&self, problem_dir: &Path, source: &ProblemSource) -> Result<ObjHandle, CapsError> {
        let snapshot = match source {
            ProblemSource::Csm(path) => {
                let text = fs::read_to_string(path)
                    .map_err(|e| err(OCSM_FILE_NOT_FOUND).with_message(format!("{}: {e}", path.display())))?;
                Snapshot {
                    stype: SubType::Parametric,
                    params: parse_csm(&text)?,
                }
            }
            ProblemSource::Egads(path) => {
                if !path.is_file() {
                    return Err(err(EGADS_NOTFOUND).with_message(path.display().to_string()));
                }
                Snapshot {
                    stype: SubType::Static,
                    params: CsmParams::default(),
                }
            }
            ProblemSource::Restart => self
                .state
                .borrow()
                .saved
                .get(problem_dir)
                .cloned()
                .ok_or_else(|| {
                    err(CAPS_DIRERR).with_message(format!("no saved Problem in {}", problem_dir.display()))
                })?,
        };
        let mut st = self.state.borrow_mut();
        let problem = self.new_problem(&mut st, problem_dir, snapshot);
        debug!(?problem, dir = %problem_dir.display(), "mock problem opened");
        Ok(problem)
    }

    fn close(&self, problem: ObjHandle) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        st.expect_problem(problem)?;
        st.remove_tree(problem);
        Ok(())
    }

    fn save(&self, problem: ObjHandle, path: &Path) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        st.expect_problem(problem)?;
        let snapshot = st.snapshot(problem)?;
        st.saved.insert(path.to_path_buf(), snapshot);
        Ok(())
    }

    fn out_level(&self, problem: ObjHandle, level: i32) -> Result<i32, CapsError> {
        if !(0..=2).contains(&level) {
            return Err(err(CAPS_RANGEERR));
        }
        let mut st = self.state.borrow_mut();
        st.expect_problem(problem)?;
        let p = st.problem_mut(problem)?;
        Ok(std::mem::replace(&mut p.out_level, level))
    }

    fn write_parameters(&self, problem: ObjHandle, path: &Path) -> Result<(), CapsError> {
        let st = self.state.borrow();
        st.expect_problem(problem)?;
        let text = format_csm(&st.snapshot(problem)?.params);
        fs::write(path, text).map_err(|e| io_error(path, e))
    }

    fn read_parameters(&self, problem: ObjHandle, path: &Path) -> Result<(), CapsError> {
        let text = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        let params = parse_csm(&text)?;
        let mut st = self.state.borrow_mut();
        st.expect_problem(problem)?;
        for (name, nrow, ncol, values) in params.inputs {
            let h = st
                .children(problem, ObjectType::Value, SubType::GeometryIn)?
                .into_iter()
                .find(|c| st.objects.get(c).is_some_and(|o| o.name == name))
                .ok_or_else(|| err(CAPS_NOTFOUND).with_message(format!("no design parameter '{name}'")))?;
            let units = st.value(h)?.units.clone();
            let raw = RawValue::new(
                WireValue {
                    vtype: ValueType::Double,
                    nrow,
                    ncol,
                    data: WireData::Doubles(values),
                    partial: None,
                },
                units,
            );
            self.store_value(&mut st, h, &raw)?;
        }
        Ok(())
    }

    fn write_geometry(&self, obj: ObjHandle, path: &Path) -> Result<(), CapsError> {
        let st = self.state.borrow();
        let o = st.get(obj)?;
        if !matches!(o.otype, ObjectType::Problem | ObjectType::Analysis) {
            return Err(err(CAPS_BADTYPE));
        }
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if !GEOMETRY_FORMATS.contains(&ext.as_str()) {
            return Err(err(CAPS_BADNAME).with_message(format!("unknown geometry format '{ext}'")));
        }
        fs::write(path, format!("mock geometry of {}\n", o.name)).map_err(|e| io_error(path, e))
    }

    fn info(&self, obj: ObjHandle) -> Result<ObjectInfo, CapsError> {
        let st = self.state.borrow();
        let o = st.get(obj)?;
        let linked = match &o.body {
            Body::Value(v) => v.link.is_some(),
            _ => false,
        };
        Ok(ObjectInfo {
            name: o.name.clone(),
            otype: o.otype,
            stype: o.stype,
            linked,
            parent: o.parent,
            owner: o.owner.clone(),
        })
    }

    fn size(&self, obj: ObjHandle, otype: ObjectType, stype: SubType) -> Result<usize, CapsError> {
        let st = self.state.borrow();
        if otype == ObjectType::Attributes {
            return Ok(st.get(obj)?.attrs.len());
        }
        Ok(st.children(obj, otype, stype)?.len())
    }

    fn child_by_index(
        &self,
        obj: ObjHandle,
        otype: ObjectType,
        stype: SubType,
        index: usize,
    ) -> Result<ObjHandle, CapsError> {
        let st = self.state.borrow();
        let children = st.children(obj, otype, stype)?;
        index
            .checked_sub(1)
            .and_then(|i| children.get(i).copied())
            .ok_or_else(|| err(CAPS_BADINDEX))
    }

    fn child_by_name(
        &self,
        obj: ObjHandle,
        otype: ObjectType,
        stype: SubType,
        name: &str,
    ) -> Result<ObjHandle, CapsError> {
        let st = self.state.borrow();
        st.children(obj, otype, stype)?
            .into_iter()
            .find(|c| st.objects.get(c).is_some_and(|o| o.name == name))
            .ok_or_else(|| err(CAPS_NOTFOUND).with_message(format!("no {otype:?} named '{name}'")))
    }

    fn delete(&self, obj: ObjHandle) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        let o = st.get(obj)?;
        let deletable = o.otype == ObjectType::Bound || (o.otype == ObjectType::Value && o.stype == SubType::User);
        if !deletable {
            return Err(err(CAPS_BADTYPE));
        }
        st.remove_tree(obj);
        Ok(())
    }

    fn attr_by_name(&self, obj: ObjHandle, name: &str) -> Result<ObjHandle, CapsError> {
        let mut st = self.state.borrow_mut();
        let value = st
            .get(obj)?
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| err(CAPS_NOTFOUND).with_message(format!("no attribute '{name}'")))?;
        let problem = st.problem_of(obj)?;
        Ok(st.alloc(name, ObjectType::Value, SubType::User, Some(problem), Body::Value(value)))
    }

    fn attr_by_index(&self, obj: ObjHandle, index: usize) -> Result<(String, ObjHandle), CapsError> {
        let mut st = self.state.borrow_mut();
        let (name, value) = index
            .checked_sub(1)
            .and_then(|i| st.get(obj).ok()?.attrs.get(i).cloned())
            .ok_or_else(|| err(CAPS_BADINDEX))?;
        let problem = st.problem_of(obj)?;
        let h = st.alloc(&name, ObjectType::Value, SubType::User, Some(problem), Body::Value(value));
        Ok((name, h))
    }

    fn set_attr(&self, obj: ObjHandle, name: &str, value: ObjHandle) -> Result<(), CapsError> {
        if name.is_empty() {
            return Err(err(CAPS_NULLNAME));
        }
        let mut st = self.state.borrow_mut();
        let mut copy = st.value(value)?.clone();
        copy.link = None;
        let attrs = &mut st.get_mut(obj)?.attrs;
        match attrs.iter().position(|(n, _)| n == name) {
            Some(i) => attrs[i].1 = copy,
            None => attrs.push((name.to_string(), copy)),
        }
        Ok(())
    }

    fn delete_attr(&self, obj: ObjHandle, name: &str) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        let attrs = &mut st.get_mut(obj)?.attrs;
        let before = attrs.len();
        attrs.retain(|(n, _)| n != name);
        if attrs.len() == before {
            return Err(err(CAPS_NOTFOUND).with_message(format!("no attribute '{name}'")));
        }
        Ok(())
    }

    fn make_value(&self, problem: ObjHandle, name: &str, stype: SubType, value: &RawValue) -> Result<ObjHandle, CapsError> {
        let mut st = self.state.borrow_mut();
        st.expect_problem(problem)?;
        if name.is_empty() {
            return Err(err(CAPS_NULLNAME));
        }
        if !matches!(stype, SubType::Parameter | SubType::User) {
            return Err(err(CAPS_BADTYPE));
        }
        let w = &value.wire;
        if w.vtype == ValueType::Value {
            return Err(err(CAPS_BADTYPE));
        }
        if value.units.is_some() && !w.vtype.accepts_units() {
            return Err(err(CAPS_UNITERR).with_message(format!("{:?} values cannot carry units", w.vtype)));
        }
        if w.nrow * w.ncol == 0 && w.vtype != ValueType::String {
            return Err(err(CAPS_BADINDEX));
        }
        if let Some(units) = &value.units {
            self.units.validate(units)?;
        }
        if stype == SubType::Parameter && st.child_named(problem, ObjectType::Value, name)?.is_some() {
            return Err(err(CAPS_EXISTS).with_message(format!("parameter '{name}' already exists")));
        }
        let v = Body::Value(MockValue::from_raw(value));
        let h = match stype {
            SubType::Parameter => st.adopt(problem, name, ObjectType::Value, stype, v),
            _ => st.alloc(name, ObjectType::Value, stype, Some(problem), v),
        };
        debug!(?h, name, ?stype, vtype = ?w.vtype, "mock value made");
        Ok(h)
    }

    fn get_value(&self, value: ObjHandle) -> Result<RawValue, CapsError> {
        self.state.borrow().resolve(value)
    }

    fn set_value(&self, value: ObjHandle, raw: &RawValue) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        self.store_value(&mut st, value, raw)
    }

    fn get_limits(&self, value: ObjHandle) -> Result<Option<(Limits, Option<String>)>, CapsError> {
        let st = self.state.borrow();
        let v = st.value(value)?;
        if !(v.vtype == ValueType::Integer || v.vtype.is_real()) {
            return Err(err(CAPS_BADTYPE));
        }
        Ok(v.limits.map(|l| (l, v.units.clone())))
    }

    fn set_limits(&self, value: ObjHandle, limits: Option<&Limits>, units: Option<&str>) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        if !matches!(st.get(value)?.stype, SubType::User | SubType::Parameter) {
            return Err(err(CAPS_BADTYPE));
        }
        let v = st.value(value)?;
        let Some(limits) = limits else {
            st.value_mut(value)?.limits = None;
            return Ok(());
        };
        if v.vtype != limits.value_type() && !(v.vtype.is_real() && limits.value_type() == ValueType::Integer) {
            return Err(err(CAPS_BADTYPE));
        }
        let rescale = self.rescale(units, v.units.as_deref())?;
        let stored = match (v.vtype, limits) {
            (ValueType::Integer, Limits::Integer(l)) => {
                if units.is_some() {
                    return Err(err(CAPS_UNITERR));
                }
                Limits::Integer(*l)
            }
            (t, l) if t.is_real() => {
                let [lo, hi] = l.bounds();
                Limits::Double([rescale.apply(lo)?, rescale.apply(hi)?])
            }
            _ => return Err(err(CAPS_BADTYPE)),
        };
        let [lo, hi] = stored.bounds();
        if lo >= hi {
            return Err(err(CAPS_RANGEERR).with_message("lower limit must be below upper limit"));
        }
        if v.numbers().iter().any(|&x| !stored.contains(x)) {
            return Err(err(CAPS_RANGEERR).with_message("current value lies outside the limits"));
        }
        st.value_mut(value)?.limits = Some(stored);
        Ok(())
    }

    fn get_value_props(&self, value: ObjHandle) -> Result<ValueProps, CapsError> {
        Ok(self.state.borrow().value(value)?.props())
    }

    fn set_value_props(&self, value: ObjHandle, props: &ValueProps) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        if !matches!(st.get(value)?.stype, SubType::User | SubType::Parameter) {
            return Err(err(CAPS_BADTYPE));
        }
        let v = st.value_mut(value)?;
        if props.null == NullState::NotAllowed && v.null == NullState::IsNull {
            return Err(err(CAPS_NULLVALUE));
        }
        let fits = match props.dim {
            Dim::Scalar => v.nrow == 1 && v.ncol == 1,
            Dim::Vector => v.nrow <= 1 || v.ncol <= 1,
            Dim::Array2D => true,
        };
        if !fits {
            return Err(err(CAPS_SHAPEERR));
        }
        v.dim = props.dim;
        v.length = props.length;
        v.shape = props.shape;
        let keep = matches!(
            (props.null, v.null),
            (NullState::IsNull, NullState::NotNull) | (NullState::NotNull, NullState::IsNull)
        );
        if !keep {
            v.null = props.null;
        }
        Ok(())
    }

    fn convert_value(&self, value: ObjHandle, input: f64, units: &str) -> Result<f64, CapsError> {
        let st = self.state.borrow();
        let v = st.value(value)?;
        let to = v
            .units
            .as_deref()
            .ok_or_else(|| err(CAPS_UNITERR).with_message("value has no units"))?;
        self.units.convert(units, input, to)
    }

    fn transfer_values(&self, source: ObjHandle, method: TransferMethod, target: ObjHandle) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        if st.get(source)?.otype == ObjectType::DataSet {
            return Err(err(CAPS_NOTIMPLEMENT).with_message("DataSet sources are not modelled"));
        }
        st.value(source)?;
        if matches!(st.get(target)?.stype, SubType::GeometryOut | SubType::AnalysisOut) {
            return Err(err(CAPS_BADTYPE));
        }
        if method != TransferMethod::Copy {
            return Err(err(CAPS_BADMETHOD));
        }
        let raw = st.resolve(source)?;
        let last = st.link_source(source)?;
        self.compatible(st.value(last)?, st.value(target)?)?;
        let units = st.value(target)?.units.clone();
        let mut raw = raw;
        if let (Some(from), Some(to)) = (raw.units.as_deref(), units.as_deref()) {
            if let WireData::Doubles(d) = &raw.wire.data {
                raw.wire.data = WireData::Doubles(self.units.convert_all(from, d, to)?);
            }
        }
        raw.units = units;
        if raw.wire.is_null() {
            raw.wire.nrow = 1;
            raw.wire.ncol = 1;
        }
        self.store_value(&mut st, target, &raw)
    }

    fn make_linkage(&self, source: Option<ObjHandle>, method: TransferMethod, target: ObjHandle) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        let tstype = st.get(target)?.stype;
        if matches!(tstype, SubType::GeometryOut | SubType::AnalysisOut) {
            return Err(err(CAPS_BADTYPE));
        }
        if st.value(target)?.vtype == ValueType::Value {
            return Err(err(CAPS_BADTYPE));
        }
        let problem = st.problem_of(target)?;
        if tstype == SubType::GeometryIn {
            if st.get(problem)?.stype == SubType::Static {
                return Err(err(CAPS_READONLYERR));
            }
            if method != TransferMethod::Copy {
                return Err(err(CAPS_BADMETHOD));
            }
        }

        let Some(source) = source else {
            st.value_mut(target)?.link = None;
            st.touch(target);
            return Ok(());
        };
        match st.get(source)?.otype {
            ObjectType::Value => {}
            ObjectType::DataSet => {
                return Err(err(CAPS_NOTIMPLEMENT).with_message("DataSet sources are not modelled"));
            }
            _ => return Err(err(CAPS_BADTYPE)),
        }
        if tstype == SubType::User {
            return Err(err(CAPS_BADTYPE));
        }
        if method != TransferMethod::Copy {
            return Err(err(CAPS_BADMETHOD));
        }
        if source == target {
            return Err(err(CAPS_CIRCULARLINK));
        }
        let mut cur = source;
        for _ in 0..=st.objects.len() {
            match st.value(cur)?.link {
                Some((next, _)) if next == target => return Err(err(CAPS_CIRCULARLINK)),
                Some((next, _)) => cur = next,
                None => break,
            }
        }
        let sval = st.value(cur)?;
        if sval.vtype == ValueType::Value {
            return Err(err(CAPS_BADTYPE));
        }
        self.compatible(sval, st.value(target)?)?;
        st.value_mut(target)?.link = Some((source, method));
        st.touch(target);
        st.mark_dirty(target)
    }

    fn has_dot(&self, value: ObjHandle) -> Result<Vec<String>, CapsError> {
        let st = self.state.borrow();
        let v = st.value(value)?;
        if v.vtype != ValueType::DoubleDot {
            return Err(err(CAPS_BADTYPE));
        }
        Ok(v.dots.keys().cloned().collect())
    }

    fn get_dot(&self, value: ObjHandle, name: &str) -> Result<DotInfo, CapsError> {
        let st = self.state.borrow();
        let v = st.value(value)?;
        if v.vtype != ValueType::DoubleDot {
            return Err(err(CAPS_BADTYPE));
        }
        v.dots
            .get(name)
            .cloned()
            .ok_or_else(|| err(CAPS_NOTFOUND).with_message(format!("no sensitivity with respect to '{name}'")))
    }

    fn query_analysis(&self, problem: ObjHandle, aim: &str) -> Result<AnalysisQuery, CapsError> {
        self.state.borrow().expect_problem(problem)?;
        let aim = self.aim(aim)?;
        Ok(AnalysisQuery {
            inputs: aim.inputs.len(),
            outputs: aim.outputs.len(),
            execution: aim.execution,
        })
    }

    fn make_analysis(&self, problem: ObjHandle, spec: &AnalysisSpec) -> Result<ObjHandle, CapsError> {
        let aim = self.aim(&spec.aim)?;
        let mut st = self.state.borrow_mut();
        st.expect_problem(problem)?;
        let name = spec.name.clone().unwrap_or_else(|| aim.name.clone());
        if st.child_named(problem, ObjectType::Analysis, &name)?.is_some() {
            return Err(err(CAPS_EXISTS).with_message(format!("analysis '{name}' already exists")));
        }

        let mut inputs = Vec::with_capacity(aim.inputs.len());
        for input in &aim.inputs {
            let mut wire = encode(&input.value)?;
            if input.units.is_some() {
                wire.promote_to_double();
            }
            let mut v = MockValue::from_raw(&RawValue::new(wire, input.units.clone()));
            if input.fixed {
                v.length = Fixed::Fixed;
                v.shape = Fixed::Fixed;
            }
            if v.null != NullState::IsNull {
                v.null = NullState::NotAllowed;
            }
            inputs.push((input.name.clone(), v));
        }

        let directory = st.problem(problem)?.directory.join(&name);
        let analysis = st.adopt(
            problem,
            &name,
            ObjectType::Analysis,
            SubType::None,
            Body::Analysis(MockAnalysis {
                aim: aim.name.clone(),
                directory,
                unit_system: spec.unit_system.clone(),
                intent: spec.intent.clone(),
                execution: spec.execution,
                status: AnalysisStatus::DirtyInputs,
            }),
        );
        for (iname, v) in inputs {
            st.adopt(analysis, &iname, ObjectType::Value, SubType::AnalysisIn, Body::Value(v));
        }
        for output in &aim.outputs {
            let mut v = MockValue::doubles(1, 1, vec![0.0]);
            v.data = WireData::Null;
            v.null = NullState::IsNull;
            v.units = output.units.clone();
            st.adopt(analysis, &output.name, ObjectType::Value, SubType::AnalysisOut, Body::Value(v));
        }
        debug!(?analysis, aim = %aim.name, name = %name, "mock analysis made");
        Ok(analysis)
    }

    fn analysis_info(&self, analysis: ObjHandle) -> Result<AnalysisInfo, CapsError> {
        let st = self.state.borrow();
        let a = st.analysis(analysis)?;
        let aim = self.aim(&a.aim)?;
        Ok(AnalysisInfo {
            directory: a.directory.clone(),
            unit_system: a.unit_system.clone(),
            intent: a.intent.clone(),
            parents: Vec::new(),
            fields: aim.fields.clone(),
            execution: a.execution,
            status: a.status,
        })
    }

    fn pre_analysis(&self, analysis: ObjHandle) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        let a = st.analysis_mut(analysis)?;
        if a.status == AnalysisStatus::UpToDate {
            return Err(err(CAPS_CLEAN));
        }
        a.status = AnalysisStatus::ExecPostRequired;
        st.touch(analysis);
        Ok(())
    }

    fn run_analysis(&self, analysis: ObjHandle) -> Result<i32, CapsError> {
        let mut st = self.state.borrow_mut();
        let a = st.analysis_mut(analysis)?;
        match a.status {
            AnalysisStatus::UpToDate => Err(err(CAPS_CLEAN)),
            s if s.needs_pre() => Err(err(CAPS_DIRTY).with_message("preAnalysis has not been run")),
            _ => {
                a.status = AnalysisStatus::PostRequired;
                Ok(0)
            }
        }
    }

    fn post_analysis(&self, analysis: ObjHandle) -> Result<(), CapsError> {
        let (aim_name, inputs, outputs) = {
            let st = self.state.borrow();
            let a = st.analysis(analysis)?;
            match a.status {
                AnalysisStatus::UpToDate => return Err(err(CAPS_CLEAN)),
                s if s.needs_pre() => {
                    return Err(err(CAPS_DIRTY).with_message("preAnalysis has not been run"));
                }
                _ => {}
            }
            let mut inputs = BTreeMap::new();
            for h in st.children(analysis, ObjectType::Value, SubType::AnalysisIn)? {
                inputs.insert(st.get(h)?.name.clone(), decode(&st.resolve(h)?.wire)?);
            }
            let outputs = st.children(analysis, ObjectType::Value, SubType::AnalysisOut)?;
            (a.aim.clone(), inputs, outputs)
        };

        let aim = self.aim(&aim_name)?;
        let results = match &aim.post {
            Some(post) => post(&inputs)?,
            None => BTreeMap::new(),
        };

        let mut st = self.state.borrow_mut();
        for h in outputs {
            let name = st.get(h)?.name.clone();
            let Some(result) = results.get(&name) else {
                continue;
            };
            let mut wire = encode(result)?;
            let v = st.value_mut(h)?;
            if v.units.is_some() {
                wire.promote_to_double();
            }
            v.vtype = wire.vtype;
            v.nrow = wire.nrow;
            v.ncol = wire.ncol;
            v.dim = Dim::of_shape(wire.nrow, wire.ncol);
            v.null = if wire.is_null() {
                NullState::IsNull
            } else if wire.partial.is_some() {
                NullState::IsPartial
            } else {
                NullState::NotNull
            };
            v.data = wire.data;
            v.partial = wire.partial;
            st.touch(h);
        }
        st.analysis_mut(analysis)?.status = AnalysisStatus::UpToDate;
        st.touch(analysis);
        debug!(?analysis, aim = %aim_name, outputs = results.len(), "mock post-analysis");
        Ok(())
    }

    fn dirty_analyses(&self, problem: ObjHandle) -> Result<Vec<ObjHandle>, CapsError> {
        let st = self.state.borrow();
        st.expect_problem(problem)?;
        let mut dirty = Vec::new();
        for a in st.analyses(problem)? {
            if st.analysis(a)?.status != AnalysisStatus::UpToDate {
                dirty.push(a);
            }
        }
        Ok(dirty)
    }

    fn aim_backdoor(&self, analysis: ObjHandle, json: &str) -> Result<String, CapsError> {
        let aim_name = self.state.borrow().analysis(analysis)?.aim.clone();
        match &self.aim(&aim_name)?.backdoor {
            Some(backdoor) => backdoor(json),
            None => Err(err(CAPS_NOTIMPLEMENT).with_message(format!("{aim_name} has no backdoor"))),
        }
    }

    fn make_bound(&self, problem: ObjHandle, dim: usize, name: &str) -> Result<ObjHandle, CapsError> {
        let mut st = self.state.borrow_mut();
        st.expect_problem(problem)?;
        if name.is_empty() {
            return Err(err(CAPS_NULLNAME));
        }
        if !(1..=3).contains(&dim) {
            return Err(err(CAPS_RANGEERR).with_message(format!("Bound dimension {dim}")));
        }
        if st.child_named(problem, ObjectType::Bound, name)?.is_some() {
            return Err(err(CAPS_EXISTS).with_message(format!("bound '{name}' already exists")));
        }
        let limits = (0..dim).flat_map(|_| [0.0, 1.0]).collect();
        Ok(st.adopt(
            problem,
            name,
            ObjectType::Bound,
            SubType::None,
            Body::Bound(MockBound {
                dim,
                state: BoundState::Open,
                limits,
            }),
        ))
    }

    fn bound_info(&self, bound: ObjHandle) -> Result<BoundInfo, CapsError> {
        let st = self.state.borrow();
        let b = st.bound(bound)?;
        Ok(BoundInfo {
            state: b.state,
            dim: b.dim,
            limits: b.limits.clone(),
        })
    }

    fn complete_bound(&self, bound: ObjHandle) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        self.require_open(&st, bound)?;
        let sets = st.children(bound, ObjectType::VertexSet, SubType::None)?;
        for &vs in &sets {
            let Some(analysis) = st.vertex_set(vs)?.analysis else {
                continue;
            };
            let aim_name = st.analysis(analysis)?.aim.clone();
            let points = self.aim(&aim_name)?.discretization;
            st.vertex_set_mut(vs)?.points = vec![[0.0; 3]; points];
        }
        st.bound_mut(bound)?.state = match sets.len() {
            0 => BoundState::Empty,
            1 => BoundState::Single,
            _ => BoundState::Multiple,
        };
        st.touch(bound);
        Ok(())
    }

    fn make_vertex_set(&self, bound: ObjHandle, analysis: Option<ObjHandle>, name: Option<&str>) -> Result<ObjHandle, CapsError> {
        let mut st = self.state.borrow_mut();
        self.require_open(&st, bound)?;
        let (stype, name) = match analysis {
            Some(a) => {
                st.analysis(a)?;
                if st.problem_of(a)? != st.problem_of(bound)? {
                    return Err(err(CAPS_MISMATCH));
                }
                let default = st.get(a)?.name.clone();
                (SubType::Connected, name.map_or(default, str::to_string))
            }
            None => (
                SubType::Unconnected,
                name.ok_or_else(|| err(CAPS_NULLNAME))?.to_string(),
            ),
        };
        if st.child_named(bound, ObjectType::VertexSet, &name)?.is_some() {
            return Err(err(CAPS_EXISTS).with_message(format!("vertex set '{name}' already exists")));
        }
        let vs = st.adopt(
            bound,
            &name,
            ObjectType::VertexSet,
            stype,
            Body::VertexSet(MockVertexSet {
                analysis,
                points: Vec::new(),
            }),
        );
        st.adopt(
            vs,
            XYZ,
            ObjectType::DataSet,
            SubType::None,
            Body::DataSet(MockDataSet {
                method: DataMethod::BuiltIn,
                rank: 3,
                data: None,
                startup: None,
                units: None,
            }),
        );
        Ok(vs)
    }

    fn vertex_set_info(&self, vertex_set: ObjHandle) -> Result<VertexSetInfo, CapsError> {
        let st = self.state.borrow();
        let vs = st.vertex_set(vertex_set)?;
        Ok(VertexSetInfo {
            geometry_points: vs.points.len(),
            data_points: vs.points.len(),
            bound: self.vertex_set_bound(&st, vertex_set)?,
            analysis: vs.analysis,
        })
    }

    fn fill_unconnected_vertex_set(&self, vertex_set: ObjHandle, xyz: &[[f64; 3]]) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        if st.get(vertex_set)?.stype != SubType::Unconnected {
            return Err(err(CAPS_BADTYPE));
        }
        let bound = self.vertex_set_bound(&st, vertex_set)?;
        self.require_open(&st, bound)?;
        if xyz.is_empty() {
            return Err(err(CAPS_NULLVALUE));
        }
        st.vertex_set_mut(vertex_set)?.points = xyz.to_vec();
        Ok(())
    }

    fn make_data_set(&self, vertex_set: ObjHandle, name: &str, method: DataMethod, rank: usize) -> Result<ObjHandle, CapsError> {
        let mut st = self.state.borrow_mut();
        let bound = self.vertex_set_bound(&st, vertex_set)?;
        self.require_open(&st, bound)?;
        if name.is_empty() {
            return Err(err(CAPS_NULLNAME));
        }
        if name == XYZ || method == DataMethod::BuiltIn {
            return Err(err(CAPS_BADDSETNAME).with_message(format!("'{name}' is reserved")));
        }
        if rank == 0 {
            return Err(err(CAPS_BADRANK));
        }
        if st.child_named(vertex_set, ObjectType::DataSet, name)?.is_some() {
            return Err(err(CAPS_EXISTS).with_message(format!("data set '{name}' already exists")));
        }
        if method == DataMethod::Analysis {
            let analysis = st.vertex_set(vertex_set)?.analysis.ok_or_else(|| err(CAPS_BADMETHOD))?;
            let aim_name = st.analysis(analysis)?.aim.clone();
            let field = self
                .aim(&aim_name)?
                .fields
                .iter()
                .find(|f| f.name == name)
                .ok_or_else(|| err(CAPS_BADDSETNAME).with_message(format!("{aim_name} provides no field '{name}'")))?;
            if field.rank != rank {
                return Err(err(CAPS_BADRANK));
            }
        }
        Ok(st.adopt(
            vertex_set,
            name,
            ObjectType::DataSet,
            SubType::None,
            Body::DataSet(MockDataSet {
                method,
                rank,
                data: None,
                startup: None,
                units: None,
            }),
        ))
    }

    fn init_data_set(&self, data_set: ObjHandle, startup: &[f64]) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        let ds = st.data_set_mut(data_set)?;
        if ds.method == DataMethod::BuiltIn {
            return Err(err(CAPS_BADMETHOD));
        }
        if startup.len() != ds.rank {
            return Err(err(CAPS_BADRANK));
        }
        ds.startup = Some(startup.to_vec());
        Ok(())
    }

    fn get_data(&self, data_set: ObjHandle) -> Result<DataSetData, CapsError> {
        let st = self.state.borrow();
        let ds = st.data_set(data_set)?;
        let (npts, data) = if let Some((npts, data)) = &ds.data {
            (*npts, data.clone())
        } else if let Some(startup) = &ds.startup {
            (1, startup.clone())
        } else {
            let vs = st.get(data_set)?.parent.ok_or_else(|| err(CAPS_NULLOBJ))?;
            let bound = self.vertex_set_bound(&st, vs)?;
            if st.bound(bound)?.state == BoundState::Open {
                return Err(err(CAPS_STATEERR).with_message("Bound is not complete"));
            }
            let points = &st.vertex_set(vs)?.points;
            match ds.method {
                DataMethod::BuiltIn => (points.len(), points.iter().flatten().copied().collect()),
                DataMethod::Analysis => (points.len(), vec![0.0; points.len() * ds.rank]),
                _ => (0, Vec::new()),
            }
        };
        Ok(DataSetData {
            npts,
            rank: ds.rank,
            data,
            units: ds.units.clone(),
        })
    }

    fn set_data(&self, data_set: ObjHandle, data: &DataSetData) -> Result<(), CapsError> {
        let mut st = self.state.borrow_mut();
        let vs = st.get(data_set)?.parent.ok_or_else(|| err(CAPS_NULLOBJ))?;
        let points = st.vertex_set(vs)?.points.len();
        let ds = st.data_set_mut(data_set)?;
        if ds.method != DataMethod::User {
            return Err(err(CAPS_BADMETHOD));
        }
        if data.rank != ds.rank {
            return Err(err(CAPS_BADRANK));
        }
        if data.data.len() != data.npts * data.rank {
            return Err(err(CAPS_BADVALUE).with_message(format!(
                "{} entries for {} points of rank {}",
                data.data.len(),
                data.npts,
                data.rank
            )));
        }
        if points > 0 && data.npts != points {
            return Err(err(CAPS_MISMATCH).with_message(format!("{} points for a {points} point set", data.npts)));
        }
        ds.data = Some((data.npts, data.data.clone()));
        ds.units = data.units.clone();
        Ok(())
    }

    fn get_data_sets(&self, bound: ObjHandle, name: &str) -> Result<Vec<ObjHandle>, CapsError> {
        let st = self.state.borrow();
        st.bound(bound)?;
        let mut found = Vec::new();
        for vs in st.children(bound, ObjectType::VertexSet, SubType::None)? {
            if let Some(ds) = st.child_named(vs, ObjectType::DataSet, name)? {
                found.push(ds);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(x: f64, units: Option<&str>) -> RawValue {
        RawValue::new(
            WireValue {
                vtype: ValueType::Double,
                nrow: 1,
                ncol: 1,
                data: WireData::Doubles(vec![x]),
                partial: None,
            },
            units.map(str::to_string),
        )
    }

    fn csm(name: &str, text: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("mock-caps-{}-{name}.csm", std::process::id()));
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn csm_parameters_become_geometry_values() {
        let path = csm("params", "# wing\ndespmtr span 10\ndimension twist 1 2\ndespmtr twist \"1;2\"\noutpmtr area\nset area 42\n");
        let caps = MockCaps::new();
        let p = caps.open(Path::new("/tmp/wing"), &ProblemSource::Csm(path)).unwrap();
        assert_eq!(caps.size(p, ObjectType::Value, SubType::GeometryIn).unwrap(), 2);
        let twist = caps.child_by_name(p, ObjectType::Value, SubType::GeometryIn, "twist").unwrap();
        let raw = caps.get_value(twist).unwrap();
        assert_eq!((raw.wire.nrow, raw.wire.ncol), (1, 2));
        let area = caps.child_by_index(p, ObjectType::Value, SubType::GeometryOut, 1).unwrap();
        assert_eq!(caps.get_value(area).unwrap().wire.data, WireData::Doubles(vec![42.0]));
        assert_eq!(caps.info(p).unwrap().name, "wing");
    }

    #[test]
    fn missing_script_is_file_not_found() {
        let caps = MockCaps::new();
        let e = caps
            .open(Path::new("/tmp/x"), &ProblemSource::Csm(PathBuf::from("/nonexistent/x.csm")))
            .unwrap_err();
        assert!(e.is(OCSM_FILE_NOT_FOUND));
    }

    #[test]
    fn set_scales_into_stored_units() {
        let path = csm("scale", "despmtr x 1\n");
        let caps = MockCaps::new();
        let p = caps.open(Path::new("/tmp/s"), &ProblemSource::Csm(path)).unwrap();
        let v = caps.make_value(p, "len", SubType::User, &scalar(1.0, Some("m"))).unwrap();
        caps.set_value(v, &scalar(250.0, Some("cm"))).unwrap();
        let WireData::Doubles(d) = caps.get_value(v).unwrap().wire.data else {
            panic!("expected doubles");
        };
        assert!((d[0] - 2.5).abs() < 1e-12);
        assert!(caps.set_value(v, &scalar(1.0, None)).unwrap_err().is(CAPS_UNITERR));
        assert!(caps.set_value(v, &scalar(1.0, Some("s"))).unwrap_err().is(CAPS_UNITERR));
    }

    #[test]
    fn close_releases_everything() {
        let path = csm("close", "despmtr x 1\noutpmtr y\n");
        let caps = MockCaps::new();
        let p = caps.open(Path::new("/tmp/c"), &ProblemSource::Csm(path)).unwrap();
        caps.make_value(p, "u", SubType::User, &scalar(1.0, None)).unwrap();
        assert_eq!(caps.object_count(), 4);
        caps.close(p).unwrap();
        assert_eq!(caps.object_count(), 0);
        assert!(caps.info(p).unwrap_err().is(CAPS_BADOBJECT));
    }

    #[test]
    fn save_then_restart() {
        let path = csm("restart", "despmtr x 1\n");
        let caps = MockCaps::new();
        let p = caps.open(Path::new("/tmp/r1"), &ProblemSource::Csm(path)).unwrap();
        let x = caps.child_by_name(p, ObjectType::Value, SubType::GeometryIn, "x").unwrap();
        caps.set_value(x, &scalar(7.0, None)).unwrap();
        caps.save(p, Path::new("/tmp/r2")).unwrap();
        let q = caps.open(Path::new("/tmp/r2"), &ProblemSource::Restart).unwrap();
        let x = caps.child_by_name(q, ObjectType::Value, SubType::GeometryIn, "x").unwrap();
        assert_eq!(caps.get_value(x).unwrap().wire.data, WireData::Doubles(vec![7.0]));
        assert!(caps
            .open(Path::new("/tmp/nothing"), &ProblemSource::Restart)
            .unwrap_err()
            .is(CAPS_DIRERR));
    }

    #[test]
    fn parse_rejects_bad_numbers() {
        assert!(parse_csm("despmtr x abc\n").unwrap_err().is(OCSM_ILLEGAL_VALUE));
        assert!(parse_csm("dimension x 2 2\ndespmtr x \"1;2;3\"\n").is_err());
        let p = parse_csm("DESPMTR a 1,2,3\nbox 0 0 0 1 1 1\n").unwrap();
        assert_eq!(p.inputs, vec![("a".to_string(), 1, 3, vec![1.0, 2.0, 3.0])]);
    }
}
