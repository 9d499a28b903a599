//! The Problem: root of every object in a session.

use std::fmt;
use std::path::Path;

use caps_api::{AnalysisQuery, AnalysisSpec, ObjHandle, ObjectInfo};
use caps_types::status::CAPS_RANGEERR;
use caps_types::{CapsError, ObjectType, SubType};
use tracing::{debug, instrument, warn};
use value_codec::Value;

use crate::analysis::Analysis;
use crate::attr::Attributes;
use crate::bound::Bound;
use crate::config::OutLevel;
use crate::session::Caps;
use crate::value::{to_raw, ValueObj};

/// An open Problem. Closed on drop, or explicitly with [`close`](Self::close).
///
/// Every other wrapper borrows the Problem, so it cannot be closed while
/// any of them are alive.
pub struct Problem<'c> {
    caps: &'c Caps,
    handle: ObjHandle,
    open: bool,
}

impl fmt::Debug for Problem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Problem").field("handle", &self.handle).finish()
    }
}

impl<'c> Problem<'c> {
    pub(crate) fn from_handle(caps: &'c Caps, handle: ObjHandle) -> Self {
        Self {
            caps,
            handle,
            open: true,
        }
    }

    pub fn caps(&self) -> &'c Caps {
        self.caps
    }

    pub fn handle(&self) -> ObjHandle {
        self.handle
    }

    pub fn info(&self) -> Result<ObjectInfo, CapsError> {
        self.caps.api().info(self.handle)
    }

    /// Number of children of `otype`; `SubType::None` counts every subtype.
    pub fn size(&self, otype: ObjectType, stype: SubType) -> Result<usize, CapsError> {
        self.caps.api().size(self.handle, otype, stype)
    }

    // ── Values ──────────────────────────────────────────────────────────

    /// Create a Value. User values are deleted when the returned wrapper
    /// drops; Parameters live as long as the Problem.
    #[instrument(skip(self, value), fields(problem = ?self.handle))]
    pub fn make_value(
        &self,
        name: &str,
        stype: SubType,
        value: impl Into<Value>,
        units: Option<&str>,
    ) -> Result<ValueObj<'_>, CapsError> {
        let raw = to_raw(&value.into(), units)?;
        let h = self.caps.api().make_value(self.handle, name, stype, &raw)?;
        debug!(?h, vtype = ?raw.wire.vtype, "value made");
        Ok(if stype == SubType::User {
            ValueObj::owned(self, h)
        } else {
            ValueObj::view(self, h)
        })
    }

    /// A Value child by name.
    pub fn value(&self, stype: SubType, name: &str) -> Result<ValueObj<'_>, CapsError> {
        let h = self.caps.api().child_by_name(self.handle, ObjectType::Value, stype, name)?;
        Ok(ValueObj::view(self, h))
    }

    /// Every Value child of `stype`, in creation order.
    pub fn values(&self, stype: SubType) -> Result<Vec<ValueObj<'_>>, CapsError> {
        let api = self.caps.api();
        (1..=self.size(ObjectType::Value, stype)?)
            .map(|i| Ok(ValueObj::view(self, api.child_by_index(self.handle, ObjectType::Value, stype, i)?)))
            .collect()
    }

    pub fn parameter(&self, name: &str) -> Result<ValueObj<'_>, CapsError> {
        self.value(SubType::Parameter, name)
    }

    /// A design parameter of the geometry.
    pub fn geometry_in(&self, name: &str) -> Result<ValueObj<'_>, CapsError> {
        self.value(SubType::GeometryIn, name)
    }

    /// An output parameter of the geometry.
    pub fn geometry_out(&self, name: &str) -> Result<ValueObj<'_>, CapsError> {
        self.value(SubType::GeometryOut, name)
    }

    // ── Analyses ────────────────────────────────────────────────────────

    /// Probe an AIM without loading it into the Problem.
    pub fn query_analysis(&self, aim: &str) -> Result<AnalysisQuery, CapsError> {
        self.caps.api().query_analysis(self.handle, aim)
    }

    #[instrument(skip(self), fields(problem = ?self.handle))]
    pub fn make_analysis(&self, spec: &AnalysisSpec) -> Result<Analysis<'_>, CapsError> {
        let h = self.caps.api().make_analysis(self.handle, spec)?;
        Ok(Analysis::new(self, h))
    }

    pub fn analysis(&self, name: &str) -> Result<Analysis<'_>, CapsError> {
        let h = self
            .caps
            .api()
            .child_by_name(self.handle, ObjectType::Analysis, SubType::None, name)?;
        Ok(Analysis::new(self, h))
    }

    pub fn analyses(&self) -> Result<Vec<Analysis<'_>>, CapsError> {
        let api = self.caps.api();
        (1..=self.size(ObjectType::Analysis, SubType::None)?)
            .map(|i| {
                let h = api.child_by_index(self.handle, ObjectType::Analysis, SubType::None, i)?;
                Ok(Analysis::new(self, h))
            })
            .collect()
    }

    /// Analyses whose outputs no longer reflect their inputs.
    pub fn dirty_analyses(&self) -> Result<Vec<Analysis<'_>>, CapsError> {
        Ok(self
            .caps
            .api()
            .dirty_analyses(self.handle)?
            .into_iter()
            .map(|h| Analysis::new(self, h))
            .collect())
    }

    // ── Bounds ──────────────────────────────────────────────────────────

    /// Open a new Bound of parametric dimension `dim` (1 to 3).
    pub fn make_bound(&self, dim: usize, name: &str) -> Result<Bound<'_>, CapsError> {
        let h = self.caps.api().make_bound(self.handle, dim, name)?;
        Ok(Bound::new(self, h))
    }

    // ── Files ───────────────────────────────────────────────────────────

    pub fn write_parameters(&self, path: impl AsRef<Path>) -> Result<(), CapsError> {
        self.caps.api().write_parameters(self.handle, path.as_ref())
    }

    pub fn read_parameters(&self, path: impl AsRef<Path>) -> Result<(), CapsError> {
        self.caps.api().read_parameters(self.handle, path.as_ref())
    }

    /// Export the bodies; the format follows the extension.
    pub fn write_geometry(&self, path: impl AsRef<Path>) -> Result<(), CapsError> {
        self.caps.api().write_geometry(self.handle, path.as_ref())
    }

    /// Save the Problem under a new directory.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CapsError> {
        let path = self.caps.config().resolve(path.as_ref());
        self.caps.api().save(self.handle, &path)
    }

    /// Change the native verbosity; returns the previous level.
    pub fn set_out_level(&self, level: OutLevel) -> Result<OutLevel, CapsError> {
        let previous = self.caps.api().out_level(self.handle, level.as_raw())?;
        OutLevel::from_raw(previous)
            .ok_or_else(|| CapsError::new(CAPS_RANGEERR).with_message(format!("out-level {previous}")))
    }

    /// Close now and surface any error, instead of logging it on drop.
    #[instrument(skip(self), fields(problem = ?self.handle))]
    pub fn close(mut self) -> Result<(), CapsError> {
        self.open = false;
        self.caps.api().close(self.handle)
    }
}

impl Attributes for Problem<'_> {
    fn owner(&self) -> &Problem<'_> {
        self
    }

    fn handle(&self) -> ObjHandle {
        self.handle
    }
}

impl Drop for Problem<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        if let Err(e) = self.caps.api().close(self.handle) {
            warn!(problem = ?self.handle, error = %e, "problem not closed");
        }
    }
}
