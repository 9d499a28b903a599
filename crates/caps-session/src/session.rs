//! The session registry.

use std::fmt;
use std::path::Path;

use caps_api::{CapsApi, MockCaps, ProblemSource};
use caps_types::{check, CapsError, ErrorTable};
use caps_units::{BuiltinUnits, UnitSystem};
use tracing::{debug, instrument};

use crate::config::CapsConfig;
use crate::problem::Problem;

/// One initialized binding: the call table, the unit system and the merged
/// error table, immutable once built. Every wrapper borrows it.
pub struct Caps {
    api: Box<dyn CapsApi>,
    units: Box<dyn UnitSystem>,
    errors: ErrorTable,
    config: CapsConfig,
}

impl fmt::Debug for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caps")
            .field("revision", &self.api.revision())
            .field("errors", &self.errors.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Caps {
    pub fn new(config: CapsConfig, api: impl CapsApi + 'static, units: impl UnitSystem + 'static) -> Self {
        let errors = config.error_table();
        debug!(codes = errors.len(), revision = ?api.revision(), "caps session initialized");
        Self {
            api: Box::new(api),
            units: Box::new(units),
            errors,
            config,
        }
    }

    /// Session over an empty in-memory [`MockCaps`] and the built-in units.
    pub fn mock(config: CapsConfig) -> Self {
        Self::new(config, MockCaps::new(), BuiltinUnits)
    }

    /// Session over libcaps and its udunits-backed unit calls.
    #[cfg(feature = "native")]
    pub fn native(config: CapsConfig) -> Self {
        let errors = config.error_table();
        Self::new(config, caps_api::NativeCaps::new(errors), caps_api::NativeUnits)
    }

    pub fn api(&self) -> &dyn CapsApi {
        self.api.as_ref()
    }

    pub fn units(&self) -> &dyn UnitSystem {
        self.units.as_ref()
    }

    pub fn errors(&self) -> &ErrorTable {
        &self.errors
    }

    pub fn config(&self) -> &CapsConfig {
        &self.config
    }

    pub fn revision(&self) -> (i32, i32) {
        self.api.revision()
    }

    /// Status check against the session's error table.
    pub fn check(&self, status: i32) -> Result<i32, CapsError> {
        check(status, &self.errors)
    }

    /// Error for `status`, named from the session's table.
    pub fn error(&self, status: i32) -> CapsError {
        CapsError::from_status(status, &self.errors)
    }

    /// Open a Problem in `dir` (relative to the configured analysis root)
    /// and apply the configured out-level to it.
    #[instrument(skip(self, dir), fields(dir = %dir.as_ref().display()))]
    pub fn open(&self, dir: impl AsRef<Path>, source: ProblemSource) -> Result<Problem<'_>, CapsError> {
        let dir = self.config.resolve(dir.as_ref());
        let handle = self.api.open(&dir, &source)?;
        let problem = Problem::from_handle(self, handle);
        self.api.out_level(handle, self.config.out_level.as_raw())?;
        debug!(?handle, "problem opened");
        Ok(problem)
    }
}
