//! Session configuration.

use std::path::{Path, PathBuf};

use caps_types::status::OCSM_ERROR_BOUND;
use caps_types::ErrorTable;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Verbosity of the native libraries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum OutLevel {
    Minimal,
    #[default]
    Standard,
    Debug,
}

impl OutLevel {
    pub fn as_raw(self) -> i32 {
        match self {
            OutLevel::Minimal => 0,
            OutLevel::Standard => 1,
            OutLevel::Debug => 2,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(OutLevel::Minimal),
            1 => Some(OutLevel::Standard),
            2 => Some(OutLevel::Debug),
            _ => None,
        }
    }
}

/// Error headers shipped with an ESP installation, and the highest code
/// taken from each. OpenCSM.h also defines non-error constants above its
/// error range.
const ERROR_HEADERS: &[(&str, Option<i32>)] = &[
    ("egadsErrors.h", None),
    ("OpenCSM.h", Some(OCSM_ERROR_BOUND)),
    ("capsErrors.h", None),
];

/// Everything a [`Caps`](crate::Caps) session is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapsConfig {
    /// Root of the ESP installation (`$ESP_ROOT`).
    pub esp_root: Option<PathBuf>,
    /// Verbosity applied to every Problem the session opens.
    pub out_level: OutLevel,
    /// Merge the error names from the installed headers into the table.
    pub load_error_headers: bool,
    /// Base for relative Problem directories.
    pub analysis_root: PathBuf,
}

impl Default for CapsConfig {
    fn default() -> Self {
        Self {
            esp_root: None,
            out_level: OutLevel::Standard,
            load_error_headers: true,
            analysis_root: PathBuf::from("."),
        }
    }
}

impl CapsConfig {
    /// Defaults overridden by `ESP_ROOT` and `CAPS_OUTLEVEL`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `var`.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(root) = var("ESP_ROOT").filter(|r| !r.is_empty()) {
            config.esp_root = Some(PathBuf::from(root));
        }
        if let Some(level) = var("CAPS_OUTLEVEL") {
            match level.trim().parse().ok().and_then(OutLevel::from_raw) {
                Some(level) => config.out_level = level,
                None => warn!(value = %level, "ignoring CAPS_OUTLEVEL outside 0..=2"),
            }
        }
        config
    }

    /// No native chatter and only the built-in error names.
    pub fn quiet() -> Self {
        Self {
            out_level: OutLevel::Minimal,
            load_error_headers: false,
            ..Self::default()
        }
    }

    pub fn with_analysis_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.analysis_root = root.into();
        self
    }

    /// `dir` under `analysis_root` unless it is already absolute.
    pub fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.analysis_root.join(dir)
        }
    }

    /// The built-in table, extended from the installed headers when
    /// enabled. Missing headers are skipped.
    pub fn error_table(&self) -> ErrorTable {
        let mut table = ErrorTable::builtin();
        let Some(root) = self.esp_root.as_deref().filter(|_| self.load_error_headers) else {
            return table;
        };
        let include = root.join("include");
        for &(header, max_code) in ERROR_HEADERS {
            let path = include.join(header);
            match table.load_header(&path, max_code) {
                Ok(added) => debug!(header, added, "error names loaded"),
                Err(e) => warn!(path = %path.display(), error = %e, "error header not read"),
            }
        }
        table
    }
}
