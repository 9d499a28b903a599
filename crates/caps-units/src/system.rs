use caps_types::CapsError;
use serde::{Deserialize, Serialize};

/// Result of combining units.
///
/// When every dimension cancels, what is left is a pure number (the ratio
/// of the unit scales), not a unit string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Derived {
    Units(String),
    Dimensionless(f64),
}

/// Backend that interprets unit strings.
///
/// All failures are `CAPS_UNITERR`: unparseable units, or units that are
/// not commensurable for a conversion.
pub trait UnitSystem {
    /// Convert `value` from `from` units into `to` units.
    fn convert(&self, from: &str, value: f64, to: &str) -> Result<f64, CapsError>;

    fn multiply(&self, a: &str, b: &str) -> Result<Derived, CapsError>;

    fn divide(&self, a: &str, b: &str) -> Result<Derived, CapsError>;

    fn invert(&self, unit: &str) -> Result<Derived, CapsError>;

    fn raise(&self, unit: &str, power: i32) -> Result<Derived, CapsError>;

    /// Check that `unit` parses.
    fn validate(&self, unit: &str) -> Result<(), CapsError>;

    /// Convert each entry of `values`.
    fn convert_all(&self, from: &str, values: &[f64], to: &str) -> Result<Vec<f64>, CapsError> {
        values.iter().map(|&v| self.convert(from, v, to)).collect()
    }

    /// Multiplier applied to stored values set in `from` units: one `from`
    /// expressed in `to`. Only meaningful for units without an offset.
    fn scale(&self, from: &str, to: &str) -> Result<f64, CapsError> {
        self.convert(from, 1.0, to)
    }
}
