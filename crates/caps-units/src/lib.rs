//! Unit algebra for physical quantities.
//!
//! [`UnitSystem`] is the seam to whatever actually understands unit
//! strings: the native udunits-backed calls in production, or
//! [`BuiltinUnits`] when no native library is loaded. [`Quantity`] layers
//! value-plus-unit arithmetic on top of either.

pub mod builtin;
pub mod ops;
pub mod quantity;
pub mod system;

pub use builtin::BuiltinUnits;
pub use quantity::{Magnitude, Product, Quantity};
pub use system::{Derived, UnitSystem};
