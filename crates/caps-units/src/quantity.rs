use std::cmp::Ordering;
use std::ops::Range;

use caps_types::status::{CAPS_BADINDEX, CAPS_BADVALUE, CAPS_UNITERR};
use caps_types::CapsError;
use serde::{Deserialize, Serialize};

use crate::system::{Derived, UnitSystem};

/// The numeric half of a [`Quantity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Magnitude {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Magnitude {
    pub fn len(&self) -> usize {
        match self {
            Magnitude::Scalar(_) => 1,
            Magnitude::Vector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Magnitude::Scalar(_))
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Magnitude::Scalar(x) => Some(*x),
            Magnitude::Vector(_) => None,
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Magnitude::Scalar(x) => vec![*x],
            Magnitude::Vector(v) => v.clone(),
        }
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Magnitude {
        match self {
            Magnitude::Scalar(x) => Magnitude::Scalar(f(*x)),
            Magnitude::Vector(v) => Magnitude::Vector(v.iter().map(|&x| f(x)).collect()),
        }
    }

    pub fn try_map<E>(&self, f: impl Fn(f64) -> Result<f64, E>) -> Result<Magnitude, E> {
        match self {
            Magnitude::Scalar(x) => Ok(Magnitude::Scalar(f(*x)?)),
            Magnitude::Vector(v) => v
                .iter()
                .map(|&x| f(x))
                .collect::<Result<Vec<_>, E>>()
                .map(Magnitude::Vector),
        }
    }

    /// Elementwise combination. Scalars broadcast against vectors; two
    /// vectors must match in length and are only accepted when
    /// `elementwise` is set.
    fn zip_with(&self, other: &Magnitude, elementwise: bool, f: impl Fn(f64, f64) -> f64) -> Result<Magnitude, CapsError> {
        match (self, other) {
            (Magnitude::Scalar(a), Magnitude::Scalar(b)) => Ok(Magnitude::Scalar(f(*a, *b))),
            (Magnitude::Vector(a), Magnitude::Scalar(b)) => Ok(Magnitude::Vector(a.iter().map(|&x| f(x, *b)).collect())),
            (Magnitude::Scalar(a), Magnitude::Vector(b)) => Ok(Magnitude::Vector(b.iter().map(|&y| f(*a, y)).collect())),
            (Magnitude::Vector(a), Magnitude::Vector(b)) => {
                if !elementwise {
                    return Err(CapsError::new(CAPS_BADVALUE).with_message("cannot combine two vector quantities"));
                }
                if a.len() != b.len() {
                    return Err(CapsError::new(CAPS_BADVALUE)
                        .with_message(format!("length mismatch: {} vs {}", a.len(), b.len())));
                }
                Ok(Magnitude::Vector(a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()))
            }
        }
    }
}

impl From<f64> for Magnitude {
    fn from(x: f64) -> Self {
        Magnitude::Scalar(x)
    }
}

impl From<i32> for Magnitude {
    fn from(x: i32) -> Self {
        Magnitude::Scalar(f64::from(x))
    }
}

impl From<Vec<f64>> for Magnitude {
    fn from(v: Vec<f64>) -> Self {
        Magnitude::Vector(v)
    }
}

impl From<&[f64]> for Magnitude {
    fn from(v: &[f64]) -> Self {
        Magnitude::Vector(v.to_vec())
    }
}

/// Outcome of multiplying or dividing quantities: either a quantity, or a
/// plain number once every dimension cancels.
#[derive(Debug, Clone, PartialEq)]
pub enum Product {
    Quantity(Quantity),
    Dimensionless(Magnitude),
}

impl Product {
    fn from_derived(value: Magnitude, derived: Derived) -> Product {
        match derived {
            Derived::Units(units) => Product::Quantity(Quantity { value, units }),
            Derived::Dimensionless(scale) => Product::Dimensionless(value.map(|x| x * scale)),
        }
    }

    pub fn as_quantity(&self) -> Option<&Quantity> {
        match self {
            Product::Quantity(q) => Some(q),
            Product::Dimensionless(_) => None,
        }
    }

    pub fn dimensionless(&self) -> Option<&Magnitude> {
        match self {
            Product::Quantity(_) => None,
            Product::Dimensionless(m) => Some(m),
        }
    }

    /// The quantity, or `CAPS_UNITERR` if the units cancelled.
    pub fn into_quantity(self) -> Result<Quantity, CapsError> {
        match self {
            Product::Quantity(q) => Ok(q),
            Product::Dimensionless(m) => Err(CapsError::new(CAPS_UNITERR)
                .with_message(format!("result {m:?} is dimensionless"))),
        }
    }
}

fn floor_mod(a: f64, b: f64) -> f64 {
    a - b * (a / b).floor()
}

/// A value paired with a unit string.
///
/// Arithmetic goes through a [`UnitSystem`]; nothing here parses units.
/// Binary operations convert the right operand into the left operand's
/// units first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub(crate) value: Magnitude,
    pub(crate) units: String,
}

impl Quantity {
    pub fn new(value: impl Into<Magnitude>, units: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            units: units.into(),
        }
    }

    /// One of `units`.
    pub fn unit(units: impl Into<String>) -> Self {
        Self::new(1.0, units)
    }

    pub fn value(&self) -> &Magnitude {
        &self.value
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn into_parts(self) -> (Magnitude, String) {
        (self.value, self.units)
    }

    /// Same quantity expressed in `to` units.
    pub fn convert(&self, sys: &dyn UnitSystem, to: &str) -> Result<Quantity, CapsError> {
        let value = self
            .value
            .try_map(|x| sys.convert(&self.units, x, to))
            .map_err(|e| {
                let context = format!("Cannot convert {self} to '{to}'");
                match e.message.clone() {
                    Some(why) => e.with_message(format!("{context}: {why}")),
                    None => e.with_message(context),
                }
            })?;
        Ok(Quantity::new(value, to))
    }

    fn other_in_my_units(&self, sys: &dyn UnitSystem, other: &Quantity) -> Result<Magnitude, CapsError> {
        Ok(other.convert(sys, &self.units)?.value)
    }

    pub fn add(&self, sys: &dyn UnitSystem, other: &Quantity) -> Result<Quantity, CapsError> {
        let rhs = self.other_in_my_units(sys, other)?;
        let value = self.value.zip_with(&rhs, true, |a, b| a + b)?;
        Ok(Quantity::new(value, self.units.clone()))
    }

    pub fn sub(&self, sys: &dyn UnitSystem, other: &Quantity) -> Result<Quantity, CapsError> {
        let rhs = self.other_in_my_units(sys, other)?;
        let value = self.value.zip_with(&rhs, true, |a, b| a - b)?;
        Ok(Quantity::new(value, self.units.clone()))
    }

    /// Floored modulo, taking the sign of the divisor.
    pub fn rem(&self, sys: &dyn UnitSystem, other: &Quantity) -> Result<Quantity, CapsError> {
        let rhs = self.other_in_my_units(sys, other)?;
        let value = self.value.zip_with(&rhs, true, floor_mod)?;
        Ok(Quantity::new(value, self.units.clone()))
    }

    pub fn multiply(&self, sys: &dyn UnitSystem, other: &Quantity) -> Result<Product, CapsError> {
        let derived = sys.multiply(&self.units, &other.units)?;
        let value = self.value.zip_with(&other.value, false, |a, b| a * b)?;
        Ok(Product::from_derived(value, derived))
    }

    pub fn divide(&self, sys: &dyn UnitSystem, other: &Quantity) -> Result<Product, CapsError> {
        let derived = sys.divide(&self.units, &other.units)?;
        let value = self.value.zip_with(&other.value, false, |a, b| a / b)?;
        Ok(Product::from_derived(value, derived))
    }

    /// Raise to an integer power. A result whose dimensions cancel keeps
    /// the unit `1`.
    pub fn pow(&self, sys: &dyn UnitSystem, power: i32) -> Result<Quantity, CapsError> {
        let value = self.value.map(|x| x.powi(power));
        match sys.raise(&self.units, power)? {
            Derived::Units(units) => Ok(Quantity::new(value, units)),
            Derived::Dimensionless(scale) => Ok(Quantity::new(value.map(|x| x * scale), "1")),
        }
    }

    /// Like [`pow`](Self::pow) for a float exponent, which must be integral.
    pub fn pow_f64(&self, sys: &dyn UnitSystem, power: f64) -> Result<Quantity, CapsError> {
        if power.fract() != 0.0 || power.abs() > f64::from(i32::MAX) {
            return Err(CapsError::new(CAPS_BADVALUE)
                .with_message(format!("Units can only be raised by integer powers! Power = {power}")));
        }
        self.pow(sys, power as i32)
    }

    pub fn reciprocal(&self, sys: &dyn UnitSystem) -> Result<Product, CapsError> {
        let derived = sys.invert(&self.units)?;
        Ok(Product::from_derived(self.value.map(|x| 1.0 / x), derived))
    }

    /// Scale a list of plain numbers by a scalar quantity.
    pub fn broadcast(&self, values: &[f64]) -> Result<Quantity, CapsError> {
        let Magnitude::Scalar(s) = self.value else {
            return Err(CapsError::new(CAPS_BADVALUE).with_message("only a scalar quantity can scale a list"));
        };
        Ok(Quantity::new(
            values.iter().map(|&v| v * s).collect::<Vec<_>>(),
            self.units.clone(),
        ))
    }

    /// Plain radians, for feeding trigonometric functions.
    pub fn as_angle(&self, sys: &dyn UnitSystem) -> Result<Magnitude, CapsError> {
        match self.divide(sys, &Quantity::unit("rad"))? {
            Product::Dimensionless(m) => Ok(m),
            Product::Quantity(q) => Err(CapsError::new(CAPS_UNITERR).with_message(format!("{q} is not an angle"))),
        }
    }

    /// Order after converting `other` into these units. Vectors compare
    /// lexicographically; a scalar and a vector do not compare.
    pub fn compare(&self, sys: &dyn UnitSystem, other: &Quantity) -> Result<Option<Ordering>, CapsError> {
        let rhs = self.other_in_my_units(sys, other)?;
        match (&self.value, &rhs) {
            (Magnitude::Scalar(a), Magnitude::Scalar(b)) => Ok(a.partial_cmp(b)),
            (Magnitude::Vector(a), Magnitude::Vector(b)) => Ok(a.partial_cmp(b)),
            _ => Err(CapsError::new(CAPS_BADVALUE).with_message("cannot compare a scalar with a vector")),
        }
    }

    pub fn lt(&self, sys: &dyn UnitSystem, other: &Quantity) -> Result<bool, CapsError> {
        Ok(self.compare(sys, other)? == Some(Ordering::Less))
    }

    pub fn le(&self, sys: &dyn UnitSystem, other: &Quantity) -> Result<bool, CapsError> {
        Ok(matches!(self.compare(sys, other)?, Some(Ordering::Less | Ordering::Equal)))
    }

    pub fn gt(&self, sys: &dyn UnitSystem, other: &Quantity) -> Result<bool, CapsError> {
        Ok(self.compare(sys, other)? == Some(Ordering::Greater))
    }

    pub fn ge(&self, sys: &dyn UnitSystem, other: &Quantity) -> Result<bool, CapsError> {
        Ok(matches!(self.compare(sys, other)?, Some(Ordering::Greater | Ordering::Equal)))
    }

    /// Unit-aware equality. Incommensurable units are simply unequal.
    pub fn equals(&self, sys: &dyn UnitSystem, other: &Quantity) -> bool {
        match other.convert(sys, &self.units) {
            Ok(converted) => converted.value == self.value,
            Err(_) => false,
        }
    }

    fn resolve_index(&self, index: isize) -> Result<usize, CapsError> {
        let len = self.len() as isize;
        let i = if index < 0 { index + len } else { index };
        if i < 0 || i >= len {
            return Err(CapsError::new(CAPS_BADINDEX)
                .with_message(format!("index {index} out of range for length {len}")));
        }
        Ok(i as usize)
    }

    /// One entry, with these units. Negative indices count from the end;
    /// `0` and `-1` on a scalar return the scalar.
    pub fn get(&self, index: isize) -> Result<Quantity, CapsError> {
        let i = self.resolve_index(index)?;
        let value = match &self.value {
            Magnitude::Scalar(x) => *x,
            Magnitude::Vector(v) => v[i],
        };
        Ok(Quantity::new(value, self.units.clone()))
    }

    pub fn slice(&self, range: Range<usize>) -> Result<Quantity, CapsError> {
        let Magnitude::Vector(v) = &self.value else {
            return Err(CapsError::new(CAPS_BADINDEX).with_message("cannot slice a scalar quantity"));
        };
        let part = v.get(range.clone()).ok_or_else(|| {
            CapsError::new(CAPS_BADINDEX).with_message(format!("slice {range:?} out of range for length {}", v.len()))
        })?;
        Ok(Quantity::new(part.to_vec(), self.units.clone()))
    }

    /// Overwrite one entry with a scalar quantity, converted into these
    /// units first.
    pub fn set(&mut self, sys: &dyn UnitSystem, index: isize, other: &Quantity) -> Result<(), CapsError> {
        let Magnitude::Scalar(x) = self.other_in_my_units(sys, other)? else {
            return Err(CapsError::new(CAPS_BADVALUE).with_message("can only assign a scalar quantity to an entry"));
        };
        let i = self.resolve_index(index)?;
        match &mut self.value {
            Magnitude::Scalar(s) => *s = x,
            Magnitude::Vector(v) => v[i] = x,
        }
        Ok(())
    }

    pub fn add_assign(&mut self, sys: &dyn UnitSystem, other: &Quantity) -> Result<(), CapsError> {
        *self = self.add(sys, other)?;
        Ok(())
    }

    pub fn sub_assign(&mut self, sys: &dyn UnitSystem, other: &Quantity) -> Result<(), CapsError> {
        *self = self.sub(sys, other)?;
        Ok(())
    }

    /// Fails with `CAPS_UNITERR`, leaving `self` untouched, when the units
    /// would cancel.
    pub fn mul_assign(&mut self, sys: &dyn UnitSystem, other: &Quantity) -> Result<(), CapsError> {
        *self = self.multiply(sys, other)?.into_quantity()?;
        Ok(())
    }

    pub fn div_assign(&mut self, sys: &dyn UnitSystem, other: &Quantity) -> Result<(), CapsError> {
        *self = self.divide(sys, other)?.into_quantity()?;
        Ok(())
    }

    pub fn pow_assign(&mut self, sys: &dyn UnitSystem, power: i32) -> Result<(), CapsError> {
        *self = self.pow(sys, power)?;
        Ok(())
    }
}
