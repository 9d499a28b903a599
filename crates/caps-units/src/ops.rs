//! Operator sugar for the infallible cases: scaling by a plain number and
//! negation. Anything that touches units goes through the named methods.

use std::fmt;
use std::ops::{Div, Mul, Neg};

use crate::quantity::{Magnitude, Quantity};

impl Mul<f64> for Quantity {
    type Output = Quantity;

    fn mul(self, k: f64) -> Quantity {
        Quantity::new(self.value.map(|x| x * k), self.units)
    }
}

impl Mul<Quantity> for f64 {
    type Output = Quantity;

    fn mul(self, q: Quantity) -> Quantity {
        q * self
    }
}

impl Div<f64> for Quantity {
    type Output = Quantity;

    fn div(self, k: f64) -> Quantity {
        Quantity::new(self.value.map(|x| x / k), self.units)
    }
}

impl Neg for Quantity {
    type Output = Quantity;

    fn neg(self) -> Quantity {
        self * -1.0
    }
}

impl fmt::Display for Magnitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Magnitude::Scalar(x) => write!(f, "{x}"),
            Magnitude::Vector(v) => write!(f, "{v:?}"),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value(), self.units())
    }
}
