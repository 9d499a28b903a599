use caps_types::status::CAPS_BADVALUE;
use caps_types::{CapsError, ValueType};
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Inclusive `[min, max]` limits on a numeric Value object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Limits {
    Integer([i32; 2]),
    Double([f64; 2]),
}

impl Limits {
    /// Limits from a two-entry list of numbers. Two integers give integer
    /// limits; any float makes both doubles.
    pub fn from_value(value: &Value) -> Result<Self, CapsError> {
        let Some([lo, hi]) = value.as_list().and_then(|l| <&[Value; 2]>::try_from(l).ok()) else {
            return Err(CapsError::new(CAPS_BADVALUE)
                .with_message("limits should be 2 element list - [min value, max value]!"));
        };
        match (lo, hi) {
            (Value::Int(a), Value::Int(b)) => Ok(Limits::Integer([*a, *b])),
            _ => match (lo.as_f64(), hi.as_f64()) {
                (Some(a), Some(b)) => Ok(Limits::Double([a, b])),
                _ => Err(CapsError::new(CAPS_BADVALUE).with_message(
                    "Invalid element type for limits value, only int or float values are valid!",
                )),
            },
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Limits::Integer(_) => ValueType::Integer,
            Limits::Double(_) => ValueType::Double,
        }
    }

    pub fn bounds(&self) -> [f64; 2] {
        match *self {
            Limits::Integer([a, b]) => [f64::from(a), f64::from(b)],
            Limits::Double(d) => d,
        }
    }

    pub fn contains(&self, x: f64) -> bool {
        let [lo, hi] = self.bounds();
        x >= lo && x <= hi
    }

    pub fn to_value(&self) -> Value {
        match *self {
            Limits::Integer([a, b]) => Value::from(vec![a, b]),
            Limits::Double([a, b]) => Value::from(vec![a, b]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_and_double_limits() {
        assert_eq!(
            Limits::from_value(&Value::from(vec![0, 10])).unwrap(),
            Limits::Integer([0, 10])
        );
        let mixed = Value::List(vec![Value::Int(0), Value::Double(2.5)]);
        assert_eq!(Limits::from_value(&mixed).unwrap(), Limits::Double([0.0, 2.5]));
        assert!(Limits::Double([0.0, 2.5]).contains(2.5));
    }

    #[test]
    fn malformed_limits() {
        assert!(Limits::from_value(&Value::from(vec![1, 2, 3])).is_err());
        assert!(Limits::from_value(&Value::Int(1)).is_err());
        let text = Value::List(vec![Value::from("a"), Value::Int(1)]);
        assert!(Limits::from_value(&text).unwrap_err().is(CAPS_BADVALUE));
    }
}
