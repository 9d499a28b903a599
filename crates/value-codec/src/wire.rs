use caps_types::{NullState, ValueType};
use serde::{Deserialize, Serialize};

/// One name/value pair of a Tuple value. Both halves are plain text on the
/// wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTuple {
    pub name: String,
    pub value: String,
}

/// Flat payload buffer, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireData {
    Null,
    Integers(Vec<i32>),
    Doubles(Vec<f64>),
    Text(String),
    Tuples(Vec<WireTuple>),
}

impl WireData {
    /// Number of elements in the buffer. Text counts as one.
    pub fn len(&self) -> usize {
        match self {
            WireData::Null => 0,
            WireData::Integers(v) => v.len(),
            WireData::Doubles(v) => v.len(),
            WireData::Text(_) => 1,
            WireData::Tuples(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A value in the form the native `makeValue`/`setValue`/`getValue` calls
/// exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireValue {
    pub vtype: ValueType,
    pub nrow: usize,
    pub ncol: usize,
    pub data: WireData,
    /// Per-element null states. Present only when some element is null.
    pub partial: Option<Vec<NullState>>,
}

impl WireValue {
    pub fn len(&self) -> usize {
        self.nrow * self.ncol
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self) -> bool {
        matches!(self.data, WireData::Null)
    }

    /// Integer payloads become doubles. Used when an integer value is
    /// created with units, since only real values may carry them.
    pub fn promote_to_double(&mut self) {
        if self.vtype != ValueType::Integer {
            return;
        }
        if let WireData::Integers(ints) = &self.data {
            self.data = WireData::Doubles(ints.iter().map(|&i| f64::from(i)).collect());
            self.vtype = ValueType::Double;
        }
    }

    /// The payload read as floats, for numeric buffers.
    pub fn as_doubles(&self) -> Option<Vec<f64>> {
        match &self.data {
            WireData::Integers(v) => Some(v.iter().map(|&i| f64::from(i)).collect()),
            WireData::Doubles(v) => Some(v.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_only_touches_integers() {
        let mut w = WireValue {
            vtype: ValueType::Integer,
            nrow: 2,
            ncol: 1,
            data: WireData::Integers(vec![3, 4]),
            partial: None,
        };
        w.promote_to_double();
        assert_eq!(w.vtype, ValueType::Double);
        assert_eq!(w.data, WireData::Doubles(vec![3.0, 4.0]));

        let mut b = WireValue {
            vtype: ValueType::Boolean,
            nrow: 1,
            ncol: 1,
            data: WireData::Integers(vec![1]),
            partial: None,
        };
        b.promote_to_double();
        assert_eq!(b.vtype, ValueType::Boolean);
    }
}
