use caps_types::ValueType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// A value as callers see it.
///
/// Lists nest at most two levels deep (rows of columns). Dicts have no
/// native counterpart and travel as JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Double(f64),
    String(String),
    Tuple(String, Json),
    Dict(Map<String, Json>),
    List(Vec<Value>),
}

/// Element tag inferred from a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    Boolean,
    Integer,
    Double,
    String,
    Tuple,
    Dict,
    Null,
}

impl Tag {
    /// Native value type carrying this tag. Dicts travel as strings; a
    /// whole-null value has no type of its own.
    pub fn value_type(self) -> Option<ValueType> {
        match self {
            Tag::Boolean => Some(ValueType::Boolean),
            Tag::Integer => Some(ValueType::Integer),
            Tag::Double => Some(ValueType::Double),
            Tag::String | Tag::Dict => Some(ValueType::String),
            Tag::Tuple => Some(ValueType::Tuple),
            Tag::Null => None,
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn tuple(name: impl Into<String>, value: impl Into<Json>) -> Self {
        Value::Tuple(name.into(), value.into())
    }

    /// The element as a float, for the numeric variants.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(f64::from(*i)),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Flat numeric view: a number becomes one element, a list of numbers
    /// (possibly two levels deep) is read row-major. `None` on anything else.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.extend(item.to_f64_vec()?);
                }
                Some(out)
            }
            other => other.as_f64().map(|x| vec![x]),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Map<String, Json>> for Value {
    fn from(m: Map<String, Json>) -> Self {
        Value::Dict(m)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(items: &[T]) -> Self {
        Value::List(items.iter().cloned().map(Into::into).collect())
    }
}
