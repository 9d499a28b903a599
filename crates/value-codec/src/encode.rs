use caps_types::status::CAPS_BADVALUE;
use caps_types::{CapsError, NullState, ValueType};
use serde_json::Value as Json;
use tracing::debug;

use crate::infer::{flatten, infer_shape, infer_tag};
use crate::value::{Tag, Value};
use crate::wire::{WireData, WireTuple, WireValue};

fn bad_value(message: impl Into<String>) -> CapsError {
    CapsError::new(CAPS_BADVALUE).with_message(message)
}

/// Text form of a tuple's value half: strings as-is, numbers printed,
/// anything else as JSON. Booleans print as `true`/`false` so the text
/// parses back through [`decode`](crate::decode::decode) as a JSON boolean.
fn tuple_text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Numeric buffer plus its null mask. The mask is dropped when no entry is
/// null.
fn numeric<T: Copy + Default>(
    elems: &[&Value],
    pick: impl Fn(&Value) -> Option<T>,
) -> Result<(Vec<T>, Option<Vec<NullState>>), CapsError> {
    let mut data = Vec::with_capacity(elems.len());
    let mut mask = Vec::with_capacity(elems.len());
    for elem in elems {
        if elem.is_null() {
            data.push(T::default());
            mask.push(NullState::IsNull);
            continue;
        }
        let x = pick(*elem).ok_or_else(|| bad_value("List entries must all be same type!"))?;
        data.push(x);
        mask.push(NullState::NotNull);
    }
    let partial = mask.contains(&NullState::IsNull).then_some(mask);
    Ok((data, partial))
}

/// Flatten `value` into its wire form.
pub fn encode(value: &Value) -> Result<WireValue, CapsError> {
    let tag = infer_tag(value)?;
    let (nrow, ncol) = infer_shape(value)?;
    let elems = flatten(value);

    let (vtype, nrow, ncol, data, partial) = match tag {
        Tag::Boolean => {
            let (data, partial) = numeric(&elems, |v| match v {
                Value::Bool(b) => Some(i32::from(*b)),
                _ => None,
            })?;
            (ValueType::Boolean, nrow, ncol, WireData::Integers(data), partial)
        }
        Tag::Integer => {
            let (data, partial) = numeric(&elems, |v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })?;
            (ValueType::Integer, nrow, ncol, WireData::Integers(data), partial)
        }
        Tag::Double => {
            let (data, partial) = numeric(&elems, Value::as_f64)?;
            (ValueType::Double, nrow, ncol, WireData::Doubles(data), partial)
        }
        Tag::String => {
            let [Value::String(s)] = elems.as_slice() else {
                return Err(bad_value("Lists of strings are not supported"));
            };
            (ValueType::String, 1, 1, WireData::Text(s.clone()), None)
        }
        Tag::Tuple => {
            let tuples = elems
                .iter()
                .map(|elem| match elem {
                    Value::Tuple(name, value) => Ok(WireTuple {
                        name: name.clone(),
                        value: tuple_text(value),
                    }),
                    _ => Err(bad_value("Tuple lists may not contain null entries")),
                })
                .collect::<Result<Vec<_>, _>>()?;
            (ValueType::Tuple, nrow, ncol, WireData::Tuples(tuples), None)
        }
        Tag::Dict => {
            let parts = elems
                .iter()
                .map(|elem| match elem {
                    Value::Dict(map) => serde_json::to_string(map).map_err(|e| bad_value(e.to_string())),
                    _ => Err(bad_value("Dict lists may not contain null entries")),
                })
                .collect::<Result<Vec<_>, _>>()?;
            (ValueType::String, 1, 1, WireData::Text(parts.join(";")), None)
        }
        // The library ignores the type tag when the payload is null.
        Tag::Null => (ValueType::Double, nrow, ncol, WireData::Null, None),
    };

    debug!(?tag, ?vtype, nrow, ncol, partial = partial.is_some(), "encoded value");
    Ok(WireValue {
        vtype,
        nrow,
        ncol,
        data,
        partial,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_doubles() {
        let w = encode(&Value::from(vec![Some(1.0), None, Some(3.0)])).unwrap();
        assert_eq!(w.vtype, ValueType::Double);
        assert_eq!((w.nrow, w.ncol), (3, 1));
        assert_eq!(w.data, WireData::Doubles(vec![1.0, 0.0, 3.0]));
        assert_eq!(
            w.partial,
            Some(vec![NullState::NotNull, NullState::IsNull, NullState::NotNull])
        );
    }

    #[test]
    fn booleans_as_integers() {
        let w = encode(&Value::from(vec![true, false])).unwrap();
        assert_eq!(w.vtype, ValueType::Boolean);
        assert_eq!(w.data, WireData::Integers(vec![1, 0]));
        assert!(w.partial.is_none());
    }

    #[test]
    fn string_lists_rejected() {
        let err = encode(&Value::from(vec!["a", "b"])).unwrap_err();
        assert!(err.is(CAPS_BADVALUE));
        let w = encode(&Value::from("hello")).unwrap();
        assert_eq!(w.data, WireData::Text("hello".into()));
    }

    #[test]
    fn tuple_values_as_text() {
        let v = Value::List(vec![
            Value::tuple("Mach", 0.5),
            Value::tuple("Name", "wing"),
            Value::tuple("Opts", json!({"a": [1, 2]})),
            Value::tuple("Viscous", true),
        ]);
        let w = encode(&v).unwrap();
        let WireData::Tuples(t) = w.data else {
            panic!("expected tuples");
        };
        assert_eq!(t[0].value, "0.5");
        assert_eq!(t[1].value, "wing");
        assert_eq!(t[2].value, r#"{"a":[1,2]}"#);
        assert_eq!(t[3].value, "true");
    }

    #[test]
    fn dicts_join_with_semicolon() {
        let a = json!({"x": 1}).as_object().cloned().unwrap();
        let b = json!({"y": "z"}).as_object().cloned().unwrap();
        let w = encode(&Value::List(vec![Value::Dict(a), Value::Dict(b)])).unwrap();
        assert_eq!(w.vtype, ValueType::String);
        assert_eq!(w.data, WireData::Text(r#"{"x":1};{"y":"z"}"#.into()));
    }

    #[test]
    fn null_keeps_shape() {
        let w = encode(&Value::Null).unwrap();
        assert!(w.is_null());
        assert_eq!((w.nrow, w.ncol), (1, 1));
    }
}
