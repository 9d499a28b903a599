use caps_types::status::CAPS_BADVALUE;
use caps_types::{CapsError, NullState, ValueType};
use serde_json::Value as Json;

use crate::value::Value;
use crate::wire::{WireData, WireValue};

/// Tuple value text is JSON when it parses, plain text otherwise.
fn tuple_value(text: &str) -> Json {
    serde_json::from_str(text).unwrap_or_else(|_| Json::String(text.to_string()))
}

fn is_masked(partial: Option<&[NullState]>, i: usize) -> bool {
    partial.is_some_and(|mask| mask.get(i) == Some(&NullState::IsNull))
}

/// Rebuild a [`Value`] from its wire form.
///
/// 1x1 collapses to a scalar, a single row or column to a flat list, and
/// anything else to a list of rows. Masked positions decode to `Null`.
pub fn decode(wire: &WireValue) -> Result<Value, CapsError> {
    let elems: Vec<Value> = match &wire.data {
        WireData::Null => return Ok(Value::Null),
        WireData::Text(s) => return Ok(Value::String(s.clone())),
        WireData::Integers(ints) => ints
            .iter()
            .map(|&i| match wire.vtype {
                ValueType::Boolean => Value::Bool(i != 0),
                _ => Value::Int(i),
            })
            .collect(),
        WireData::Doubles(reals) => reals.iter().map(|&d| Value::Double(d)).collect(),
        WireData::Tuples(tuples) => tuples
            .iter()
            .map(|t| Value::Tuple(t.name.clone(), tuple_value(&t.value)))
            .collect(),
    };

    if elems.len() != wire.len() {
        return Err(CapsError::new(CAPS_BADVALUE).with_message(format!(
            "buffer holds {} entries for a {}x{} value",
            elems.len(),
            wire.nrow,
            wire.ncol
        )));
    }

    let partial = wire.partial.as_deref();
    let mut elems: Vec<Value> = elems
        .into_iter()
        .enumerate()
        .map(|(i, v)| if is_masked(partial, i) { Value::Null } else { v })
        .collect();

    if elems.is_empty() {
        return Ok(Value::List(elems));
    }
    if wire.nrow == 1 && wire.ncol == 1 {
        return Ok(elems.remove(0));
    }
    if wire.nrow == 1 || wire.ncol == 1 {
        return Ok(Value::List(elems));
    }
    let rows = elems
        .chunks(wire.ncol)
        .map(|row| Value::List(row.to_vec()))
        .collect();
    Ok(Value::List(rows))
}
