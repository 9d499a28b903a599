use caps_types::status::CAPS_BADVALUE;
use caps_types::CapsError;

use crate::value::{Tag, Value};

fn merge(acc: Tag, next: Tag) -> Result<Tag, CapsError> {
    match (acc, next) {
        (a, b) if a == b => Ok(a),
        (Tag::Null, t) | (t, Tag::Null) => Ok(t),
        (Tag::Integer, Tag::Double) | (Tag::Double, Tag::Integer) => Ok(Tag::Double),
        _ => Err(CapsError::new(CAPS_BADVALUE).with_message("List entries must all be same type!")),
    }
}

/// Element tag shared by every entry of `value`.
///
/// Integers mixed with doubles promote to `Double`. Null entries are
/// compatible with any tag, so a partially null list keeps the tag of its
/// non-null entries. A list of only nulls is `Null`.
pub fn infer_tag(value: &Value) -> Result<Tag, CapsError> {
    match value {
        Value::List(items) => {
            if items.is_empty() {
                return Err(CapsError::new(CAPS_BADVALUE).with_message("Empty lists are not supported"));
            }
            items
                .iter()
                .try_fold(Tag::Null, |acc, item| merge(acc, infer_tag(item)?))
        }
        Value::Null => Ok(Tag::Null),
        Value::Bool(_) => Ok(Tag::Boolean),
        Value::Int(_) => Ok(Tag::Integer),
        Value::Double(_) => Ok(Tag::Double),
        Value::String(_) => Ok(Tag::String),
        Value::Tuple(..) => Ok(Tag::Tuple),
        Value::Dict(_) => Ok(Tag::Dict),
    }
}

fn ragged() -> CapsError {
    CapsError::new(CAPS_BADVALUE).with_message("Inconsistent list sizes!")
}

/// Row and column counts of `value`. Scalars are 1x1 and a flat list of
/// `n` entries is `n`x1.
pub fn infer_shape(value: &Value) -> Result<(usize, usize), CapsError> {
    let Value::List(rows) = value else {
        return Ok((1, 1));
    };
    let Some(first) = rows.first() else {
        return Err(CapsError::new(CAPS_BADVALUE).with_message("Empty lists are not supported"));
    };
    let nrow = rows.len();
    match first {
        Value::List(cols) => {
            let ncol = cols.len();
            if ncol == 0 {
                return Err(ragged());
            }
            for row in rows {
                let Value::List(cols) = row else {
                    return Err(ragged());
                };
                if cols.len() != ncol {
                    return Err(ragged());
                }
                if cols.iter().any(|c| matches!(c, Value::List(_))) {
                    return Err(CapsError::new(CAPS_BADVALUE)
                        .with_message("Lists nested deeper than two levels are not supported"));
                }
            }
            Ok((nrow, ncol))
        }
        _ => {
            if rows.iter().any(|r| matches!(r, Value::List(_))) {
                return Err(ragged());
            }
            Ok((nrow, 1))
        }
    }
}

/// Entries of `value` in row-major order. Assumes the shape was validated.
pub(crate) fn flatten(value: &Value) -> Vec<&Value> {
    match value {
        Value::List(rows) => rows
            .iter()
            .flat_map(|row| match row {
                Value::List(cols) => cols.iter().collect::<Vec<_>>(),
                other => vec![other],
            })
            .collect(),
        other => vec![other],
    }
}
