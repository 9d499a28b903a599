//! Property-based tests for value inference and the wire round trip.

use proptest::prelude::*;

use value_codec::{decode, encode, infer_tag, Tag, Value, WireData};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_int() -> impl Strategy<Value = i32> {
    -10_000i32..10_000
}

fn arb_real() -> impl Strategy<Value = f64> {
    -1.0e6f64..1.0e6
}

/// Rows x cols grid with at least two of each, so nothing collapses.
fn arb_grid() -> impl Strategy<Value = Vec<Vec<f64>>> {
    (2usize..6, 2usize..6).prop_flat_map(|(rows, cols)| {
        prop::collection::vec(prop::collection::vec(arb_real(), cols), rows)
    })
}

fn arb_sparse() -> impl Strategy<Value = Vec<Option<f64>>> {
    prop::collection::vec(prop::option::of(arb_real()), 2..12)
}

// ---------------------------------------------------------------------------
// 1. Homogeneous integer lists infer Integer; any real entry promotes
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn integer_lists_infer_integer(ints in prop::collection::vec(arb_int(), 1..20)) {
        prop_assert_eq!(infer_tag(&Value::from(ints)).unwrap(), Tag::Integer);
    }

    #[test]
    fn one_real_promotes_to_double(
        ints in prop::collection::vec(arb_int(), 1..20),
        real in arb_real(),
        at in any::<prop::sample::Index>(),
    ) {
        let mut items: Vec<Value> = ints.into_iter().map(Value::Int).collect();
        let pos = at.index(items.len() + 1);
        items.insert(pos, Value::Double(real));
        prop_assert_eq!(infer_tag(&Value::List(items)).unwrap(), Tag::Double);
    }
}

// ---------------------------------------------------------------------------
// 2. Shape survives the round trip
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn grid_round_trip(grid in arb_grid()) {
        let (rows, cols) = (grid.len(), grid[0].len());
        let value = Value::from(grid);
        let wire = encode(&value).unwrap();
        prop_assert_eq!((wire.nrow, wire.ncol), (rows, cols));
        prop_assert_eq!(wire.data.len(), rows * cols);
        prop_assert_eq!(decode(&wire).unwrap(), value);
    }

    #[test]
    fn single_row_collapses_to_flat_list(row in prop::collection::vec(arb_real(), 2..10)) {
        let wire = encode(&Value::from(vec![row.clone()])).unwrap();
        prop_assert_eq!(wire.nrow, 1);
        prop_assert_eq!(decode(&wire).unwrap(), Value::from(row));
    }

    #[test]
    fn scalar_collapses(x in arb_real()) {
        let wire = encode(&Value::from(vec![vec![x]])).unwrap();
        prop_assert_eq!(decode(&wire).unwrap(), Value::Double(x));
    }
}

// ---------------------------------------------------------------------------
// 3. Null entries are tracked by the mask and come back as Null
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn partial_mask_tracks_nulls(sparse in arb_sparse()) {
        prop_assume!(sparse.iter().any(Option::is_some));
        let value = Value::from(sparse.clone());
        let wire = encode(&value).unwrap();
        let nulls = sparse.iter().filter(|x| x.is_none()).count();
        match &wire.partial {
            Some(mask) => prop_assert_eq!(
                mask.iter().filter(|s| **s == caps_types::NullState::IsNull).count(),
                nulls
            ),
            None => prop_assert_eq!(nulls, 0),
        }
        prop_assert!(matches!(wire.data, WireData::Doubles(_)));
        prop_assert_eq!(decode(&wire).unwrap(), value);
    }
}
