//! Property-based tests for the in-memory CAPS backend.

use std::path::{Path, PathBuf};

use proptest::prelude::*;

use caps_api::*;
use caps_types::status::CAPS_RANGEERR;
use caps_types::SubType;
use value_codec::{encode, Value, WireData};

const SCRIPT: &str = "despmtr span 10\n";

fn script() -> PathBuf {
    let path = std::env::temp_dir().join(format!("caps-api-{}-prop.csm", std::process::id()));
    std::fs::write(&path, SCRIPT).unwrap();
    path
}

fn open(caps: &MockCaps, name: &str) -> ObjHandle {
    caps.open(Path::new(&format!("/tmp/{name}")), &ProblemSource::Csm(script()))
        .unwrap()
}

fn raw(value: impl Into<Value>, units: Option<&str>) -> RawValue {
    RawValue::new(encode(&value.into()).unwrap(), units.map(str::to_string))
}

fn first_double(r: &RawValue) -> f64 {
    match &r.wire.data {
        WireData::Doubles(d) => d[0],
        other => panic!("expected doubles, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

type ToKelvin = fn(f64) -> f64;

/// A temperature unit with its map into kelvin.
fn arb_temperature() -> impl Strategy<Value = (&'static str, ToKelvin)> {
    prop::sample::select(vec![
        ("K", (|x: f64| x) as ToKelvin),
        ("degC", (|x: f64| x + 273.15) as ToKelvin),
        ("degF", (|x: f64| (x + 459.67) * 5.0 / 9.0) as ToKelvin),
        ("degR", (|x: f64| x * 5.0 / 9.0) as ToKelvin),
    ])
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

// ---------------------------------------------------------------------------
// 1. Values set in any temperature unit are stored in kelvin, offsets included
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn temperatures_stored_in_kelvin(x in -200.0f64..2000.0, (unit, to_kelvin) in arb_temperature()) {
        let caps = MockCaps::new();
        let p = open(&caps, "prop-temperature");
        let v = caps.make_value(p, "t", SubType::User, &raw(300.0, Some("K"))).unwrap();
        caps.set_value(v, &raw(x, Some(unit))).unwrap();

        let stored = caps.get_value(v).unwrap();
        prop_assert_eq!(stored.units.as_deref(), Some("K"));
        prop_assert!(close(first_double(&stored), to_kelvin(x)));
    }
}

// ---------------------------------------------------------------------------
// 2. The out-level switch always hands back the level it replaced
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn out_level_returns_previous(levels in prop::collection::vec(-2i32..5, 1..12)) {
        let caps = MockCaps::new();
        let p = open(&caps, "prop-outlevel");
        let mut current = 1;
        for level in levels {
            match caps.out_level(p, level) {
                Ok(previous) => {
                    prop_assert!((0..=2).contains(&level));
                    prop_assert_eq!(previous, current);
                    current = level;
                }
                Err(e) => {
                    prop_assert!(e.is(CAPS_RANGEERR));
                    prop_assert!(!(0..=2).contains(&level));
                }
            }
        }
    }
}
