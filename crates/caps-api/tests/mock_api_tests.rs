use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use caps_api::*;
use caps_types::status::*;
use caps_types::{
    AnalysisStatus, BoundState, DataMethod, Dim, Fixed, NullState, ObjectType, SubType, TransferMethod, ValueType,
};
use value_codec::{encode, Limits, Value, WireData, WireValue};

// ── Helpers ─────────────────────────────────────────────────────────────

const WING: &str = "\
# simple wing
despmtr span 10
despmtr area 20
dimension camber 1 3
despmtr camber \"0.1;0.2;0.3\"
outpmtr volume
set volume 5
";

fn script(name: &str, text: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("caps-api-{}-{name}.csm", std::process::id()));
    std::fs::write(&path, text).unwrap();
    path
}

fn wing(caps: &MockCaps, name: &str) -> ObjHandle {
    let csm = script(name, WING);
    caps.open(Path::new(&format!("/tmp/{name}")), &ProblemSource::Csm(csm)).unwrap()
}

fn raw(value: impl Into<Value>, units: Option<&str>) -> RawValue {
    RawValue::new(encode(&value.into()).unwrap(), units.map(str::to_string))
}

fn doubles(r: &RawValue) -> Vec<f64> {
    match &r.wire.data {
        WireData::Doubles(d) => d.clone(),
        other => panic!("expected doubles, got {other:?}"),
    }
}

fn geometry_in(caps: &MockCaps, p: ObjHandle, name: &str) -> ObjHandle {
    caps.child_by_name(p, ObjectType::Value, SubType::GeometryIn, name).unwrap()
}

fn flow_aim() -> MockAim {
    MockAim::new("flowAIM")
        .input("Mach", 0.5, None)
        .input("Alpha", 0.0, Some("degree"))
        .fixed_input("Tags", Value::from(vec![1, 2]), None)
        .input("Notes", Value::Null, None)
        .output("CL", None)
        .output("Drag", Some("N"))
        .field("Pressure", 1)
        .field("Displacement", 3)
        .discretization(4)
        .on_post(|inputs| {
            let mach = inputs["Mach"].as_f64().unwrap_or_default();
            let alpha = inputs["Alpha"].as_f64().unwrap_or_default();
            let mut out = BTreeMap::new();
            out.insert("CL".to_string(), Value::from(2.0 * alpha + mach));
            out.insert("Drag".to_string(), Value::from(10));
            Ok(out)
        })
        .on_backdoor(|json| Ok(format!("{{\"echo\": {json}}}")))
}

fn with_flow(name: &str) -> (MockCaps, ObjHandle, ObjHandle) {
    let caps = MockCaps::new().with_aim(flow_aim());
    let p = wing(&caps, name);
    let a = caps.make_analysis(p, &AnalysisSpec::new("flowAIM")).unwrap();
    (caps, p, a)
}

fn analysis_in(caps: &MockCaps, a: ObjHandle, name: &str) -> ObjHandle {
    caps.child_by_name(a, ObjectType::Value, SubType::AnalysisIn, name).unwrap()
}

fn analysis_out(caps: &MockCaps, a: ObjHandle, name: &str) -> ObjHandle {
    caps.child_by_name(a, ObjectType::Value, SubType::AnalysisOut, name).unwrap()
}

fn run(caps: &MockCaps, a: ObjHandle) {
    caps.pre_analysis(a).unwrap();
    assert_eq!(caps.run_analysis(a).unwrap(), 0);
    caps.post_analysis(a).unwrap();
}

// ── Problem ─────────────────────────────────────────────────────────────

#[test]
fn problem_children_and_info() {
    let caps = MockCaps::new();
    let p = wing(&caps, "children");
    let info = caps.info(p).unwrap();
    assert_eq!(info.otype, ObjectType::Problem);
    assert_eq!(info.stype, SubType::Parametric);
    assert_eq!(info.parent, None);
    assert_eq!(caps.size(p, ObjectType::Value, SubType::GeometryIn).unwrap(), 3);
    assert_eq!(caps.size(p, ObjectType::Value, SubType::GeometryOut).unwrap(), 1);
    assert_eq!(caps.size(p, ObjectType::Value, SubType::None).unwrap(), 4);

    let first = caps.child_by_index(p, ObjectType::Value, SubType::GeometryIn, 1).unwrap();
    assert_eq!(caps.info(first).unwrap().name, "span");
    assert!(caps
        .child_by_index(p, ObjectType::Value, SubType::GeometryIn, 0)
        .unwrap_err()
        .is(CAPS_BADINDEX));
    assert!(caps
        .child_by_name(p, ObjectType::Value, SubType::GeometryIn, "chord")
        .unwrap_err()
        .is(CAPS_NOTFOUND));
}

#[test]
fn geometry_parameters_are_fixed() {
    let caps = MockCaps::new();
    let p = wing(&caps, "fixed");
    let camber = geometry_in(&caps, p, "camber");
    let props = caps.get_value_props(camber).unwrap();
    assert!(props.geometry_parameter);
    assert_eq!(props.length, Fixed::Fixed);
    assert_eq!(props.null, NullState::NotAllowed);
    assert_eq!(props.dim, Dim::Vector);

    let err = caps.set_value(camber, &raw(vec![1.0, 2.0], None)).unwrap_err();
    assert!(err.is(CAPS_SHAPEERR));
    assert!(caps.set_value(camber, &raw(Value::Null, None)).unwrap_err().is(CAPS_NULLVALUE));
    caps.set_value(camber, &raw(vec![0.0, 0.5, 1.0], None)).unwrap();
    assert_eq!(doubles(&caps.get_value(camber).unwrap()), vec![0.0, 0.5, 1.0]);
}

#[test]
fn egads_problems_are_static() {
    let egads = std::env::temp_dir().join(format!("caps-api-{}-static.egads", std::process::id()));
    std::fs::write(&egads, "model").unwrap();
    let caps = MockCaps::new();
    let p = caps.open(Path::new("/tmp/static"), &ProblemSource::Egads(egads)).unwrap();
    assert_eq!(caps.info(p).unwrap().stype, SubType::Static);
    assert!(caps
        .open(Path::new("/tmp/static2"), &ProblemSource::Egads("/nonexistent.egads".into()))
        .unwrap_err()
        .is(EGADS_NOTFOUND));
}

#[test]
fn out_level_returns_previous() {
    let caps = MockCaps::new();
    let p = wing(&caps, "outlevel");
    assert_eq!(caps.out_level(p, 0).unwrap(), 1);
    assert_eq!(caps.out_level(p, 2).unwrap(), 0);
    assert!(caps.out_level(p, 3).unwrap_err().is(CAPS_RANGEERR));
    let span = geometry_in(&caps, p, "span");
    assert!(caps.out_level(span, 1).unwrap_err().is(CAPS_NOTPROBLEM));
}

#[test]
fn parameters_file_round_trip() {
    let caps = MockCaps::new();
    let p = wing(&caps, "pmtrs");
    let span = geometry_in(&caps, p, "span");
    caps.set_value(span, &raw(12.5, None)).unwrap();
    let file = std::env::temp_dir().join(format!("caps-api-{}-pmtrs.txt", std::process::id()));
    caps.write_parameters(p, &file).unwrap();

    caps.set_value(span, &raw(1.0, None)).unwrap();
    caps.read_parameters(p, &file).unwrap();
    assert_eq!(doubles(&caps.get_value(span).unwrap()), vec![12.5]);
}

#[test]
fn geometry_export_checks_extension() {
    let caps = MockCaps::new();
    let p = wing(&caps, "export");
    let good = std::env::temp_dir().join(format!("caps-api-{}-wing.egads", std::process::id()));
    caps.write_geometry(p, &good).unwrap();
    assert!(good.is_file());
    let bad = std::env::temp_dir().join("wing.xyz");
    assert!(caps.write_geometry(p, &bad).unwrap_err().is(CAPS_BADNAME));
}

// ── Values ──────────────────────────────────────────────────────────────

#[test]
fn make_value_rules() {
    let caps = MockCaps::new();
    let p = wing(&caps, "makevalue");
    let v = caps.make_value(p, "count", SubType::Parameter, &raw(3, None)).unwrap();
    assert_eq!(caps.info(v).unwrap().stype, SubType::Parameter);
    assert_eq!(caps.size(p, ObjectType::Value, SubType::Parameter).unwrap(), 1);

    let u = caps.make_value(p, "scratch", SubType::User, &raw(1.0, None)).unwrap();
    assert_eq!(caps.size(p, ObjectType::Value, SubType::User).unwrap(), 0);
    assert_eq!(caps.info(u).unwrap().parent, Some(p));

    let err = caps.make_value(p, "bad", SubType::GeometryIn, &raw(1.0, None)).unwrap_err();
    assert!(err.is(CAPS_BADTYPE));
    let err = caps.make_value(p, "bad", SubType::User, &raw(1, Some("m"))).unwrap_err();
    assert!(err.is(CAPS_UNITERR));
    let err = caps.make_value(p, "bad", SubType::User, &raw(1.0, Some("furlongz^"))).unwrap_err();
    assert!(err.is(CAPS_UNITERR));
    let err = caps.make_value(p, "", SubType::User, &raw(1.0, None)).unwrap_err();
    assert!(err.is(CAPS_NULLNAME));
}

#[test]
fn integers_fill_double_values() {
    let caps = MockCaps::new();
    let p = wing(&caps, "intdouble");
    let v = caps.make_value(p, "x", SubType::User, &raw(1.5, Some("m"))).unwrap();
    caps.set_value(v, &raw(200, Some("cm"))).unwrap();
    assert_relative_eq!(doubles(&caps.get_value(v).unwrap())[0], 2.0, epsilon = 1e-12);
    let v2 = caps.make_value(p, "y", SubType::User, &raw(1.5, None)).unwrap();
    caps.set_value(v2, &raw(4, None)).unwrap();
    let got = caps.get_value(v2).unwrap();
    assert_eq!(got.wire.vtype, ValueType::Double);
    assert_eq!(doubles(&got), vec![4.0]);

    let s = caps.make_value(p, "s", SubType::User, &raw("text", None)).unwrap();
    assert!(caps.set_value(s, &raw(4, None)).unwrap_err().is(CAPS_BADTYPE));
}

#[test]
fn partial_nulls_keep_mask() {
    let caps = MockCaps::new();
    let p = wing(&caps, "partial");
    let v = caps
        .make_value(p, "xs", SubType::User, &raw(vec![1.0, 2.0, 3.0], None))
        .unwrap();
    caps.set_value(v, &raw(vec![Value::from(1.0), Value::Null, Value::from(3.0)], None))
        .unwrap();
    assert_eq!(caps.get_value_props(v).unwrap().null, NullState::IsPartial);
    let got = caps.get_value(v).unwrap();
    assert_eq!(
        got.wire.partial,
        Some(vec![NullState::NotNull, NullState::IsNull, NullState::NotNull])
    );

    caps.set_value(v, &raw(Value::Null, None)).unwrap();
    let got = caps.get_value(v).unwrap();
    assert!(got.wire.is_null());
    assert_eq!((got.wire.nrow, got.wire.ncol), (0, 0));
}

#[test]
fn empty_value_is_range_error() {
    let caps = MockCaps::new();
    let p = wing(&caps, "empty");
    let v = caps.make_value(p, "x", SubType::User, &raw(1.0, None)).unwrap();
    let empty = RawValue::new(
        WireValue {
            vtype: ValueType::Double,
            nrow: 0,
            ncol: 0,
            data: WireData::Doubles(Vec::new()),
            partial: None,
        },
        None,
    );
    assert!(caps.set_value(v, &empty).unwrap_err().is(CAPS_RANGEERR));
}

#[test]
fn limits_are_enforced_and_scaled() {
    let caps = MockCaps::new();
    let p = wing(&caps, "limits");
    let v = caps.make_value(p, "len", SubType::User, &raw(1.0, Some("m"))).unwrap();
    assert_eq!(caps.get_limits(v).unwrap(), None);

    caps.set_limits(v, Some(&Limits::Double([0.0, 200.0])), Some("cm")).unwrap();
    let (limits, units) = caps.get_limits(v).unwrap().unwrap();
    assert_eq!(units.as_deref(), Some("m"));
    let [lo, hi] = limits.bounds();
    assert_relative_eq!(lo, 0.0);
    assert_relative_eq!(hi, 2.0, epsilon = 1e-12);

    assert!(caps.set_value(v, &raw(3.0, Some("m"))).unwrap_err().is(CAPS_RANGEERR));
    caps.set_value(v, &raw(150.0, Some("cm"))).unwrap();

    let err = caps.set_limits(v, Some(&Limits::Double([1.0, 0.0])), Some("m")).unwrap_err();
    assert!(err.is(CAPS_RANGEERR));
    let err = caps.set_limits(v, Some(&Limits::Double([2.0, 3.0])), Some("m")).unwrap_err();
    assert!(err.is(CAPS_RANGEERR));

    caps.set_limits(v, None, None).unwrap();
    assert_eq!(caps.get_limits(v).unwrap(), None);

    let n = caps.make_value(p, "n", SubType::User, &raw(2, None)).unwrap();
    let err = caps.set_limits(n, Some(&Limits::Double([0.0, 1.0])), None).unwrap_err();
    assert!(err.is(CAPS_BADTYPE));
    caps.set_limits(n, Some(&Limits::Integer([0, 5])), None).unwrap();
    let s = caps.make_value(p, "s", SubType::User, &raw("a", None)).unwrap();
    assert!(caps.get_limits(s).unwrap_err().is(CAPS_BADTYPE));
}

#[test]
fn temperature_offsets_apply_on_set() {
    let caps = MockCaps::new();
    let p = wing(&caps, "offsets");
    let t = caps.make_value(p, "t", SubType::User, &raw(300.0, Some("K"))).unwrap();
    caps.set_value(t, &raw(100.0, Some("degC"))).unwrap();
    assert_relative_eq!(doubles(&caps.get_value(t).unwrap())[0], 373.15, epsilon = 1e-9);

    caps.set_limits(t, Some(&Limits::Double([0.0, 200.0])), Some("degC")).unwrap();
    let [lo, hi] = caps.get_limits(t).unwrap().unwrap().0.bounds();
    assert_relative_eq!(lo, 273.15, epsilon = 1e-9);
    assert_relative_eq!(hi, 473.15, epsilon = 1e-9);
    assert!(caps.set_value(t, &raw(-10.0, Some("degC"))).unwrap_err().is(CAPS_RANGEERR));
}

#[test]
fn value_props_shape_rules() {
    let caps = MockCaps::new();
    let p = wing(&caps, "props");
    let v = caps
        .make_value(p, "m", SubType::User, &raw(vec![vec![1.0, 2.0], vec![3.0, 4.0]], None))
        .unwrap();
    let mut props = caps.get_value_props(v).unwrap();
    assert_eq!(props.dim, Dim::Array2D);
    props.dim = Dim::Vector;
    assert!(caps.set_value_props(v, &props).unwrap_err().is(CAPS_SHAPEERR));

    let s = caps.make_value(p, "s", SubType::User, &raw(1.0, None)).unwrap();
    let mut props = caps.get_value_props(s).unwrap();
    props.dim = Dim::Scalar;
    props.shape = Fixed::Fixed;
    caps.set_value_props(s, &props).unwrap();
    assert!(caps.set_value(s, &raw(vec![1.0, 2.0], None)).unwrap_err().is(CAPS_SHAPEERR));

    let span = geometry_in(&caps, p, "span");
    let props = caps.get_value_props(span).unwrap();
    assert!(caps.set_value_props(span, &props).unwrap_err().is(CAPS_BADTYPE));
}

#[test]
fn convert_into_value_units() {
    let caps = MockCaps::new();
    let p = wing(&caps, "convert");
    let v = caps.make_value(p, "len", SubType::User, &raw(1.0, Some("m"))).unwrap();
    assert_relative_eq!(caps.convert_value(v, 100.0, "cm").unwrap(), 1.0, epsilon = 1e-12);
    assert!(caps.convert_value(v, 1.0, "s").unwrap_err().is(CAPS_UNITERR));
    let plain = caps.make_value(p, "n", SubType::User, &raw(1.0, None)).unwrap();
    assert!(caps.convert_value(plain, 1.0, "m").unwrap_err().is(CAPS_UNITERR));
}

#[test]
fn attributes_are_copies() {
    let caps = MockCaps::new();
    let p = wing(&caps, "attrs");
    let v = caps.make_value(p, "tag", SubType::User, &raw("blue", None)).unwrap();
    caps.set_attr(p, "color", v).unwrap();
    assert_eq!(caps.size(p, ObjectType::Attributes, SubType::None).unwrap(), 1);

    let copy = caps.attr_by_name(p, "color").unwrap();
    assert_ne!(copy, v);
    assert_eq!(caps.get_value(copy).unwrap().wire.data, WireData::Text("blue".into()));
    let (name, _) = caps.attr_by_index(p, 1).unwrap();
    assert_eq!(name, "color");
    assert!(caps.attr_by_index(p, 2).unwrap_err().is(CAPS_BADINDEX));

    caps.delete_attr(p, "color").unwrap();
    assert!(caps.attr_by_name(p, "color").unwrap_err().is(CAPS_NOTFOUND));
    assert!(caps.delete_attr(p, "color").unwrap_err().is(CAPS_NOTFOUND));
}

#[test]
fn delete_only_user_values_and_bounds() {
    let caps = MockCaps::new();
    let p = wing(&caps, "delete");
    let u = caps.make_value(p, "u", SubType::User, &raw(1.0, None)).unwrap();
    caps.delete(u).unwrap();
    assert!(caps.info(u).unwrap_err().is(CAPS_BADOBJECT));
    let span = geometry_in(&caps, p, "span");
    assert!(caps.delete(span).unwrap_err().is(CAPS_BADTYPE));
    let b = caps.make_bound(p, 2, "wall").unwrap();
    caps.delete(b).unwrap();
    assert_eq!(caps.size(p, ObjectType::Bound, SubType::None).unwrap(), 0);
}

#[test]
fn sensitivities_on_double_dot_values() {
    let caps = MockCaps::new();
    let p = wing(&caps, "dots");
    let volume = caps.child_by_name(p, ObjectType::Value, SubType::GeometryOut, "volume").unwrap();
    assert!(caps.has_dot(volume).unwrap().is_empty());
    caps.set_dot(
        volume,
        "span",
        DotInfo {
            len: 1,
            rank: 1,
            dot: vec![0.5],
        },
    )
    .unwrap();
    assert_eq!(caps.has_dot(volume).unwrap(), vec!["span".to_string()]);
    assert_eq!(caps.get_dot(volume, "span").unwrap().dot, vec![0.5]);
    assert!(caps.get_dot(volume, "area").unwrap_err().is(CAPS_NOTFOUND));
    let span = geometry_in(&caps, p, "span");
    assert!(caps.has_dot(span).unwrap_err().is(CAPS_BADTYPE));
}

// ── Links and transfers ─────────────────────────────────────────────────

#[test]
fn linked_values_follow_source() {
    let caps = MockCaps::new();
    let p = wing(&caps, "links");
    let src = caps.make_value(p, "src", SubType::Parameter, &raw(15.0, None)).unwrap();
    let span = geometry_in(&caps, p, "span");
    caps.make_linkage(Some(src), TransferMethod::Copy, span).unwrap();
    assert!(caps.info(span).unwrap().linked);
    assert_eq!(doubles(&caps.get_value(span).unwrap()), vec![15.0]);
    assert!(caps.set_value(span, &raw(1.0, None)).unwrap_err().is(CAPS_LINKERR));

    caps.set_value(src, &raw(16.0, None)).unwrap();
    assert_eq!(doubles(&caps.get_value(span).unwrap()), vec![16.0]);

    caps.make_linkage(None, TransferMethod::Copy, span).unwrap();
    assert!(!caps.info(span).unwrap().linked);
    caps.set_value(span, &raw(1.0, None)).unwrap();
}

#[test]
fn linkage_rejections() {
    let caps = MockCaps::new();
    let p = wing(&caps, "linkrej");
    let a = caps.make_value(p, "a", SubType::Parameter, &raw(1.0, None)).unwrap();
    let b = caps.make_value(p, "b", SubType::Parameter, &raw(1.0, None)).unwrap();
    caps.make_linkage(Some(a), TransferMethod::Copy, b).unwrap();
    let err = caps.make_linkage(Some(b), TransferMethod::Copy, a).unwrap_err();
    assert!(err.is(CAPS_CIRCULARLINK));

    let text = caps.make_value(p, "t", SubType::Parameter, &raw("x", None)).unwrap();
    assert!(caps.make_linkage(Some(text), TransferMethod::Copy, a).unwrap_err().is(CAPS_BADTYPE));

    let metres = caps.make_value(p, "m", SubType::Parameter, &raw(1.0, Some("m"))).unwrap();
    assert!(caps.make_linkage(Some(metres), TransferMethod::Copy, a).unwrap_err().is(CAPS_UNITERR));

    let user = caps.make_value(p, "u", SubType::User, &raw(1.0, None)).unwrap();
    assert!(caps.make_linkage(Some(a), TransferMethod::Copy, user).unwrap_err().is(CAPS_BADTYPE));
    let err = caps.make_linkage(Some(a), TransferMethod::Average, b).unwrap_err();
    assert!(err.is(CAPS_BADMETHOD));

    let camber = geometry_in(&caps, p, "camber");
    assert!(caps.make_linkage(Some(a), TransferMethod::Copy, camber).unwrap_err().is(CAPS_SHAPEERR));
}

#[test]
fn transfer_converts_units() {
    let caps = MockCaps::new();
    let p = wing(&caps, "transfer");
    let cm = caps.make_value(p, "cm", SubType::Parameter, &raw(250.0, Some("cm"))).unwrap();
    let m = caps.make_value(p, "m", SubType::Parameter, &raw(1.0, Some("m"))).unwrap();
    caps.transfer_values(cm, TransferMethod::Copy, m).unwrap();
    assert_relative_eq!(doubles(&caps.get_value(m).unwrap())[0], 2.5, epsilon = 1e-12);
    assert!(!caps.info(m).unwrap().linked);

    let err = caps.transfer_values(cm, TransferMethod::Integrate, m).unwrap_err();
    assert!(err.is(CAPS_BADMETHOD));
    let volume = caps.child_by_name(p, ObjectType::Value, SubType::GeometryOut, "volume").unwrap();
    assert!(caps.transfer_values(cm, TransferMethod::Copy, volume).unwrap_err().is(CAPS_BADTYPE));
}

// ── Analyses ────────────────────────────────────────────────────────────

#[test]
fn query_and_make_analysis() {
    let (caps, p, a) = with_flow("query");
    let q = caps.query_analysis(p, "flowAIM").unwrap();
    assert_eq!((q.inputs, q.outputs), (4, 2));
    assert!(caps.query_analysis(p, "nope").unwrap_err().is(CAPS_NOTFOUND));

    let info = caps.analysis_info(a).unwrap();
    assert_eq!(info.status, AnalysisStatus::DirtyInputs);
    assert_eq!(info.directory, PathBuf::from("/tmp/query/flowAIM"));
    assert_eq!(info.fields.len(), 2);
    assert_eq!(caps.size(a, ObjectType::Value, SubType::AnalysisIn).unwrap(), 4);

    let err = caps.make_analysis(p, &AnalysisSpec::new("flowAIM")).unwrap_err();
    assert!(err.is(CAPS_EXISTS));
    let b = caps.make_analysis(p, &AnalysisSpec::new("flowAIM").named("second")).unwrap();
    assert_eq!(caps.info(b).unwrap().name, "second");
}

#[test]
fn analysis_input_defaults() {
    let (caps, _, a) = with_flow("defaults");
    let notes = analysis_in(&caps, a, "Notes");
    assert_eq!(caps.get_value_props(notes).unwrap().null, NullState::IsNull);
    let tags = analysis_in(&caps, a, "Tags");
    assert!(caps.set_value(tags, &raw(vec![1, 2, 3], None)).unwrap_err().is(CAPS_SHAPEERR));
    let mach = analysis_in(&caps, a, "Mach");
    assert!(caps.set_value(mach, &raw(Value::Null, None)).unwrap_err().is(CAPS_NULLVALUE));
    let alpha = analysis_in(&caps, a, "Alpha");
    caps.set_value(alpha, &raw(std::f64::consts::PI / 180.0, Some("rad"))).unwrap();
    assert_relative_eq!(doubles(&caps.get_value(alpha).unwrap())[0], 1.0, epsilon = 1e-9);
}

#[test]
fn execution_sequence() {
    let (caps, p, a) = with_flow("sequence");
    let cl = analysis_out(&caps, a, "CL");
    assert!(caps.get_value(cl).unwrap_err().is(CAPS_DIRTY));
    assert!(caps.run_analysis(a).unwrap_err().is(CAPS_DIRTY));
    assert!(caps.post_analysis(a).unwrap_err().is(CAPS_DIRTY));
    assert_eq!(caps.dirty_analyses(p).unwrap(), vec![a]);

    let alpha = analysis_in(&caps, a, "Alpha");
    caps.set_value(alpha, &raw(2.0, Some("degree"))).unwrap();
    run(&caps, a);

    assert_eq!(caps.analysis_info(a).unwrap().status, AnalysisStatus::UpToDate);
    assert!(caps.dirty_analyses(p).unwrap().is_empty());
    assert_eq!(doubles(&caps.get_value(cl).unwrap()), vec![4.5]);
    let drag = caps.get_value(analysis_out(&caps, a, "Drag")).unwrap();
    assert_eq!(drag.wire.vtype, ValueType::Double);
    assert_eq!(drag.units.as_deref(), Some("N"));
    assert!(caps.pre_analysis(a).unwrap_err().is(CAPS_CLEAN));
}

#[test]
fn geometry_change_dirties_analyses() {
    let (caps, p, a) = with_flow("geomdirty");
    run(&caps, a);
    let span = geometry_in(&caps, p, "span");
    caps.set_value(span, &raw(11.0, None)).unwrap();
    assert_eq!(caps.analysis_info(a).unwrap().status, AnalysisStatus::DirtyGeometry);
    let mach = analysis_in(&caps, a, "Mach");
    caps.set_value(mach, &raw(0.8, None)).unwrap();
    assert_eq!(caps.analysis_info(a).unwrap().status, AnalysisStatus::DirtyBoth);
}

#[test]
fn linked_inputs_dirty_consumers() {
    let (caps, p, a) = with_flow("linkdirty");
    let src = caps.make_value(p, "mach", SubType::Parameter, &raw(0.3, None)).unwrap();
    caps.make_linkage(Some(src), TransferMethod::Copy, analysis_in(&caps, a, "Mach"))
        .unwrap();
    run(&caps, a);
    caps.set_value(src, &raw(0.4, None)).unwrap();
    assert_eq!(caps.analysis_info(a).unwrap().status, AnalysisStatus::DirtyInputs);
}

#[test]
fn backdoor_echoes() {
    let (caps, _, a) = with_flow("backdoor");
    assert_eq!(caps.aim_backdoor(a, "1").unwrap(), "{\"echo\": 1}");
    let plain = MockCaps::new().with_aim(MockAim::new("bare"));
    let p = wing(&plain, "backdoor2");
    let b = plain.make_analysis(p, &AnalysisSpec::new("bare")).unwrap();
    assert!(plain.aim_backdoor(b, "{}").unwrap_err().is(CAPS_NOTIMPLEMENT));
}

// ── Bounds ──────────────────────────────────────────────────────────────

#[test]
fn bound_lifecycle() {
    let (caps, p, a) = with_flow("bound");
    assert!(caps.make_bound(p, 4, "x").unwrap_err().is(CAPS_RANGEERR));
    let b = caps.make_bound(p, 2, "wall").unwrap();
    assert!(caps.make_bound(p, 2, "wall").unwrap_err().is(CAPS_EXISTS));
    let info = caps.bound_info(b).unwrap();
    assert_eq!(info.state, BoundState::Open);
    assert_eq!(info.limits, vec![0.0, 1.0, 0.0, 1.0]);

    let vs = caps.make_vertex_set(b, Some(a), None).unwrap();
    assert_eq!(caps.info(vs).unwrap().name, "flowAIM");
    assert_eq!(caps.info(vs).unwrap().stype, SubType::Connected);
    let pressure = caps.make_data_set(vs, "Pressure", DataMethod::Analysis, 1).unwrap();
    assert!(caps.make_data_set(vs, "xyz", DataMethod::User, 3).unwrap_err().is(CAPS_BADDSETNAME));
    assert!(caps
        .make_data_set(vs, "Pressure2", DataMethod::Analysis, 1)
        .unwrap_err()
        .is(CAPS_BADDSETNAME));
    assert!(caps
        .make_data_set(vs, "Displacement", DataMethod::Analysis, 1)
        .unwrap_err()
        .is(CAPS_BADRANK));
    assert!(caps.get_data(pressure).unwrap_err().is(CAPS_STATEERR));

    caps.complete_bound(b).unwrap();
    assert_eq!(caps.bound_info(b).unwrap().state, BoundState::Single);
    assert!(caps.complete_bound(b).unwrap_err().is(CAPS_STATEERR));
    assert!(caps.make_vertex_set(b, None, Some("late")).unwrap_err().is(CAPS_STATEERR));

    let info = caps.vertex_set_info(vs).unwrap();
    assert_eq!(info.geometry_points, 4);
    assert_eq!(info.bound, b);
    assert_eq!(info.analysis, Some(a));
    let data = caps.get_data(pressure).unwrap();
    assert_eq!((data.npts, data.rank), (4, 1));
    let xyz = caps.get_data_sets(b, "xyz").unwrap();
    assert_eq!(xyz.len(), 1);
    assert_eq!(caps.get_data(xyz[0]).unwrap().data.len(), 12);
}

#[test]
fn unconnected_sets_and_user_data() {
    let caps = MockCaps::new();
    let p = wing(&caps, "unconnected");
    let b = caps.make_bound(p, 1, "line").unwrap();
    assert!(caps.make_vertex_set(b, None, None).unwrap_err().is(CAPS_NULLNAME));
    let vs = caps.make_vertex_set(b, None, Some("probe")).unwrap();
    assert_eq!(caps.vertex_set_info(vs).unwrap().analysis, None);
    assert!(caps.fill_unconnected_vertex_set(vs, &[]).unwrap_err().is(CAPS_NULLVALUE));
    caps.fill_unconnected_vertex_set(vs, &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]])
        .unwrap();
    assert!(caps
        .make_data_set(vs, "load", DataMethod::Analysis, 1)
        .unwrap_err()
        .is(CAPS_BADMETHOD));

    let load = caps.make_data_set(vs, "load", DataMethod::User, 2).unwrap();
    assert!(caps.init_data_set(load, &[1.0]).unwrap_err().is(CAPS_BADRANK));
    caps.init_data_set(load, &[1.0, 2.0]).unwrap();
    let startup = caps.get_data(load).unwrap();
    assert_eq!((startup.npts, startup.data.clone()), (1, vec![1.0, 2.0]));

    caps.complete_bound(b).unwrap();
    let bad = DataSetData {
        npts: 2,
        rank: 2,
        data: vec![1.0; 3],
        units: None,
    };
    assert!(caps.set_data(load, &bad).unwrap_err().is(CAPS_BADVALUE));
    let wrong_count = DataSetData {
        npts: 3,
        rank: 2,
        data: vec![1.0; 6],
        units: None,
    };
    assert!(caps.set_data(load, &wrong_count).unwrap_err().is(CAPS_MISMATCH));
    let good = DataSetData {
        npts: 2,
        rank: 2,
        data: vec![1.0, 2.0, 3.0, 4.0],
        units: Some("N".into()),
    };
    caps.set_data(load, &good).unwrap();
    assert_eq!(caps.get_data(load).unwrap(), good);
    assert_eq!(good.points().count(), 2);

    let xyz = caps.get_data_sets(b, "xyz").unwrap()[0];
    assert!(caps.set_data(xyz, &good).unwrap_err().is(CAPS_BADMETHOD));
}

#[test]
fn close_releases_analyses_and_bounds() {
    let (caps, p, a) = with_flow("closeall");
    let b = caps.make_bound(p, 2, "wall").unwrap();
    caps.make_vertex_set(b, Some(a), None).unwrap();
    caps.close(p).unwrap();
    assert_eq!(caps.object_count(), 0);
}
