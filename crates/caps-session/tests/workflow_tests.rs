use std::collections::BTreeMap;
use std::path::PathBuf;

use approx::assert_relative_eq;
use caps_api::{MockAim, MockCaps};
use caps_session::*;
use caps_types::status::*;
use caps_types::{AnalysisStatus, BoundState, DataMethod, SubType, TransferMethod};
use caps_units::BuiltinUnits;
use serde_json::json;

// ── Helpers ─────────────────────────────────────────────────────────────

const WING: &str = "\
despmtr span 10
despmtr area 20
outpmtr volume
";

fn scratch(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("caps-session-{}-flow-{name}", std::process::id()))
}

fn wing_script(name: &str) -> ProblemSource {
    let path = scratch(&format!("{name}.csm"));
    std::fs::write(&path, WING).unwrap();
    ProblemSource::Csm(path)
}

/// Lift coefficient grows with angle of attack (in degrees) and Mach.
fn flow_aim() -> MockAim {
    MockAim::new("flowAIM")
        .input("Mach", 0.5, None)
        .input("Alpha", 0.0, Some("degree"))
        .fixed_input("Tags", Value::from(vec![1, 2]), None)
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
        .on_backdoor(|request| Ok(format!("{{\"echo\": {request}}}")))
}

fn session(name: &str) -> Caps {
    Caps::new(
        CapsConfig::quiet().with_analysis_root(scratch(name)),
        MockCaps::new().with_aim(flow_aim()),
        BuiltinUnits,
    )
}

// ── Analyses ────────────────────────────────────────────────────────────

#[test]
fn analysis_runs_through_its_phases() {
    let caps = session("phases");
    let problem = caps.open("wing", wing_script("phases")).unwrap();
    let flow = problem.make_analysis(&AnalysisSpec::new("flowAIM")).unwrap();

    assert_eq!(flow.input_names().unwrap(), ["Mach", "Alpha", "Tags"]);
    assert_eq!(flow.output_names().unwrap(), ["CL", "Drag"]);
    assert_eq!(flow.status().unwrap(), AnalysisStatus::DirtyInputs);
    assert!(flow.get_output("CL").unwrap_err().is(CAPS_DIRTY));

    flow.set_input("Mach", 0.7).unwrap();
    flow.set_input_with_units("Alpha", 1.0, "degree").unwrap();

    assert!(flow.run().unwrap_err().is(CAPS_DIRTY));
    flow.pre().unwrap();
    assert_eq!(flow.status().unwrap(), AnalysisStatus::ExecPostRequired);
    assert_eq!(flow.run().unwrap(), 0);
    flow.post().unwrap();
    assert_eq!(flow.status().unwrap(), AnalysisStatus::UpToDate);

    assert_relative_eq!(flow.get_output("CL").unwrap().value.as_f64().unwrap(), 2.7, epsilon = 1e-12);
    assert_eq!(flow.get_output("Drag").unwrap(), ValueData::new(10.0, Some("N")));
    assert!(flow.pre().unwrap_err().is(CAPS_CLEAN));
}

#[test]
fn execute_brings_analysis_current() {
    let caps = session("execute");
    let problem = caps.open("wing", wing_script("execute")).unwrap();
    let flow = problem.make_analysis(&AnalysisSpec::new("flowAIM")).unwrap();

    flow.execute().unwrap();
    assert_relative_eq!(flow.get_output("CL").unwrap().value.as_f64().unwrap(), 0.5, epsilon = 1e-12);
    flow.execute().unwrap();

    flow.input("Alpha")
        .unwrap()
        .set_quantity(&Quantity::new(std::f64::consts::PI / 180.0, "rad"))
        .unwrap();
    assert_eq!(flow.status().unwrap(), AnalysisStatus::DirtyInputs);
    flow.execute().unwrap();
    assert_relative_eq!(flow.get_output("CL").unwrap().value.as_f64().unwrap(), 2.5, epsilon = 1e-9);
}

#[test]
fn geometry_changes_dirty_analyses() {
    let caps = session("dirty");
    let problem = caps.open("wing", wing_script("dirty")).unwrap();
    let flow = problem.make_analysis(&AnalysisSpec::new("flowAIM")).unwrap();
    flow.execute().unwrap();
    assert!(problem.dirty_analyses().unwrap().is_empty());

    problem.geometry_in("span").unwrap().set(12.0).unwrap();
    assert_eq!(problem.dirty_analyses().unwrap(), vec![flow]);
    assert_eq!(flow.status().unwrap(), AnalysisStatus::DirtyGeometry);
    assert!(flow.get_output("CL").unwrap_err().is(CAPS_DIRTY));

    flow.execute().unwrap();
    assert!(problem.dirty_analyses().unwrap().is_empty());
}

#[test]
fn linked_parameter_drives_input() {
    let caps = session("linked");
    let problem = caps.open("wing", wing_script("linked")).unwrap();
    let flow = problem.make_analysis(&AnalysisSpec::new("flowAIM")).unwrap();
    let mach = problem.make_value("Mach", SubType::Parameter, 0.8, None).unwrap();

    flow.input("Mach").unwrap().link(&mach, TransferMethod::Copy).unwrap();
    flow.execute().unwrap();
    assert_relative_eq!(flow.get_output("CL").unwrap().value.as_f64().unwrap(), 0.8, epsilon = 1e-12);

    mach.set(0.9).unwrap();
    assert_eq!(flow.status().unwrap(), AnalysisStatus::DirtyInputs);
    assert_eq!(flow.get_input("Mach").unwrap().value, Value::Double(0.9));
}

#[test]
fn fixed_inputs_keep_their_length() {
    let caps = session("fixed");
    let problem = caps.open("wing", wing_script("fixed")).unwrap();
    let flow = problem.make_analysis(&AnalysisSpec::new("flowAIM")).unwrap();
    assert!(flow.set_input("Tags", vec![1, 2, 3]).unwrap_err().is(CAPS_SHAPEERR));
    flow.set_input("Tags", vec![3, 4]).unwrap();
    assert_eq!(flow.get_input("Tags").unwrap().value, Value::from(vec![3, 4]));
    assert!(flow.set_input("Alpha", 1.0).unwrap_err().is(CAPS_UNITERR));
}

#[test]
fn analysis_lookup_and_query() {
    let caps = session("lookup");
    let problem = caps.open("wing", wing_script("lookup")).unwrap();
    let query = problem.query_analysis("flowAIM").unwrap();
    assert_eq!((query.inputs, query.outputs), (3, 2));
    assert!(problem.query_analysis("structAIM").unwrap_err().is(CAPS_NOTFOUND));

    let flow = problem
        .make_analysis(&AnalysisSpec::new("flowAIM").intent(["wing", "tail"]))
        .unwrap();
    assert_eq!(flow.info().unwrap().intent.as_deref(), Some("wing;tail"));
    assert_eq!(problem.analysis("flowAIM").unwrap(), flow);
    assert!(problem
        .make_analysis(&AnalysisSpec::new("flowAIM"))
        .unwrap_err()
        .is(CAPS_EXISTS));

    let cruise = problem
        .make_analysis(&AnalysisSpec::new("flowAIM").named("cruise"))
        .unwrap();
    assert_eq!(cruise.name().unwrap(), "cruise");
    assert_eq!(problem.analyses().unwrap(), vec![flow, cruise]);
    assert!(cruise.directory().unwrap().ends_with("wing/cruise"));

    let fields: Vec<String> = flow.fields().unwrap().into_iter().map(|f| f.name).collect();
    assert_eq!(fields, ["Pressure", "Displacement"]);
}

#[test]
fn backdoor_speaks_json() {
    let caps = session("backdoor");
    let problem = caps.open("wing", wing_script("backdoor")).unwrap();
    let flow = problem.make_analysis(&AnalysisSpec::new("flowAIM")).unwrap();
    let reply = flow.aim_backdoor(&json!({"mode": "mesh"})).unwrap();
    assert_eq!(reply, json!({"echo": {"mode": "mesh"}}));
}

#[test]
fn analysis_attributes() {
    let caps = session("attrs");
    let problem = caps.open("wing", wing_script("attrs")).unwrap();
    let flow = problem.make_analysis(&AnalysisSpec::new("flowAIM")).unwrap();
    flow.set_attribute("case", &ValueData::new("cruise", None)).unwrap();
    assert_eq!(flow.attribute("case").unwrap().value, Value::from("cruise"));
    assert!(problem.attribute("case").unwrap_err().is(CAPS_NOTFOUND));
}

#[cfg(unix)]
#[test]
fn external_code_runs_in_analysis_directory() {
    let caps = session("external");
    let problem = caps.open("wing", wing_script("external")).unwrap();
    let flow = problem.make_analysis(&AnalysisSpec::new("flowAIM")).unwrap();
    let dir = flow.directory().unwrap();
    std::fs::create_dir_all(&dir).unwrap();

    flow.pre().unwrap();
    let outcome = flow
        .run_external("sh", &["-c", "echo converged > solver.out; echo done"])
        .unwrap();
    assert_eq!(outcome.stdout.trim(), "done");
    assert!(dir.join("solver.out").is_file());
    flow.post().unwrap();

    let err = flow.run_external("sh", &["-c", "echo diverged >&2; exit 1"]).unwrap_err();
    assert!(err.is(CAPS_EXECERR));
    assert_eq!(err.details, vec!["diverged"]);
}

// ── Bounds ──────────────────────────────────────────────────────────────

#[test]
fn bound_transfer_setup() {
    let caps = session("bound");
    let problem = caps.open("wing", wing_script("bound")).unwrap();
    let flow = problem.make_analysis(&AnalysisSpec::new("flowAIM")).unwrap();

    let bound = problem.make_bound(2, "upper_surface").unwrap();
    assert_eq!(bound.state().unwrap(), BoundState::Open);
    assert_eq!(bound.info().unwrap().limits, vec![0.0, 1.0, 0.0, 1.0]);

    let connected = bound.make_vertex_set(&flow, None).unwrap();
    assert!(connected.is_connected().unwrap());
    let pressure = connected.make_data_set("Pressure", DataMethod::Analysis, 1).unwrap();
    assert!(connected
        .make_data_set("Displacement", DataMethod::Analysis, 1)
        .unwrap_err()
        .is(CAPS_BADRANK));

    let probe = bound.make_unconnected_vertex_set("probe").unwrap();
    assert!(!probe.is_connected().unwrap());
    probe.fill_unconnected(&[[0.0, 0.0, 0.0], [1.0, 0.5, 0.0]]).unwrap();
    let measured = probe.make_data_set("Pressure", DataMethod::User, 1).unwrap();
    measured.init(&[101325.0]).unwrap();
    assert_eq!(measured.get_data().unwrap().data, vec![101325.0]);

    assert!(pressure.get_data().unwrap_err().is(CAPS_STATEERR));
    bound.complete().unwrap();
    assert_eq!(bound.state().unwrap(), BoundState::Multiple);
    assert!(bound.make_vertex_set(&flow, Some("late")).unwrap_err().is(CAPS_STATEERR));

    let field = pressure.get_data().unwrap();
    assert_eq!((field.npts, field.rank), (4, 1));
    assert_eq!(connected.info().unwrap().geometry_points, 4);

    let xyz = probe.data_set("xyz").unwrap().get_data().unwrap();
    assert_eq!(xyz.points().collect::<Vec<_>>(), vec![&[0.0, 0.0, 0.0][..], &[1.0, 0.5, 0.0][..]]);

    measured.set_data(1, &[1.0, 2.0], Some("Pa")).unwrap();
    let data = measured.get_data().unwrap();
    assert_eq!(data.data, vec![1.0, 2.0]);
    assert_eq!(data.units.as_deref(), Some("Pa"));
    assert!(measured.set_data(1, &[1.0, 2.0, 3.0], None).unwrap_err().is(CAPS_MISMATCH));

    let names: Vec<String> = bound
        .data_sets("Pressure")
        .unwrap()
        .iter()
        .map(|d| d.name().unwrap())
        .collect();
    assert_eq!(names, ["Pressure", "Pressure"]);
    assert_eq!(bound.vertex_sets().unwrap().len(), 2);
}

#[test]
fn bound_is_deleted_on_drop() {
    let caps = session("bound-drop");
    let problem = caps.open("wing", wing_script("bound-drop")).unwrap();
    let handle = {
        let bound = problem.make_bound(1, "edge").unwrap();
        assert_eq!(bound.name().unwrap(), "edge");
        bound.handle()
    };
    assert!(caps.api().info(handle).unwrap_err().is(CAPS_BADOBJECT));
    problem.make_bound(1, "edge").unwrap();
    assert!(problem.make_bound(4, "solid").unwrap_err().is(CAPS_RANGEERR));
}
