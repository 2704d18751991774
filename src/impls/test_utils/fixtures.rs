use crate::types::analysis::InitHydOption;
use crate::types::node::NodeType::Junction;
use crate::types::options::{FlowUnits, HeadLossType};
use crate::EPANET;
use rstest::fixture;

pub fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

pub const NET1_INP: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/src/impls/test_utils/net1.inp"
);

/// A fresh copy of the Net1 demo network.
pub fn net1_project() -> EPANET {
    EPANET::with_inp_file(NET1_INP, "", "").expect("ERROR OPENING PROJECT")
}

#[fixture]
pub fn ph() -> EPANET {
    net1_project()
}

#[fixture]
pub fn ph_close() -> EPANET {
    EPANET::new("", "", FlowUnits::Cfs, HeadLossType::HazenWilliams)
        .expect("ERROR CREATING PROJECT")
}

#[fixture]
pub fn ph_single_node(mut ph_close: EPANET) -> (EPANET, i32) {
    let node_id = ph_close
        .add_node("CUB_SCOUT_QUONSET_HUT", Junction)
        .expect("failed to add node");
    (ph_close, node_id)
}

/// Net1 wired to a report file in a temp dir (kept alive by the caller).
#[fixture]
pub fn net1_with_report() -> (EPANET, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let rpt = dir.path().join("net1.rpt");
    let ph = EPANET::with_inp_file(NET1_INP, rpt.to_str().unwrap(), "")
        .expect("ERROR OPENING PROJECT");
    (ph, dir)
}

/// Net1 stepped through hydraulics and the first hours of quality.
#[fixture]
pub fn after_step(mut ph: EPANET) -> EPANET {
    let t_stop = 10800;
    ph.solve_h().expect("hydraulics failed");
    ph.open_q().expect("openQ failed");
    ph.init_q(InitHydOption::NoSave).expect("initQ failed");
    loop {
        let t = ph.run_q().expect("Failed to run quality simulation");
        let t_left = ph
            .step_q()
            .expect("Failed to step through quality simulation");
        if t_left == 0 || t >= t_stop {
            break;
        }
    }
    ph
}
