//! The project: network plus solver state, time settings, scratch files and
//! report configuration. Public API methods in `impls/` delegate here.

use std::path::PathBuf;

use crate::epanet_error::{EngineResult, ErrorCode};
use crate::files::hydfile::{HydFile, HydFileMode};
use crate::files::outfile::OutFile;
use crate::network::element::MISSING;
use crate::network::Network;
use crate::report::Report;
use crate::types::demand::DemandModel;
use crate::types::options::{FlowUnits, HeadLossType, PressUnits, QualityType, StatisticType};
use crate::units::Ucf;
use tempfile::TempDir;

/// Solver warning codes. Nonfatal; the highest raised code is reported at the
/// end of `solveH`/`solveQ`.
pub(crate) const WARN_UNBALANCED: i32 = 1;
pub(crate) const WARN_UNSTABLE: i32 = 2;
pub(crate) const WARN_DISCONNECTED: i32 = 3;
pub(crate) const WARN_PUMP_LIMITS: i32 = 4;
pub(crate) const WARN_VALVE_LIMITS: i32 = 5;
pub(crate) const WARN_NEGATIVE_PRESSURE: i32 = 6;

#[derive(Debug, Default, Clone)]
pub(crate) struct Warnings {
    raised: [bool; 7],
}

impl Warnings {
    pub fn raise(&mut self, code: i32) {
        if (1..7).contains(&code) {
            self.raised[code as usize] = true;
        }
    }

    pub fn highest(&self) -> i32 {
        (1..7).rev().find(|&c| self.raised[c as usize]).unwrap_or(0) as i32
    }

    pub fn clear(&mut self) {
        self.raised = [false; 7];
    }
}

/// Hydraulic options and per-run state.
#[derive(Debug)]
pub(crate) struct Hydraul {
    pub headloss_form: HeadLossType,
    pub demand_model: DemandModel,
    pub pmin: f64, // ft of head
    pub preq: f64,
    pub pexp: f64,
    pub max_iter: i32,
    pub accuracy: f64,
    pub head_error: f64,  // ft; 0 disables the check
    pub flow_change: f64, // cfs; 0 disables the check
    pub qexp: f64,        // emitter exponent
    pub dmult: f64,       // global demand multiplier
    pub viscos: f64,      // kinematic viscosity relative to water at 20 C
    pub spgrav: f64,
    pub extra_iter: i32, // trials beyond max_iter; -1 stops with failure
    pub check_freq: i32,
    pub max_check: i32,
    pub damp_limit: f64,
    pub def_pat: i32, // default demand pattern
    /// Default pattern named before patterns are parsed.
    pub def_pat_id: Option<String>,
    pub epump: f64,   // global pump efficiency, percent
    pub eprice: f64,  // global energy price per kWh
    pub epat: i32,    // global energy price pattern
    pub dcharge: f64, // demand charge per peak kW
    pub emit_backflow: bool,

    pub open: bool,
    pub initialized: bool,
    /// Node demand delivered, cfs.
    pub demand: Vec<f64>,
    /// Node demand requested (differs from `demand` under PDA), cfs.
    pub full_demand: Vec<f64>,
    /// Node heads, ft.
    pub head: Vec<f64>,
    /// Emitter outflows, cfs.
    pub emitter_flow: Vec<f64>,
    /// Link flows, cfs.
    pub flow: Vec<f64>,
    pub status: Vec<crate::network::element::Status>,
    pub setting: Vec<f64>,
    /// Current volume per tank record, ft3.
    pub tank_volume: Vec<f64>,

    pub iterations: i32,
    pub relative_error: f64,
    pub max_head_error: f64,
    pub max_flow_change: f64,
    pub deficient_nodes: i32,
    pub demand_reduction: f64,
    pub warnings: Warnings,
}

impl Default for Hydraul {
    fn default() -> Self {
        Hydraul {
            headloss_form: HeadLossType::HazenWilliams,
            demand_model: DemandModel::Dda,
            pmin: 0.0,
            preq: 0.1,
            pexp: 0.5,
            max_iter: 200,
            accuracy: 0.001,
            head_error: 0.0,
            flow_change: 0.0,
            qexp: 0.5,
            dmult: 1.0,
            viscos: 1.0,
            spgrav: 1.0,
            extra_iter: -1,
            check_freq: 2,
            max_check: 10,
            damp_limit: 0.0,
            def_pat: 0,
            def_pat_id: None,
            epump: 75.0,
            eprice: 0.0,
            epat: 0,
            dcharge: 0.0,
            emit_backflow: true,
            open: false,
            initialized: false,
            demand: Vec::new(),
            full_demand: Vec::new(),
            head: Vec::new(),
            emitter_flow: Vec::new(),
            flow: Vec::new(),
            status: Vec::new(),
            setting: Vec::new(),
            tank_volume: Vec::new(),
            iterations: 0,
            relative_error: 0.0,
            max_head_error: 0.0,
            max_flow_change: 0.0,
            deficient_nodes: 0,
            demand_reduction: 0.0,
            warnings: Warnings::default(),
        }
    }
}

/// Water-quality options and per-run state.
#[derive(Debug)]
pub(crate) struct Quality {
    pub qualflag: QualityType,
    pub chem_name: String,
    pub chem_units: String,
    pub trace_node: i32,
    /// Trace node named before it exists during input parsing.
    pub trace_node_id: Option<String>,
    pub ctol: f64,
    pub diffus: f64, // molecular diffusivity relative to chlorine at 20 C
    pub kbulk: f64,  // global bulk rate coeff, 1/sec
    pub kwall: f64,  // global wall rate coeff, ft/sec (1st order) or mass/ft2/sec (0th)
    pub bulk_order: f64,
    pub wall_order: f64,
    pub tank_order: f64,
    pub climit: f64,

    pub open: bool,
    pub initialized: bool,
    pub node_qual: Vec<f64>,
    pub seg: crate::quality::segment::SegmentPools,
    pub mass_balance: crate::quality::MassBalance,
    /// Hydraulic period currently driving transport.
    pub snapshot: Option<crate::files::hydfile::HydStep>,
    /// Read-ahead of the next period, fixing this one's end time.
    pub pending: Option<crate::files::hydfile::HydStep>,
    /// Whether results stream to the binary output file.
    pub save_flag: bool,
}

impl Default for Quality {
    fn default() -> Self {
        Quality {
            qualflag: QualityType::None,
            chem_name: "Chemical".to_string(),
            chem_units: "mg/L".to_string(),
            trace_node: 0,
            trace_node_id: None,
            ctol: 0.01,
            diffus: 1.0,
            kbulk: 0.0,
            kwall: 0.0,
            bulk_order: 1.0,
            wall_order: 1.0,
            tank_order: 1.0,
            climit: 0.0,
            open: false,
            initialized: false,
            node_qual: Vec::new(),
            seg: Default::default(),
            mass_balance: Default::default(),
            snapshot: None,
            pending: None,
            save_flag: false,
        }
    }
}

/// Time-grid settings and clocks, all in seconds.
#[derive(Debug, Clone)]
pub(crate) struct Times {
    pub duration: u64,
    pub hstep: u64,
    pub qstep: u64,
    pub pstep: u64,
    pub pstart: u64,
    pub rstep: u64,
    pub rstart: u64,
    pub rulestep: u64,
    pub tstart: u64, // clock time of day at simulation start
    pub statistic: StatisticType,
    pub htime: u64,
    pub qtime: u64,
    pub rtime: u64,      // next reporting time
    pub rtime_rule: u64, // next rule evaluation time
    pub nperiods: usize, // reporting periods written so far
    pub halted: bool,
}

impl Default for Times {
    fn default() -> Self {
        Times {
            duration: 0,
            hstep: 3600,
            qstep: 0,
            pstep: 3600,
            pstart: 0,
            rstep: 3600,
            rstart: 0,
            rulestep: 0,
            tstart: 0,
            statistic: StatisticType::Series,
            htime: 0,
            qtime: 0,
            rtime: 0,
            rtime_rule: 0,
            nperiods: 0,
            halted: false,
        }
    }
}

impl Times {
    /// Time of day, seconds, for the current hydraulic clock.
    pub fn clock_time(&self) -> u64 {
        (self.tstart + self.htime) % 86400
    }

    /// 0-based pattern period for a given simulation time.
    pub fn pattern_period(&self, time: u64) -> usize {
        if self.pstep == 0 {
            0
        } else {
            ((time + self.pstart) / self.pstep) as usize
        }
    }
}

pub(crate) struct Project {
    pub network: Network,
    pub hyd: Hydraul,
    pub qual: Quality,
    pub times: Times,
    pub report: Report,
    pub flow_units: FlowUnits,
    pub press_units: PressUnits,
    pub ucf: Ucf,
    pub title: [String; 3],
    /// Network data present (via `init` or `open`).
    pub open_flag: bool,
    /// Whether the current hydraulic run streams periods to the scratch file.
    pub hydfile_saving: bool,
    pub hydfile: HydFile,
    pub outfile: OutFile,
    pub out_path: Option<PathBuf>, // user-requested binary output copy
    pub temp_stat: PathBuf,
    _scratch: TempDir,
}

impl Project {
    pub fn new() -> EngineResult<Self> {
        let scratch = TempDir::new().map_err(|_| ErrorCode::OutOfMemory)?;
        let hyd_path = scratch.path().join("en_hydraulics.bin");
        let out_path = scratch.path().join("en_output.bin");
        let stat_path = scratch.path().join("en_stats.bin");
        let flow_units = FlowUnits::Cfs;
        let press_units = Ucf::default_press_units(flow_units);
        Ok(Project {
            network: Network::new(),
            hyd: Hydraul::default(),
            qual: Quality::default(),
            times: Times::default(),
            report: Report::default(),
            flow_units,
            press_units,
            ucf: Ucf::new(flow_units, press_units, 1.0),
            title: Default::default(),
            open_flag: false,
            hydfile_saving: false,
            hydfile: HydFile::new(hyd_path),
            outfile: OutFile::new(out_path),
            out_path: None,
            temp_stat: stat_path,
            _scratch: scratch,
        })
    }

    /// Prepares an empty network with the given units and headloss model.
    pub fn init(&mut self, flow_units: FlowUnits, headloss: HeadLossType) -> EngineResult<()> {
        if self.open_flag {
            return Err(ErrorCode::NoData);
        }
        self.flow_units = flow_units;
        self.press_units = Ucf::default_press_units(flow_units);
        self.ucf = Ucf::new(flow_units, self.press_units, self.hyd.spgrav);
        self.hyd.headloss_form = headloss;
        self.open_flag = true;
        Ok(())
    }

    /// Recomputes the conversion table after a units-affecting option change.
    pub fn refresh_units(&mut self) {
        self.ucf = Ucf::new(self.flow_units, self.press_units, self.hyd.spgrav);
    }

    /// Guards topology mutation: illegal while either solver is open.
    pub fn require_solvers_closed(&self) -> EngineResult<()> {
        if self.hyd.open || self.qual.open {
            return Err(ErrorCode::SolverOpen);
        }
        Ok(())
    }

    pub fn require_open(&self) -> EngineResult<()> {
        if !self.open_flag {
            return Err(ErrorCode::NoData);
        }
        Ok(())
    }

    /// Pattern value helper honoring the 0 = constant convention.
    pub fn pattern_value(&self, pattern: i32, time: u64) -> f64 {
        if pattern <= 0 {
            return 1.0;
        }
        let period = self.times.pattern_period(time);
        self.network.patterns[pattern as usize].value(period)
    }

    /// Primary demand category (the last in the list) for a junction.
    pub fn primary_demand(&self, node: i32) -> Option<&crate::network::element::DemandRecord> {
        self.network.nodes[node as usize].demands.last()
    }

    /// Closes both solvers and all scratch files, keeping the project shell.
    /// Safe to call repeatedly.
    pub fn close(&mut self) {
        self.hyd.open = false;
        self.hyd.initialized = false;
        self.qual.open = false;
        self.qual.initialized = false;
        self.hydfile.close();
        if self.hydfile.mode == HydFileMode::Use {
            // A replacement scratch file restores normal operation.
            self.hydfile.mode = HydFileMode::Scratch;
        }
        self.outfile.close();
        self.report.close();
        self.open_flag = false;
    }

    /// Per-pump unit energy price, falling back to the global price.
    pub fn pump_price(&self, pump: usize, time: u64) -> f64 {
        let p = &self.network.pumps[pump];
        let base = if p.ecost == MISSING || p.ecost == 0.0 {
            self.hyd.eprice
        } else {
            p.ecost
        };
        let pat = if p.epat > 0 { p.epat } else { self.hyd.epat };
        base * self.pattern_value(pat, time)
    }
}
