//! Internal network element records.
//!
//! All hydraulic quantities are stored in internal units (cfs, feet); curve
//! points are stored in user units and converted where they are consumed, so
//! a flow-unit change rescales curves but nothing else.

use crate::types::curve::CurveType;
use crate::types::link::{LinkStatusType, LinkType, PumpType};
use crate::types::node::{MixingModel, NodeType, SourceType};

/// Missing-value marker for optional numeric fields kept as plain floats.
pub(crate) const MISSING: f64 = -1.0e10;

/// Runtime status of a link. Richer than the public open/closed pair: the
/// solver distinguishes why something is shut and whether a control valve is
/// at its setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) enum Status {
    /// Pump closed because it cannot deliver the required head.
    XHead,
    /// Closed by the solver for this trial only.
    TempClosed,
    #[default]
    Closed,
    Open,
    /// Control valve operating at its setpoint.
    Active,
    /// Pump running flat-out beyond the end of its curve.
    XFlow,
    /// FCV unable to supply its flow setting.
    XFcv,
    /// Pressure valve unable to hold its pressure setting.
    XPressure,
}

impl Status {
    pub fn is_open(self) -> bool {
        !matches!(self, Status::XHead | Status::TempClosed | Status::Closed)
    }

    pub fn as_public(self) -> LinkStatusType {
        if self.is_open() {
            LinkStatusType::Open
        } else {
            LinkStatusType::Closed
        }
    }
}

/// One demand category in internal units.
#[derive(Debug, Clone, Default)]
pub(crate) struct DemandRecord {
    pub base: f64, // cfs
    pub pattern: i32,
    pub name: String,
}

/// Water quality source attached to a node.
#[derive(Debug, Clone)]
pub(crate) struct Source {
    pub stype: SourceType,
    /// Base strength: concentration (mg/L) or mass rate (mg/min) for MASS.
    pub c0: f64,
    pub pattern: i32,
    /// Mass inflow rate computed during the quality run (mass/sec).
    pub smass: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub id: String,
    pub node_type: NodeType,
    pub elevation: f64, // ft
    pub coords: Option<(f64, f64)>,
    pub c0: f64, // initial quality
    /// Emitter coefficient in internal form: q_cfs = ke * p_ft^Qexp.
    pub ke: f64,
    pub source: Option<Source>,
    pub demands: Vec<DemandRecord>,
    pub rpt_flag: bool,
    pub comment: String,
}

impl Default for Node {
    fn default() -> Self {
        Node {
            id: String::new(),
            node_type: NodeType::Junction,
            elevation: 0.0,
            coords: None,
            c0: 0.0,
            ke: 0.0,
            source: None,
            demands: Vec::new(),
            rpt_flag: false,
            comment: String::new(),
        }
    }
}

/// Tank/reservoir side-record. `tanks[i - njuncs]` holds the record for node
/// index `i`, so the record order always mirrors node order.
#[derive(Debug, Clone)]
pub(crate) struct Tank {
    pub node: i32,
    pub area: f64, // ft2; 0 marks a reservoir
    pub hmin: f64, // ft, absolute heads (elevation + level)
    pub h0: f64,
    pub hmax: f64,
    pub vmin: f64, // ft3
    pub v0: f64,
    pub vmax: f64,
    pub vcurve: i32, // volume curve index, 0 = cylindrical
    pub mix_model: MixingModel,
    /// Mixing-zone fraction of total volume for MIX2.
    pub v1frac: f64,
    /// Bulk reaction coefficient override (1/sec); None uses the global.
    pub kb: Option<f64>,
    /// Head pattern for variable-head reservoirs.
    pub pattern: i32,
    pub can_overflow: bool,
}

impl Default for Tank {
    fn default() -> Self {
        Tank {
            node: 0,
            area: 0.0,
            hmin: 0.0,
            h0: 0.0,
            hmax: 0.0,
            vmin: 0.0,
            v0: 0.0,
            vmax: 0.0,
            vcurve: 0,
            mix_model: MixingModel::Mix1,
            v1frac: 1.0,
            kb: None,
            pattern: 0,
            can_overflow: false,
        }
    }
}

impl Tank {
    pub fn is_reservoir(&self) -> bool {
        self.area == 0.0
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Link {
    pub id: String,
    pub link_type: LinkType,
    pub n1: i32,
    pub n2: i32,
    pub diam: f64, // ft
    pub len: f64,  // ft
    /// Roughness: HW C-factor, DW roughness height (ft), CM Manning n.
    /// For valves, the pressure/flow setting in internal units.
    pub kc: f64,
    /// Minor loss coefficient in internal form: hml = km * q^2.
    pub km: f64,
    /// Bulk/wall reaction coefficient overrides (1/sec); None uses globals.
    pub kb: Option<f64>,
    pub kw: Option<f64>,
    /// Resistance coefficient, recomputed whenever diam/len/kc change.
    pub r: f64,
    /// Initial status; Kc doubles as the initial setting (pump speed, valve
    /// setpoint) the way roughness does for pipes.
    pub status0: Status,
    pub rpt_flag: bool,
    pub comment: String,
    pub vertices: Vec<(f64, f64)>,
}

impl Default for Link {
    fn default() -> Self {
        Link {
            id: String::new(),
            link_type: LinkType::Pipe,
            n1: 0,
            n2: 0,
            diam: 0.0,
            len: 0.0,
            kc: 100.0,
            km: 0.0,
            kb: None,
            kw: None,
            r: 0.0,
            status0: Status::Open,
            rpt_flag: false,
            comment: String::new(),
            vertices: Vec::new(),
        }
    }
}

/// Per-pump energy usage tallies, accumulated over the hydraulic run.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PumpEnergy {
    pub time_online: f64,   // hrs
    pub efficiency: f64,    // time-weighted avg %
    pub kw_per_flow: f64,   // time-weighted avg kW per unit flow
    pub kw_hrs: f64,        // total kWh consumed
    pub max_kw: f64,        // peak kW
    pub total_cost: f64,    // total energy cost
    pub current_power: f64, // kW at current time step
    pub current_effic: f64, // % at current time step
}

#[derive(Debug, Clone)]
pub(crate) struct Pump {
    pub link: i32,
    pub ptype: PumpType,
    pub hcurve: i32,
    pub ecurve: i32,
    /// Shutoff head, ft.
    pub h0: f64,
    /// Head curve coefficient for h = h0 - r q^n.
    pub r: f64,
    pub n: f64,
    /// Design point and flow limit, cfs.
    pub q0: f64,
    pub qmax: f64,
    pub hmax: f64,
    /// Speed pattern index.
    pub upat: i32,
    /// Energy price pattern index.
    pub epat: i32,
    /// Unit energy price; MISSING uses the global price.
    pub ecost: f64,
    pub energy: PumpEnergy,
}

impl Default for Pump {
    fn default() -> Self {
        Pump {
            link: 0,
            ptype: PumpType::NoCurve,
            hcurve: 0,
            ecurve: 0,
            h0: 0.0,
            r: 0.0,
            n: 0.0,
            q0: 0.0,
            qmax: 0.0,
            hmax: 0.0,
            upat: 0,
            epat: 0,
            ecost: MISSING,
            energy: PumpEnergy::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Valve {
    pub link: i32,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Pattern {
    pub id: String,
    pub factors: Vec<f64>,
    pub comment: String,
}

impl Pattern {
    /// Multiplier for a 0-based period, cycling modulo the pattern length.
    pub fn value(&self, period: usize) -> f64 {
        if self.factors.is_empty() {
            1.0
        } else {
            self.factors[period % self.factors.len()]
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CurveData {
    pub id: String,
    pub ctype: CurveType,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub comment: String,
}

impl Default for CurveData {
    fn default() -> Self {
        CurveData {
            id: String::new(),
            ctype: CurveType::GenericCurve,
            x: Vec::new(),
            y: Vec::new(),
            comment: String::new(),
        }
    }
}

impl CurveData {
    /// Linear interpolation clamped to the curve's endpoints.
    pub fn interpolate(&self, x: f64) -> f64 {
        let n = self.x.len();
        if n == 0 {
            return 0.0;
        }
        if n == 1 || x <= self.x[0] {
            return self.y[0];
        }
        if x >= self.x[n - 1] {
            return self.y[n - 1];
        }
        for i in 1..n {
            if x <= self.x[i] {
                let dx = self.x[i] - self.x[i - 1];
                if dx == 0.0 {
                    return self.y[i];
                }
                return self.y[i - 1] + (x - self.x[i - 1]) / dx * (self.y[i] - self.y[i - 1]);
            }
        }
        self.y[n - 1]
    }

    /// Whether x-values are strictly increasing (required for interpolation).
    pub fn is_valid(&self) -> bool {
        self.x.len() == self.y.len() && self.x.windows(2).all(|w| w[0] < w[1])
    }
}

/// Simple control in internal units.
#[derive(Debug, Clone)]
pub(crate) struct ControlRecord {
    pub ctype: crate::types::control::ControlType,
    pub link: i32,
    pub node: i32,
    pub status: Status,
    pub setting: f64,
    /// Trigger grade as absolute head, ft.
    pub grade: f64,
    /// Trigger time, seconds.
    pub time: u64,
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_cycles_modulo_length() {
        let pat = Pattern {
            id: "P1".into(),
            factors: vec![1.0, 2.0, 3.0],
            comment: String::new(),
        };
        assert_eq!(pat.value(0), 1.0);
        assert_eq!(pat.value(4), 2.0);
        assert_eq!(pat.value(300), 1.0);
    }

    #[test]
    fn curve_interpolation_clamps_to_endpoints() {
        let curve = CurveData {
            id: "C1".into(),
            ctype: CurveType::PumpCurve,
            x: vec![0.0, 10.0, 20.0],
            y: vec![100.0, 80.0, 40.0],
            comment: String::new(),
        };
        assert_eq!(curve.interpolate(-5.0), 100.0);
        assert_eq!(curve.interpolate(25.0), 40.0);
        assert_eq!(curve.interpolate(5.0), 90.0);
        assert_eq!(curve.interpolate(15.0), 60.0);
    }

    #[test]
    fn curve_validity_requires_increasing_x() {
        let mut curve = CurveData {
            id: "C2".into(),
            ctype: CurveType::GenericCurve,
            x: vec![0.0, 1.0, 1.0],
            y: vec![0.0, 1.0, 2.0],
            comment: String::new(),
        };
        assert!(!curve.is_valid());
        curve.x = vec![0.0, 1.0, 2.0];
        assert!(curve.is_valid());
    }
}
