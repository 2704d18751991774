//! Unit conversion between internal US-customary units and user units.
//!
//! The engine computes in cfs and feet throughout. Every public getter
//! multiplies by the factor for the quantity's dimension and every setter
//! divides, so the stored network never changes representation when the
//! user-facing flow units do.

use crate::types::options::{FlowUnits, PressUnits};

pub(crate) const GPM_PER_CFS: f64 = 448.831;
pub(crate) const MGD_PER_CFS: f64 = 0.64632;
pub(crate) const IMGD_PER_CFS: f64 = 0.5382;
pub(crate) const AFD_PER_CFS: f64 = 1.9837;
pub(crate) const LPS_PER_CFS: f64 = 28.317;
pub(crate) const LPM_PER_CFS: f64 = 1699.0;
pub(crate) const MLD_PER_CFS: f64 = 2.4466;
pub(crate) const CMH_PER_CFS: f64 = 101.94;
pub(crate) const CMD_PER_CFS: f64 = 2446.6;

pub(crate) const M_PER_FT: f64 = 0.3048;
pub(crate) const MM_PER_FT: f64 = 304.8;
pub(crate) const IN_PER_FT: f64 = 12.0;
pub(crate) const PSI_PER_FT: f64 = 0.4333;
pub(crate) const KPA_PER_PSI: f64 = 6.895;
pub(crate) const M3_PER_FT3: f64 = 0.028317;
pub(crate) const L_PER_FT3: f64 = 28.317;
pub(crate) const SEC_PER_DAY: f64 = 86400.0;
pub(crate) const KW_PER_HP: f64 = 0.7457;

/// Per-dimension conversion factors from internal units to user units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Ucf {
    pub flow: f64,     // cfs -> flow units (demand shares this factor)
    pub elev: f64,     // ft -> ft or m (head, length and headloss share it)
    pub diam: f64,     // ft -> in or mm
    pub pressure: f64, // ft of head -> psi, kPa or m
    pub velocity: f64, // ft/s -> ft/s or m/s
    pub volume: f64,   // ft3 -> ft3 or m3
    pub power: f64,    // kW -> kW (reported in kW for all unit systems)
}

impl Ucf {
    pub fn new(flow_units: FlowUnits, press_units: PressUnits, sp_grav: f64) -> Self {
        let flow = flow_factor(flow_units);
        let si = flow_units.is_si();
        let pressure = match press_units {
            PressUnits::Psi => PSI_PER_FT * sp_grav,
            PressUnits::Kpa => PSI_PER_FT * KPA_PER_PSI * sp_grav,
            PressUnits::Meters => M_PER_FT * sp_grav,
        };
        if si {
            Ucf {
                flow,
                elev: M_PER_FT,
                diam: MM_PER_FT,
                pressure,
                velocity: M_PER_FT,
                volume: M3_PER_FT3,
                power: 1.0,
            }
        } else {
            Ucf {
                flow,
                elev: 1.0,
                diam: IN_PER_FT,
                pressure,
                velocity: 1.0,
                volume: 1.0,
                power: 1.0,
            }
        }
    }

    /// Default pressure unit implied by a flow-unit selection.
    pub fn default_press_units(flow_units: FlowUnits) -> PressUnits {
        if flow_units.is_si() {
            PressUnits::Meters
        } else {
            PressUnits::Psi
        }
    }
}

pub(crate) fn flow_factor(flow_units: FlowUnits) -> f64 {
    match flow_units {
        FlowUnits::Cfs => 1.0,
        FlowUnits::Gpm => GPM_PER_CFS,
        FlowUnits::Mgd => MGD_PER_CFS,
        FlowUnits::Imgd => IMGD_PER_CFS,
        FlowUnits::Afd => AFD_PER_CFS,
        FlowUnits::Lps => LPS_PER_CFS,
        FlowUnits::Lpm => LPM_PER_CFS,
        FlowUnits::Mld => MLD_PER_CFS,
        FlowUnits::Cmh => CMH_PER_CFS,
        FlowUnits::Cmd => CMD_PER_CFS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn us_factors() {
        let ucf = Ucf::new(FlowUnits::Gpm, PressUnits::Psi, 1.0);
        assert_eq!(ucf.flow, GPM_PER_CFS);
        assert_eq!(ucf.elev, 1.0);
        assert_eq!(ucf.diam, 12.0);
        assert!((ucf.pressure - 0.4333).abs() < 1e-12);
    }

    #[test]
    fn si_factors() {
        let ucf = Ucf::new(FlowUnits::Lps, PressUnits::Meters, 1.0);
        assert_eq!(ucf.flow, LPS_PER_CFS);
        assert_eq!(ucf.elev, M_PER_FT);
        assert_eq!(ucf.diam, MM_PER_FT);
        assert_eq!(ucf.pressure, M_PER_FT);
    }

    #[test]
    fn every_flow_unit_has_a_factor() {
        for fu in FlowUnits::iter() {
            assert!(flow_factor(fu) > 0.0);
        }
    }
}
