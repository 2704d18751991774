//! Link resistance and headloss-model coefficients.

use crate::network::element::{Link, Pump};
use crate::types::link::{LinkType, PumpType};
use crate::types::options::HeadLossType;
use crate::units::Ucf;

/// Gravitational acceleration, ft/s2.
pub(crate) const GRAVITY: f64 = 32.174;
/// Kinematic viscosity of water at 20 C, ft2/s.
pub(crate) const VISCOSITY: f64 = 1.1e-5;
/// Headloss exponent for Hazen-Williams.
pub(crate) const HW_EXP: f64 = 1.852;
/// Conductance assigned to closed links and head-fixing rows.
pub(crate) const CBIG: f64 = 1.0e8;
/// Smallest meaningful flow gradient.
pub(crate) const RQTOL: f64 = 1.0e-7;
/// Head convergence tolerance, ft.
pub(crate) const HTOL: f64 = 0.0005;
/// Flow tolerance, cfs.
pub(crate) const QTOL: f64 = 0.0001;
pub(crate) const TINY: f64 = 1.0e-6;

/// Minor-loss coefficient in internal form (`hml = km q^2`) from the
/// dimensionless user coefficient and pipe diameter in feet.
pub(crate) fn minor_loss_coeff(km_user: f64, diam: f64) -> f64 {
    if km_user <= 0.0 || diam <= 0.0 {
        0.0
    } else {
        0.02517 * km_user / diam.powi(4)
    }
}

pub(crate) fn minor_loss_user(km: f64, diam: f64) -> f64 {
    if km <= 0.0 || diam <= 0.0 {
        0.0
    } else {
        km * diam.powi(4) / 0.02517
    }
}

/// Pipe resistance coefficient for the selected headloss model. For
/// Darcy-Weisbach the friction factor is applied per-trial, not here.
pub(crate) fn resistance(link: &Link, form: HeadLossType) -> f64 {
    if !matches!(link.link_type, LinkType::Pipe | LinkType::CvPipe) {
        return 0.0;
    }
    let d = link.diam;
    let l = link.len;
    if d <= 0.0 || l <= 0.0 {
        return 0.0;
    }
    match form {
        HeadLossType::HazenWilliams => {
            4.727 * l / link.kc.powf(HW_EXP) / d.powf(4.871)
        }
        HeadLossType::DarcyWeisbach => {
            let area = std::f64::consts::PI * d * d / 4.0;
            l / (2.0 * GRAVITY * d * area * area)
        }
        HeadLossType::ChezyManning => {
            let t = 4.0 * link.kc / (1.49 * std::f64::consts::PI * d * d);
            t * t * (d / 4.0).powf(-1.333) * l
        }
    }
}

/// Darcy-Weisbach friction factor: laminar below Re 2000, Swamee-Jain above
/// Re 4000, cubic interpolation between.
pub(crate) fn friction_factor(q: f64, diam: f64, roughness: f64, viscos: f64) -> f64 {
    let area = std::f64::consts::PI * diam * diam / 4.0;
    let v = q.abs() / area;
    let re = v * diam / (VISCOSITY * viscos);
    if re < TINY {
        return 64.0 / TINY;
    }
    if re <= 2000.0 {
        64.0 / re
    } else if re >= 4000.0 {
        swamee_jain(re, diam, roughness)
    } else {
        // Cubic blend over the transition zone.
        let f_lam = 64.0 / 2000.0;
        let f_turb = swamee_jain(4000.0, diam, roughness);
        let x = (re - 2000.0) / 2000.0;
        let x2 = x * x;
        f_lam + (f_turb - f_lam) * (3.0 * x2 - 2.0 * x2 * x)
    }
}

fn swamee_jain(re: f64, diam: f64, roughness: f64) -> f64 {
    let term = roughness / (3.7 * diam) + 5.74 / re.powf(0.9);
    0.25 / term.log10().powi(2)
}

/// Computes (h0, r, n) from a pump's head curve. One-point curves use the
/// standard synthetic shape (shutoff at 133% of design head, max flow at
/// twice design flow); three-point curves fit the power function exactly.
/// Multi-point curves are handled piecewise at solve time.
pub(crate) fn fit_pump_curve(pump: &mut Pump, x: &[f64], y: &[f64], ucf: &Ucf) -> bool {
    let n = x.len();
    if n == 0 {
        return false;
    }
    let (q0, h0, q1, h1, q2, h2);
    if n == 1 {
        // Single design point.
        q1 = x[0];
        h1 = y[0];
        q0 = 0.0;
        h0 = 1.33334 * h1;
        q2 = 2.0 * q1;
        h2 = 0.0;
    } else if n == 3 && x[0] == 0.0 {
        q0 = x[0];
        h0 = y[0];
        q1 = x[1];
        h1 = y[1];
        q2 = x[2];
        h2 = y[2];
    } else {
        // Arbitrary curve: interpolated piecewise at solve time.
        pump.ptype = PumpType::Custom;
        pump.q0 = (x[0] + x[n - 1]) / 2.0 / ucf.flow;
        pump.qmax = x[n - 1] / ucf.flow;
        pump.hmax = y[0] / ucf.elev;
        return y.windows(2).all(|w| w[1] <= w[0]);
    }

    if h0 < TINY || h0 - h1 < TINY || h1 - h2 < TINY || q1 - q0 < TINY || q2 - q1 < TINY {
        return false;
    }
    let a = h0;
    let h4 = h0 - h1;
    let h5 = h0 - h2;
    let c = ((h5 / h4).ln()) / ((q2 / q1).ln());
    if c <= 0.0 || c > 20.0 {
        return false;
    }
    let b = -h4 / q1.powf(c);
    if b >= 0.0 {
        return false;
    }
    pump.ptype = PumpType::PowerFunc;
    pump.h0 = a / ucf.elev;
    pump.r = b * ucf.flow.powf(c) / ucf.elev;
    pump.n = c;
    pump.q0 = q1 / ucf.flow;
    pump.qmax = (-a / b).powf(1.0 / c) / ucf.flow;
    pump.hmax = a / ucf.elev;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::element::Pump;
    use crate::types::options::{FlowUnits, PressUnits};

    #[test]
    fn hazen_williams_resistance_matches_formula() {
        let link = Link {
            diam: 1.0,
            len: 1000.0,
            kc: 100.0,
            ..Link::default()
        };
        let r = resistance(&link, HeadLossType::HazenWilliams);
        let expect = 4.727 * 1000.0 / 100.0f64.powf(1.852);
        assert!((r - expect).abs() / expect < 1e-12);
    }

    #[test]
    fn friction_factor_laminar_limit() {
        // Very low flow: f = 64/Re.
        let f = friction_factor(0.001, 1.0, 0.00015, 1.0);
        let area = std::f64::consts::PI / 4.0;
        let re = (0.001 / area) * 1.0 / VISCOSITY;
        assert!((f - 64.0 / re).abs() < 1e-9);
    }

    #[test]
    fn one_point_pump_curve_synthesizes_shape() {
        let ucf = Ucf::new(FlowUnits::Cfs, PressUnits::Psi, 1.0);
        let mut pump = Pump::default();
        assert!(fit_pump_curve(&mut pump, &[10.0], &[100.0], &ucf));
        assert_eq!(pump.ptype, PumpType::PowerFunc);
        assert!((pump.h0 - 133.334).abs() < 0.01);
        assert!(pump.qmax > 10.0);
        // Head at design flow recovers the input point.
        let h = pump.h0 + pump.r * 10.0f64.powf(pump.n);
        assert!((h - 100.0).abs() < 0.1);
    }

    #[test]
    fn concave_up_curve_is_rejected() {
        let ucf = Ucf::new(FlowUnits::Cfs, PressUnits::Psi, 1.0);
        let mut pump = Pump::default();
        assert!(!fit_pump_curve(
            &mut pump,
            &[0.0, 5.0, 10.0],
            &[100.0, 99.0, 0.0],
            &ucf
        ));
    }
}
