//! Reaction kinetics: bulk decay/growth in pipes and tanks, and wall
//! reactions with mass-transfer limitation.

use crate::units::SEC_PER_DAY;

/// Molecular diffusivity of chlorine at 20 C, ft2/sec.
const CL2_DIFFUS: f64 = 1.3e-8;
/// Kinematic viscosity of water at 20 C, ft2/sec.
const WATER_VISC: f64 = 1.1e-5;

/// Converts a user reaction coefficient (1/day) to internal 1/sec.
pub(crate) fn rate_per_sec(k_per_day: f64) -> f64 {
    k_per_day / SEC_PER_DAY
}

pub(crate) fn rate_per_day(k_per_sec: f64) -> f64 {
    k_per_sec * SEC_PER_DAY
}

/// Integrates a bulk reaction over `dt` seconds and returns the new
/// concentration. `kb` is 1/sec (negative = decay), `order` the reaction
/// order, `climit` an optional limiting concentration for growth/decay.
pub(crate) fn bulk_react(c: f64, kb: f64, order: f64, climit: f64, dt: f64) -> f64 {
    if kb == 0.0 || c < 0.0 {
        return c;
    }
    // First-order with no limit has the exact solution.
    if order == 1.0 && climit == 0.0 {
        return c * (kb * dt).exp();
    }
    // Michaelis-Menten style limited first order.
    let dc = if climit > 0.0 {
        let driving = if kb > 0.0 { climit - c } else { c - climit };
        kb * driving.max(0.0) * c.powf(order - 1.0) * dt
    } else if order == 0.0 {
        kb * dt
    } else {
        kb * c.powf(order) * dt
    };
    let cnew = c + dc;
    cnew.max(0.0)
}

/// Effective wall reaction rate for a pipe, combining the wall coefficient
/// `kw` with the mass-transfer coefficient at the current flow. The sign of
/// `kw` carries through (negative = decay). First-order `kw` is ft/sec and
/// the result 1/sec; zero-order `kw` is mass/ft2/sec and the result
/// mass/ft3/sec.
pub(crate) fn wall_rate(kw: f64, order: f64, diam: f64, q: f64, viscos: f64, diffus: f64) -> f64 {
    if kw == 0.0 || diam <= 0.0 {
        return 0.0;
    }
    let kwa = kw.abs();
    if diffus <= 0.0 {
        // Mass transfer ignored entirely.
        return kw.signum() * kwa * 4.0 / diam;
    }
    let kf = mass_transfer_coeff(q, diam, viscos, diffus);
    if order == 0.0 {
        // Zero order: removal cannot outrun transport to the wall.
        kw.signum() * (kwa * 4.0 / diam).min(kf * 4.0 / diam * 1.0e6)
    } else {
        kw.signum() * 4.0 * kwa * kf / ((kwa + kf) * diam)
    }
}

/// Mass transfer coefficient (ft/sec) from the Sherwood correlation:
/// laminar below Re 2300, turbulent power law above.
fn mass_transfer_coeff(q: f64, diam: f64, viscos: f64, diffus: f64) -> f64 {
    let diff = CL2_DIFFUS * diffus;
    let visc = WATER_VISC * viscos;
    let area = std::f64::consts::PI * diam * diam / 4.0;
    let v = q.abs() / area;
    let re = v * diam / visc;
    let sc = visc / diff;
    let sh = if re < 1.0 {
        2.0
    } else if re <= 2300.0 {
        let y = diam / 1000.0 * re * sc; // d/L with a nominal length scale
        3.65 + 0.0668 * y / (1.0 + 0.04 * y.powf(0.6667))
    } else {
        0.0149 * re.powf(0.88) * sc.powf(0.333)
    };
    sh * diff / diam
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_order_decay_is_exponential() {
        let kb = rate_per_sec(-0.5); // -0.5/day
        let c = bulk_react(1.0, kb, 1.0, 0.0, SEC_PER_DAY);
        assert!((c - (-0.5f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn zero_rate_is_conservative() {
        assert_eq!(bulk_react(2.5, 0.0, 1.0, 0.0, 3600.0), 2.5);
    }

    #[test]
    fn limited_growth_stops_at_climit() {
        let kb = rate_per_sec(1.0);
        let mut c = 0.2;
        for _ in 0..10000 {
            c = bulk_react(c, kb, 1.0, 1.0, 600.0);
        }
        assert!(c <= 1.0 + 1e-9);
        assert!(c > 0.9);
    }

    #[test]
    fn wall_rate_capped_by_mass_transfer() {
        // An extremely fast wall reaction is throttled by transport to the wall.
        let fast = wall_rate(1.0, 1.0, 1.0, 1.0, 1.0, 1.0);
        let slow = wall_rate(1.0e-6, 1.0, 1.0, 1.0, 1.0, 1.0);
        assert!(fast < 4.0); // far below the raw 4*kw/d
        assert!(slow > 0.0 && slow < fast);
    }

    #[test]
    fn wall_rate_keeps_decay_sign() {
        let decay = wall_rate(-1.0 / 86400.0, 1.0, 1.0, 1.0, 1.0, 1.0);
        assert!(decay < 0.0);
    }
}
