//! Sparse symmetric positive-definite solver for the junction head system.
//!
//! The gradient method produces, at each trial, a system `A h = f` over the
//! junction heads where `A` has one diagonal entry per junction and one
//! off-diagonal entry per link joining two junctions. The matrix is assembled
//! link-wise (parallel links simply accumulate) and solved with a
//! Jacobi-preconditioned conjugate-gradient iteration driven far below the
//! hydraulic convergence tolerances, so the result is interchangeable with a
//! direct factorization.

use crate::epanet_error::{EngineResult, ErrorCode};
use tracing::trace;

/// Junction-row endpoints of each link: 0 marks a fixed-grade (tank) end.
#[derive(Debug, Default)]
pub(crate) struct SparseSystem {
    n: usize,
    link_rows: Vec<(usize, usize)>,
    /// Diagonal coefficients, `1..=n`.
    pub aii: Vec<f64>,
    /// Off-diagonal coefficient per link (negated conductance).
    pub aij: Vec<f64>,
    /// Right-hand side, `1..=n`.
    pub f: Vec<f64>,
}

impl SparseSystem {
    pub fn new(n_juncs: usize, link_rows: Vec<(usize, usize)>) -> Self {
        let nlinks = link_rows.len();
        SparseSystem {
            n: n_juncs,
            link_rows,
            aii: vec![0.0; n_juncs + 1],
            aij: vec![0.0; nlinks],
            f: vec![0.0; n_juncs + 1],
        }
    }

    pub fn reset(&mut self) {
        self.aii.iter_mut().for_each(|v| *v = 0.0);
        self.aij.iter_mut().for_each(|v| *v = 0.0);
        self.f.iter_mut().for_each(|v| *v = 0.0);
    }

    /// y = A x over the 1..=n junction rows.
    fn mat_vec(&self, x: &[f64], y: &mut [f64]) {
        for i in 1..=self.n {
            y[i] = self.aii[i] * x[i];
        }
        for (k, &(r1, r2)) in self.link_rows.iter().enumerate() {
            if r1 > 0 && r2 > 0 {
                y[r1] += self.aij[k] * x[r2];
                y[r2] += self.aij[k] * x[r1];
            }
        }
    }

    /// Solves `A h = f` into `h[1..=n]`, leaving other slots untouched.
    /// Returns the row of a non-positive diagonal when the system is
    /// ill-conditioned (a disconnected junction).
    pub fn solve(&self, h: &mut [f64]) -> EngineResult<()> {
        let n = self.n;
        if n == 0 {
            return Ok(());
        }
        for i in 1..=n {
            if self.aii[i] <= 0.0 {
                trace!(row = i, "zero diagonal in head matrix");
                return Err(ErrorCode::HydSolveFailed);
            }
        }

        let mut x = vec![0.0; n + 1];
        x[1..=n].copy_from_slice(&h[1..=n]);
        let mut r = vec![0.0; n + 1];
        let mut z = vec![0.0; n + 1];
        let mut p = vec![0.0; n + 1];
        let mut ap = vec![0.0; n + 1];

        self.mat_vec(&x, &mut r);
        let mut bnorm: f64 = 0.0;
        for i in 1..=n {
            r[i] = self.f[i] - r[i];
            bnorm = bnorm.max(self.f[i].abs());
        }
        let tol = (bnorm * 1.0e-14).max(1.0e-12);

        let mut rz = 0.0;
        for i in 1..=n {
            z[i] = r[i] / self.aii[i];
            rz += r[i] * z[i];
        }
        p[1..=n].copy_from_slice(&z[1..=n]);

        let max_iter = 50 + 4 * n;
        for _ in 0..max_iter {
            let rmax = r[1..=n].iter().fold(0.0f64, |m, v| m.max(v.abs()));
            if rmax <= tol {
                break;
            }
            self.mat_vec(&p, &mut ap);
            let mut pap = 0.0;
            for i in 1..=n {
                pap += p[i] * ap[i];
            }
            if pap.abs() < f64::MIN_POSITIVE {
                return Err(ErrorCode::HydSolveFailed);
            }
            let alpha = rz / pap;
            for i in 1..=n {
                x[i] += alpha * p[i];
                r[i] -= alpha * ap[i];
            }
            let mut rz_new = 0.0;
            for i in 1..=n {
                z[i] = r[i] / self.aii[i];
                rz_new += r[i] * z[i];
            }
            let beta = rz_new / rz;
            rz = rz_new;
            for i in 1..=n {
                p[i] = z[i] + beta * p[i];
            }
        }
        h[1..=n].copy_from_slice(&x[1..=n]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_two_junction_chain() {
        // Reservoir (fixed 100) - J1 - J2, unit conductances, no demand.
        // A = [[2, -1], [-1, 1]], f = [100, 0] -> h = [100, 100].
        let mut sys = SparseSystem::new(2, vec![(1, 0), (1, 2)]);
        sys.reset();
        sys.aii[1] = 2.0;
        sys.aii[2] = 1.0;
        sys.aij[1] = -1.0;
        sys.f[1] = 100.0;
        sys.f[2] = 0.0;
        let mut h = vec![0.0; 3];
        sys.solve(&mut h).unwrap();
        assert!((h[1] - 100.0).abs() < 1e-8);
        assert!((h[2] - 100.0).abs() < 1e-8);
    }

    #[test]
    fn detects_disconnected_junction() {
        let sys = SparseSystem::new(1, vec![]);
        let mut h = vec![0.0; 2];
        assert_eq!(sys.solve(&mut h), Err(ErrorCode::HydSolveFailed));
    }

    #[test]
    fn parallel_links_accumulate() {
        // Two parallel unit links between J1 and fixed grade 50 plus one
        // to J2: A = [[3, -1], [-1, 1]], f = [100, 0] -> h1 = 50, h2 = 50.
        let mut sys = SparseSystem::new(2, vec![(1, 0), (1, 0), (1, 2)]);
        sys.reset();
        sys.aii[1] = 3.0;
        sys.aii[2] = 1.0;
        sys.aij[2] = -1.0;
        sys.f[1] = 100.0;
        let mut h = vec![0.0; 3];
        sys.solve(&mut h).unwrap();
        assert!((h[1] - 50.0).abs() < 1e-8);
        assert!((h[2] - 50.0).abs() < 1e-8);
    }
}
