//! Hydraulic Analysis-related API methods for EPANET.
//!
//! This module contains methods for opening, initializing, running, stepping,
//! saving, and closing hydraulic analyses.

use crate::epanet_error::*;
use crate::types::analysis::{AnalysisStatistic, InitHydOption};
use crate::EPANET;
use std::path::Path;

/// ## Hydraulic Analysis APIs
impl EPANET {
    /// Opens the hydraulic solver for the EPANET project.
    ///
    /// This function prepares the hydraulic solver for analysis: link
    /// resistances and pump curve coefficients are computed and the solver
    /// state arrays are sized to the network. It should be called before
    /// running hydraulic analyses using the `init_h`, `run_h`, and `next_h`
    /// sequence.
    ///
    /// # Returns
    /// A [`Result<()>`] which:
    /// - `Ok(())` if the solver was opened successfully.
    /// - `Err(EPANETError)` if an error occurred during opening.
    ///
    /// # Errors
    /// - 102 if no network data has been loaded.
    /// - 107 while hydraulics are supplied from an external file.
    /// - 223/224 if the network lacks junctions or tanks/reservoirs.
    /// - 226/227 for pumps with missing or invalid head curves.
    pub fn open_h(&mut self) -> Result<()> {
        check_error_with_context(
            self.project.open_hyd(),
            "Failed to open hydraulic solver".to_string(),
        )
    }

    /// Initializes tank levels, link status/settings, and the simulation
    /// clock. The flag controls flow re-initialization and whether results
    /// are saved to the scratch hydraulics file.
    pub fn init_h(&mut self, init_flag: InitHydOption) -> Result<()> {
        check_error_with_context(
            self.project.init_hyd(init_flag),
            format!("Failed to initialize hydraulics with {init_flag:?}"),
        )
    }

    /// Solves hydraulics for the current point in time. Returns the current
    /// simulation time in seconds.
    pub fn run_h(&mut self) -> Result<u64> {
        Ok(self.project.run_hyd()?)
    }

    /// Advances the simulation to the next hydraulic event. Returns the time
    /// step taken, 0 once the duration has been reached.
    pub fn next_h(&mut self) -> Result<u64> {
        Ok(self.project.next_hyd()?)
    }

    /// Runs a complete extended-period hydraulic analysis with results saved
    /// to the scratch hydraulics file.
    pub fn solve_h(&mut self) -> Result<()> {
        check_error_with_context(
            self.project.solve_hyd(),
            "Hydraulic analysis failed".to_string(),
        )
    }

    /// Transfers hydraulic results from the hydraulics file to the binary
    /// output file at uniform reporting intervals, for hydraulics-only runs.
    pub fn save_h(&mut self) -> Result<()> {
        let pr = &mut self.project;
        if !pr.hydfile.saved {
            return Err(ErrorCode::NoHydResults.into());
        }
        pr.hydfile.open_for_read(pr.hyd_shape())?;
        let prolog = pr.build_prolog();
        pr.outfile.open_for_write(&prolog)?;
        let nn = pr.network.n_nodes();
        let nl = pr.network.n_links();
        let mut rtime = pr.times.rstart;
        let mut previous: Option<crate::files::hydfile::HydStep> = None;
        loop {
            let step = pr.hydfile.read_step(nn, nl)?;
            let (time, done) = match &step {
                Some(s) => (s.time, false),
                None => (pr.times.duration + 1, true),
            };
            while rtime < time && rtime <= pr.times.duration {
                if let Some(snapshot) = &previous {
                    let (nodes, links) = pr.result_arrays(snapshot);
                    pr.outfile.write_period(&nodes, &links)?;
                    pr.times.nperiods = pr.outfile.nperiods;
                }
                rtime += pr.times.rstep;
            }
            if let Some(s) = step {
                if s.time == rtime && rtime <= pr.times.duration {
                    let (nodes, links) = pr.result_arrays(&s);
                    pr.outfile.write_period(&nodes, &links)?;
                    pr.times.nperiods = pr.outfile.nperiods;
                    rtime += pr.times.rstep;
                }
                previous = Some(s);
            }
            if done {
                break;
            }
        }
        pr.write_epilog()?;
        Ok(())
    }

    /// Uses a previously saved binary hydraulics file to supply the
    /// project's hydraulics, validating its header against the network.
    pub fn use_hydraulics_file(&mut self, file_name: &str) -> Result<()> {
        let pr = &mut self.project;
        if pr.hyd.open {
            return Err(ErrorCode::HydOpenedWhenUsingFile.into());
        }
        let shape = pr.hyd_shape();
        check_error_with_context(
            pr.hydfile.use_file(Path::new(file_name), shape),
            format!("Failed to use hydraulics file {file_name}"),
        )
    }

    /// Saves the scratch hydraulics results to a named binary file for later
    /// reuse through [`EPANET::use_hydraulics_file`].
    pub fn save_hydraulics_file(&mut self, file_name: &str) -> Result<()> {
        check_error_with_context(
            self.project.hydfile.save_to(Path::new(file_name)),
            format!("Failed to save hydraulics to {file_name}"),
        )
    }

    /// Closes the hydraulic solver, keeping saved results available for a
    /// subsequent water quality run.
    pub fn close_h(&mut self) -> Result<()> {
        self.project.close_hyd();
        Ok(())
    }

    /// Retrieves a statistic from the most recent hydraulic/quality solution.
    pub fn get_statistic(&self, statistic: AnalysisStatistic) -> Result<f64> {
        let pr = &self.project;
        let value = match statistic {
            AnalysisStatistic::Iterations => pr.hyd.iterations as f64,
            AnalysisStatistic::RelativeError => pr.hyd.relative_error,
            AnalysisStatistic::MaxHeadError => pr.hyd.max_head_error * pr.ucf.elev,
            AnalysisStatistic::MaxFlowChange => pr.hyd.max_flow_change * pr.ucf.flow,
            AnalysisStatistic::MassBalance => pr.qual.mass_balance.ratio(),
            AnalysisStatistic::DeficientNodes => pr.hyd.deficient_nodes as f64,
            AnalysisStatistic::DemandReduction => pr.hyd.demand_reduction,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::test_utils::fixtures::*;
    use crate::types::node::NodeProperty;
    use rstest::rstest;
    use std::fs;

    #[rstest]
    fn test_solve_h(mut ph: EPANET) {
        assert_eq!(ph.solve_h(), Ok(()));
        assert!(ph.get_statistic(AnalysisStatistic::Iterations).unwrap() >= 1.0);
    }

    #[rstest]
    fn test_hyd_step(mut ph: EPANET) {
        ph.open_h().unwrap();
        ph.init_h(InitHydOption::NoSave).unwrap();
        let mut steps = 0;
        loop {
            let t = ph.run_h().unwrap();
            let tstep = ph.next_h().unwrap();
            steps += 1;
            assert!(t <= 24 * 3600);
            if tstep == 0 {
                break;
            }
        }
        // 24 hourly periods plus boundary events.
        assert!(steps >= 24);
        ph.close_h().unwrap();
    }

    #[rstest]
    fn net1_tank_level_after_one_day(mut ph: EPANET) {
        ph.solve_h().unwrap();
        let tank = ph.get_node_index("2").unwrap();
        let level = ph.get_node_value(tank, NodeProperty::TankLevel).unwrap();
        assert!(
            (114.0..=130.0).contains(&level),
            "final tank level {level} out of expected band"
        );
    }

    #[rstest]
    fn run_before_open_is_rejected(mut ph: EPANET) {
        assert_eq!(ph.run_h().unwrap_err(), EPANETError::from(103));
    }

    #[rstest]
    fn test_hydraulics_save_file(mut ph: EPANET) {
        ph.solve_h().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let hyd_file = dir.path().join("test_savefile.hyd");
        ph.save_hydraulics_file(hyd_file.to_str().unwrap()).unwrap();
        assert!(hyd_file.exists(), "Hydraulics file was not created");

        ph.use_hydraulics_file(hyd_file.to_str().unwrap()).unwrap();
        assert_eq!(ph.solve_q(), Ok(()));

        // While supplied from a file, reopening the solver is refused.
        assert_eq!(ph.open_h().unwrap_err(), EPANETError::from(107));

        fs::remove_file(&hyd_file).expect("Failed to remove the hydraulics file");
    }

    #[rstest]
    fn hyd_file_interoperates_between_projects(mut ph: EPANET) {
        ph.solve_h().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let hyd_file = dir.path().join("shared.hyd");
        ph.save_hydraulics_file(hyd_file.to_str().unwrap()).unwrap();
        ph.solve_q().unwrap();
        let tank = ph.get_node_index("2").unwrap();
        let direct = ph.get_node_value(tank, NodeProperty::Quality).unwrap();

        let mut other = net1_project();
        other.use_hydraulics_file(hyd_file.to_str().unwrap()).unwrap();
        other.solve_q().unwrap();
        let viafile = other.get_node_value(tank, NodeProperty::Quality).unwrap();
        assert!(approx_eq(direct, viafile, 1e-6));
    }
}
