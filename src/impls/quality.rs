//! Water Quality Analysis-related API methods for EPANET.
//!
//! This module contains methods for opening, initializing, running, stepping,
//! and closing water quality analyses.

use crate::epanet_error::*;
use crate::types::analysis::InitHydOption;
use crate::EPANET;

/// ## Water Quality Analysis APIs
impl EPANET {
    /// Opens the water quality solver. Saved hydraulic results (from a
    /// completed `solve_h` or an external hydraulics file) must exist before
    /// quality can be initialized.
    pub fn open_q(&mut self) -> Result<()> {
        check_error_with_context(
            self.project.open_qual(),
            "Failed to open water quality solver".to_string(),
        )
    }

    /// Initializes water quality state and the quality clock. The flag's
    /// save variants stream results to the binary output file.
    pub fn init_q(&mut self, save_flag: InitHydOption) -> Result<()> {
        check_error_with_context(
            self.project.init_qual(save_flag.saves()),
            format!("Failed to initialize quality with {save_flag:?}"),
        )
    }

    /// Supplies the current point of the quality solution. Returns the
    /// current quality clock in seconds; used in a loop with `next_q` or
    /// `step_q`.
    pub fn run_q(&mut self) -> Result<u64> {
        Ok(self.project.run_qual()?)
    }

    /// Advances quality transport to the end of the current hydraulic
    /// period. Returns the time advanced over (0 at the end of the run).
    pub fn next_q(&mut self) -> Result<u64> {
        Ok(self.project.next_qual()?)
    }

    /// Advances quality transport by one quality time step. Returns the
    /// time remaining in the run (0 at the end).
    pub fn step_q(&mut self) -> Result<u64> {
        Ok(self.project.step_qual()?)
    }

    /// Runs a complete water quality analysis over the saved hydraulics,
    /// writing results to the binary output file.
    pub fn solve_q(&mut self) -> Result<()> {
        check_error_with_context(
            self.project.solve_qual(),
            "Water quality analysis failed".to_string(),
        )
    }

    /// Closes the water quality solver and releases the hydraulics file.
    pub fn close_q(&mut self) -> Result<()> {
        self.project.close_qual();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::test_utils::fixtures::*;
    use crate::types::node::NodeProperty;
    use crate::types::options::QualityType;
    use rstest::rstest;

    #[rstest]
    fn test_solve_q(mut ph: EPANET) {
        ph.solve_h().unwrap();
        assert_eq!(ph.solve_q(), Ok(()));
        // Chlorine decayed between source and tank but some residual remains.
        let tank = ph.get_node_index("2").unwrap();
        let c = ph.get_node_value(tank, NodeProperty::Quality).unwrap();
        assert!(
            (0.05..=1.5).contains(&c),
            "tank chlorine residual {c} out of range"
        );
    }

    #[rstest]
    fn net1_tank_chlorine_band(mut ph: EPANET) {
        ph.solve_h().unwrap();
        ph.solve_q().unwrap();
        let tank = ph.get_node_index("2").unwrap();
        let c = ph.get_node_value(tank, NodeProperty::Quality).unwrap();
        assert!(
            (0.2..=0.5).contains(&c),
            "final tank concentration {c} outside [0.2, 0.5]"
        );
        // Mass balance closes within a percent.
        let ratio = ph
            .get_statistic(crate::types::AnalysisStatistic::MassBalance)
            .unwrap();
        assert!((ratio - 1.0).abs() < 0.01, "mass balance ratio {ratio}");
    }

    #[rstest]
    fn test_solve_q_step(mut ph: EPANET) {
        let t_stop = 10800;
        ph.solve_h().unwrap();
        ph.open_q().unwrap();
        ph.init_q(InitHydOption::NoSave).unwrap();
        loop {
            let t = ph.run_q().unwrap();
            let t_left = ph.step_q().unwrap();
            if t_left == 0 || t >= t_stop {
                break;
            }
        }
        ph.close_q().unwrap();
    }

    #[rstest]
    fn quality_requires_hydraulics(mut ph: EPANET) {
        ph.open_q().unwrap();
        let result = ph.init_q(InitHydOption::NoSave);
        assert_eq!(result.unwrap_err(), EPANETError::from(104));
    }

    #[rstest]
    fn age_analysis_grows_with_time(mut ph: EPANET) {
        ph.set_quality_type(QualityType::Age, "", "", "").unwrap();
        ph.solve_h().unwrap();
        ph.solve_q().unwrap();
        let tank = ph.get_node_index("2").unwrap();
        let age = ph.get_node_value(tank, NodeProperty::Quality).unwrap();
        // Water in the tank has aged on the order of the one-day run.
        assert!(age > 1.0, "tank age {age} hrs unexpectedly low");
    }

    #[rstest]
    fn trace_analysis_reports_percent(mut ph: EPANET) {
        ph.set_quality_type(QualityType::Trace, "", "", "9").unwrap();
        ph.solve_h().unwrap();
        ph.solve_q().unwrap();
        let node = ph.get_node_index("12").unwrap();
        let pct = ph.get_node_value(node, NodeProperty::Quality).unwrap();
        assert!((0.0..=100.0).contains(&pct));
    }
}
