//! Reporting-related API methods for EPANET.

use crate::epanet_error::*;
use crate::types::options::StatusReport;
use crate::EPANET;

/// ## Reporting APIs
impl EPANET {
    /// Writes the simulation results report, applying the configured
    /// statistic and element scopes.
    pub fn report(&mut self) -> Result<()> {
        check_error_with_context(
            self.project.write_report(),
            "Failed to write report".to_string(),
        )
    }

    /// Restores default reporting options.
    pub fn reset_report(&mut self) -> Result<()> {
        self.project.report.reset();
        Ok(())
    }

    /// Processes one reporting option line (`NODES ALL`, `SUMMARY NO`,
    /// `STATUS YES`, ...), as found in an `[REPORT]` section.
    pub fn set_report(&mut self, format: &str) -> Result<()> {
        check_error_with_context(
            self.project.report.set_option(format),
            format!("Bad report option: {format}"),
        )
    }

    /// Selects the level of hydraulic status reporting.
    pub fn set_status_report(&mut self, level: StatusReport) -> Result<()> {
        self.project.report.statflag = level;
        Ok(())
    }

    /// Writes a line of text to the report file.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        Ok(self.project.report.writeline(line)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::test_utils::fixtures::*;
    use crate::report::ReportScope;
    use rstest::rstest;

    #[rstest]
    fn report_without_results_is_106(mut ph: EPANET) {
        assert_eq!(ph.report().unwrap_err(), EPANETError::from(106));
    }

    #[rstest]
    fn set_then_reset_is_idempotent(mut ph: EPANET) {
        ph.set_report("NODES ALL").unwrap();
        ph.set_report("SUMMARY NO").unwrap();
        ph.reset_report().unwrap();
        assert_eq!(ph.project.report.nodes, ReportScope::None);
        assert!(ph.project.report.summary);
        // Applying the same option again lands in the same state.
        ph.set_report("NODES ALL").unwrap();
        let first = ph.project.report.nodes.clone();
        ph.reset_report().unwrap();
        ph.set_report("NODES ALL").unwrap();
        assert_eq!(ph.project.report.nodes, first);
    }

    #[rstest]
    fn full_run_produces_report(net1_with_report: (EPANET, tempfile::TempDir)) {
        let (mut ph, dir) = net1_with_report;
        ph.set_report("NODES ALL").unwrap();
        ph.set_report("LINKS ALL").unwrap();
        ph.solve_h().unwrap();
        ph.solve_q().unwrap();
        ph.report().unwrap();
        ph.close().unwrap();
        let text = std::fs::read_to_string(dir.path().join("net1.rpt")).unwrap();
        assert!(text.contains("Node Results"));
        assert!(text.contains("Link Results"));
    }
}
