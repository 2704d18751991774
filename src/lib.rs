//! Native Rust implementation of the EPANET 2.3 water distribution network
//! simulator: extended-period hydraulics, Lagrangian water-quality transport,
//! simple and rule-based controls, and the binary hydraulics/output file
//! formats of the toolkit.
//!
//! The [`EPANET`] struct is the project handle; every toolkit operation is a
//! method on it returning [`epanet_error::Result`]. Errors carry the numeric
//! toolkit codes.
//!
//! ```no_run
//! use epanet_engine::EPANET;
//!
//! # fn main() -> epanet_engine::epanet_error::Result<()> {
//! let mut ph = EPANET::with_inp_file("Net1.inp", "net1.rpt", "")?;
//! ph.solve_h()?;
//! ph.solve_q()?;
//! ph.report()?;
//! # Ok(())
//! # }
//! ```

pub mod epanet_error;
pub mod types;

mod files;
mod hydraulics;
mod impls;
mod inp;
mod network;
mod project;
mod quality;
mod report;
mod rules;
mod units;

pub mod legacy;

use epanet_error::{EPANETError, ErrorCode, Result};
use project::Project;
use std::path::{Path, PathBuf};
use types::options::{FlowUnits, HeadLossType};

/// Engine version in the toolkit's numeric form (2.3.0 -> 20300).
pub const VERSION: i32 = files::ENGINE_VERSION;

/// An EPANET Project.
pub struct EPANET {
    pub(crate) project: Project,
}

impl EPANET {
    /// Creates an empty project with the given flow units and headloss
    /// formula. `report_path` and `out_path` may be empty when no report or
    /// binary output file is wanted.
    pub fn new(
        report_path: &str,
        out_path: &str,
        flow_units: FlowUnits,
        headloss: HeadLossType,
    ) -> Result<Self> {
        let mut project = Project::new()?;
        Self::attach_files(&mut project, report_path, out_path)?;
        project.init(flow_units, headloss)?;
        Ok(EPANET { project })
    }

    /// Creates a project from an EPANET-formatted input file.
    pub fn with_inp_file(inp_path: &str, report_path: &str, out_path: &str) -> Result<Self> {
        if !inp_path.is_empty() && (inp_path == report_path || inp_path == out_path) {
            return Err(ErrorCode::SameFileNames.into());
        }
        let mut project = Project::new()?;
        Self::attach_files(&mut project, report_path, out_path)?;
        project
            .read_inp(Path::new(inp_path))
            .map_err(|code| EPANETError::from(code).with_context(format!("opening {inp_path}")))?;
        Ok(EPANET { project })
    }

    fn attach_files(
        project: &mut Project,
        report_path: &str,
        out_path: &str,
    ) -> epanet_error::EngineResult<()> {
        if !report_path.is_empty() {
            if report_path == out_path {
                return Err(ErrorCode::SameFileNames);
            }
            project.report.open(Path::new(report_path))?;
        }
        if !out_path.is_empty() {
            project.out_path = Some(PathBuf::from(out_path));
        }
        Ok(())
    }

    /// Closes the project's solvers and files, keeping the handle reusable
    /// via [`EPANET::with_inp_file`]-style reopening. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if let Some(dest) = self.project.out_path.clone() {
            if self.project.outfile.nperiods > 0 {
                self.project.outfile.save_to(&dest)?;
            }
        }
        self.project.close();
        Ok(())
    }

    /// The numeric engine version (2.3.0 -> 20300).
    pub fn version() -> i32 {
        VERSION
    }

    /// The message text for a toolkit error code.
    pub fn get_error(code: i32) -> String {
        EPANETError::from(code).message().to_string()
    }
}

impl Drop for EPANET {
    fn drop(&mut self) {
        // Scratch files live in the project's temp dir and vanish with it.
        self.project.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_close_twice() {
        let mut ph = EPANET::new("", "", FlowUnits::Gpm, HeadLossType::HazenWilliams).unwrap();
        assert!(ph.close().is_ok());
        assert!(ph.close().is_ok());
    }

    #[test]
    fn version_is_2_3() {
        assert_eq!(EPANET::version(), 20300);
    }

    #[test]
    fn error_text_lookup() {
        assert_eq!(EPANET::get_error(203), "undefined node");
        assert_eq!(EPANET::get_error(0), "unknown error");
    }
}
