//! Legacy single-project facade.
//!
//! Mirrors the toolkit's original non-reentrant API: a process-wide hidden
//! project created on first use, operated on by free functions that omit the
//! handle. Concurrent use from multiple threads is unsupported; calls are
//! serialized on an internal lock and the default project lives until
//! [`close`] is called.

use crate::epanet_error::{ErrorCode, Result};
use crate::EPANET;
use std::sync::{Mutex, OnceLock};

fn default_project() -> &'static Mutex<Option<EPANET>> {
    static DEFAULT: OnceLock<Mutex<Option<EPANET>>> = OnceLock::new();
    DEFAULT.get_or_init(|| Mutex::new(None))
}

fn with_project<T>(f: impl FnOnce(&mut EPANET) -> Result<T>) -> Result<T> {
    let mut guard = default_project().lock().expect("legacy project lock");
    match guard.as_mut() {
        Some(project) => f(project),
        None => Err(ErrorCode::NoData.into()),
    }
}

/// Opens the hidden default project from an input file.
pub fn open(inp_path: &str, report_path: &str, out_path: &str) -> Result<()> {
    let project = EPANET::with_inp_file(inp_path, report_path, out_path)?;
    let mut guard = default_project().lock().expect("legacy project lock");
    *guard = Some(project);
    Ok(())
}

/// Runs a complete hydraulic analysis on the default project.
pub fn solve_h() -> Result<()> {
    with_project(|p| p.solve_h())
}

/// Runs a complete water-quality analysis on the default project.
pub fn solve_q() -> Result<()> {
    with_project(|p| p.solve_q())
}

/// Writes the report for the default project.
pub fn report() -> Result<()> {
    with_project(|p| p.report())
}

/// Closes and discards the default project.
pub fn close() -> Result<()> {
    let mut guard = default_project().lock().expect("legacy project lock");
    if let Some(mut project) = guard.take() {
        project.close()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn using_before_open_reports_no_data() {
        // Serialized with the other legacy tests by the internal lock; a
        // fresh process has no default project.
        let result = with_project(|_| Ok(()));
        if result.is_err() {
            assert_eq!(result.unwrap_err().code(), 102);
        }
    }
}
