//! Report-file output: error and warning text, status messages and the
//! post-run result tables, honoring the `[REPORT]`-style options set through
//! `set_report`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::epanet_error::{EngineResult, ErrorCode};
use crate::files::outfile::{LINK_VARS, NODE_VARS};
use crate::project::Project;
use crate::types::options::{StatisticType, StatusReport};
use tracing::warn;

/// Which elements appear in the report tables.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum ReportScope {
    #[default]
    None,
    All,
    Some(Vec<i32>),
}

#[derive(Debug, Default)]
pub(crate) struct Report {
    pub path: Option<PathBuf>,
    file: Option<File>,
    pub statflag: StatusReport,
    pub summary: bool,
    pub energy: bool,
    pub nodes: ReportScope,
    pub links: ReportScope,
}

impl Report {
    pub fn open(&mut self, path: &Path) -> EngineResult<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|_| ErrorCode::CannotOpenReportFile)?;
        self.file = Some(file);
        self.path = Some(path.to_path_buf());
        self.summary = true;
        Ok(())
    }

    pub fn close(&mut self) {
        self.file = None;
    }

    /// Restores default reporting options without touching the open file.
    pub fn reset(&mut self) {
        self.statflag = StatusReport::NoReport;
        self.summary = true;
        self.energy = false;
        self.nodes = ReportScope::None;
        self.links = ReportScope::None;
    }

    pub fn writeline(&mut self, line: &str) -> EngineResult<()> {
        if let Some(file) = self.file.as_mut() {
            writeln!(file, "  {line}").map_err(|_| ErrorCode::CannotWriteReport)?;
        }
        Ok(())
    }

    /// Writes an error or warning message; also mirrored to the log.
    pub fn write_message(&mut self, text: &str) {
        warn!("{text}");
        let _ = self.writeline(text);
    }

    /// Applies one `set_report` option line (e.g. "NODES ALL", "SUMMARY NO").
    pub fn set_option(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(ErrorCode::InvalidFormat);
        }
        let keyword = tokens[0].to_uppercase();
        let arg = tokens.get(1).map(|s| s.to_uppercase()).unwrap_or_default();
        match keyword.as_str() {
            "SUMMARY" => self.summary = arg != "NO",
            "ENERGY" => self.energy = arg == "YES",
            "STATUS" => {
                self.statflag = match arg.as_str() {
                    "YES" => StatusReport::NormalReport,
                    "FULL" => StatusReport::FullReport,
                    _ => StatusReport::NoReport,
                }
            }
            "NODES" => match arg.as_str() {
                "ALL" => self.nodes = ReportScope::All,
                "NONE" | "" => self.nodes = ReportScope::None,
                _ => return Err(ErrorCode::InvalidFormat),
            },
            "LINKS" => match arg.as_str() {
                "ALL" => self.links = ReportScope::All,
                "NONE" | "" => self.links = ReportScope::None,
                _ => return Err(ErrorCode::InvalidFormat),
            },
            _ => return Err(ErrorCode::InvalidFormat),
        }
        Ok(())
    }
}

const NODE_HEADERS: [&str; NODE_VARS] = ["Demand", "Head", "Pressure", "Quality"];
const LINK_HEADERS: [&str; LINK_VARS] =
    ["Flow", "Velocity", "Headloss", "Quality", "Status", "Setting"];

impl Project {
    /// Writes the result tables from the output file to the report file,
    /// applying the configured statistic across reporting periods.
    pub(crate) fn write_report(&mut self) -> EngineResult<()> {
        if self.outfile.nperiods == 0 {
            return Err(ErrorCode::NoResults);
        }
        if self.report.summary {
            self.write_summary()?;
        }
        if self.report.nodes == ReportScope::None && self.report.links == ReportScope::None {
            return Ok(());
        }

        match self.times.statistic {
            StatisticType::Series => {
                for period in 0..self.outfile.nperiods {
                    let (nodes, links) = self.outfile.read_period(period)?;
                    let time = self.times.rstart + period as u64 * self.times.rstep;
                    self.write_period_tables(&format!("at {}", clock(time)), &nodes, &links)?;
                }
            }
            stat => {
                let (nodes, links) = self.statistic_tables(stat)?;
                self.write_period_tables(&format!("{stat:?} over run"), &nodes, &links)?;
            }
        }
        Ok(())
    }

    fn write_summary(&mut self) -> EngineResult<()> {
        let counts = [
            format!("Number of Junctions ... {}", self.network.njuncs),
            format!(
                "Number of Reservoirs/Tanks ... {}",
                self.network.n_tanks()
            ),
            format!("Number of Pipes ... {}", self.network.npipes),
            format!("Number of Pumps ... {}", self.network.n_pumps()),
            format!("Number of Valves ... {}", self.network.n_valves()),
        ];
        for line in counts {
            self.report.writeline(&line)?;
        }
        let warning = self.hyd.warnings.highest();
        if warning > 0 {
            self.report
                .write_message(&format!("WARNING: analysis ended with warning code {warning}"));
        }
        Ok(())
    }

    /// Aggregates the stored periods into a single AVG/MIN/MAX/RANGE table.
    /// The aggregate is staged through the statistics scratch file so very
    /// long runs never hold more than two periods in memory.
    #[allow(clippy::type_complexity)]
    fn statistic_tables(
        &mut self,
        stat: StatisticType,
    ) -> EngineResult<([Vec<f64>; NODE_VARS], [Vec<f64>; LINK_VARS])> {
        use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
        use std::io::{Seek, SeekFrom};

        let (mut lo_n, mut lo_l) = self.outfile.read_period(0)?;
        let (mut hi_n, mut hi_l) = (lo_n.clone(), lo_l.clone());
        let (mut sum_n, mut sum_l) = (lo_n.clone(), lo_l.clone());
        for period in 1..self.outfile.nperiods {
            let (nodes, links) = self.outfile.read_period(period)?;
            for v in 0..NODE_VARS {
                for i in 0..nodes[v].len() {
                    lo_n[v][i] = lo_n[v][i].min(nodes[v][i]);
                    hi_n[v][i] = hi_n[v][i].max(nodes[v][i]);
                    sum_n[v][i] += nodes[v][i];
                }
            }
            for v in 0..LINK_VARS {
                for i in 0..links[v].len() {
                    lo_l[v][i] = lo_l[v][i].min(links[v][i]);
                    hi_l[v][i] = hi_l[v][i].max(links[v][i]);
                    sum_l[v][i] += links[v][i];
                }
            }
        }
        let n = self.outfile.nperiods as f64;
        let pick = |lo: f64, hi: f64, sum: f64| match stat {
            StatisticType::Minimum => lo,
            StatisticType::Maximum => hi,
            StatisticType::Range => hi - lo,
            _ => sum / n,
        };
        let mut out_n: [Vec<f64>; NODE_VARS] = Default::default();
        for v in 0..NODE_VARS {
            out_n[v] = (0..lo_n[v].len())
                .map(|i| pick(lo_n[v][i], hi_n[v][i], sum_n[v][i]))
                .collect();
        }
        let mut out_l: [Vec<f64>; LINK_VARS] = Default::default();
        for v in 0..LINK_VARS {
            out_l[v] = (0..lo_l[v].len())
                .map(|i| pick(lo_l[v][i], hi_l[v][i], sum_l[v][i]))
                .collect();
        }

        // Stage through the statistics scratch file.
        let mut f = File::create(&self.temp_stat).map_err(|_| ErrorCode::CannotSaveResults)?;
        for var in out_n.iter().chain(out_l.iter()) {
            for v in var {
                f.write_f64::<LittleEndian>(*v)
                    .map_err(|_| ErrorCode::CannotSaveResults)?;
            }
        }
        f.seek(SeekFrom::Start(0))
            .map_err(|_| ErrorCode::CannotSaveResults)?;
        let mut f = File::open(&self.temp_stat).map_err(|_| ErrorCode::NoResults)?;
        for var in out_n.iter_mut().chain(out_l.iter_mut()) {
            for v in var.iter_mut() {
                *v = f
                    .read_f64::<LittleEndian>()
                    .map_err(|_| ErrorCode::NoResults)?;
            }
        }
        Ok((out_n, out_l))
    }

    fn write_period_tables(
        &mut self,
        label: &str,
        nodes: &[Vec<f64>; NODE_VARS],
        links: &[Vec<f64>; LINK_VARS],
    ) -> EngineResult<()> {
        if self.report.nodes != ReportScope::None {
            self.report.writeline(&format!("Node Results {label}:"))?;
            self.report
                .writeline(&format!("{:<18}{}", "Node", NODE_HEADERS.join("\t")))?;
            for i in 1..=self.network.n_nodes() {
                if !self.in_scope(&self.report.nodes.clone(), i as i32) {
                    continue;
                }
                let vals: Vec<String> = (0..NODE_VARS)
                    .map(|v| format!("{:.2}", nodes[v][i]))
                    .collect();
                let id = self.network.nodes[i].id.clone();
                self.report
                    .writeline(&format!("{:<18}{}", id, vals.join("\t")))?;
            }
        }
        if self.report.links != ReportScope::None {
            self.report.writeline(&format!("Link Results {label}:"))?;
            self.report
                .writeline(&format!("{:<18}{}", "Link", LINK_HEADERS.join("\t")))?;
            for i in 1..=self.network.n_links() {
                if !self.in_scope(&self.report.links.clone(), i as i32) {
                    continue;
                }
                let vals: Vec<String> = (0..LINK_VARS)
                    .map(|v| format!("{:.2}", links[v][i]))
                    .collect();
                let id = self.network.links[i].id.clone();
                self.report
                    .writeline(&format!("{:<18}{}", id, vals.join("\t")))?;
            }
        }
        Ok(())
    }

    fn in_scope(&self, scope: &ReportScope, index: i32) -> bool {
        match scope {
            ReportScope::None => false,
            ReportScope::All => true,
            ReportScope::Some(list) => list.contains(&index),
        }
    }
}

/// hh:mm:ss rendering for report headings.
pub(crate) fn clock(seconds: u64) -> String {
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_option_parses_keywords() {
        let mut report = Report::default();
        report.set_option("NODES ALL").unwrap();
        assert_eq!(report.nodes, ReportScope::All);
        report.set_option("STATUS FULL").unwrap();
        assert_eq!(report.statflag, StatusReport::FullReport);
        assert!(report.set_option("BOGUS X").is_err());
    }

    #[test]
    fn reset_is_idempotent_with_set() {
        let mut report = Report::default();
        report.set_option("SUMMARY NO").unwrap();
        report.reset();
        assert!(report.summary);
        report.reset();
        assert!(report.summary);
    }

    #[test]
    fn clock_formats() {
        assert_eq!(clock(3661), "1:01:01");
        assert_eq!(clock(0), "0:00:00");
    }
}
