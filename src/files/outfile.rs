//! The binary output file holding reported results: a prolog describing the
//! network, one node block and one link block per reporting period, and an
//! epilog with pump energy usage, the warning count and the magic trailer.
//! Floats are stored as little-endian f32, integers as i32.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::epanet_error::{EngineResult, ErrorCode};
use crate::files::{ENGINE_VERSION, MAGIC_NUMBER};

const ID_BYTES: usize = 32;
const TITLE_BYTES: usize = 80;

/// Node result variables written per period, in storage order.
pub(crate) const NODE_VARS: usize = 4; // demand, head, pressure, quality
/// Link result variables written per period, in storage order.
pub(crate) const LINK_VARS: usize = 6; // flow, velocity, headloss, quality, status, setting

/// Network description stamped into the prolog.
pub(crate) struct OutFileProlog {
    pub nnodes: i32,
    pub ntanks: i32,
    pub nlinks: i32,
    pub npumps: i32,
    pub nvalves: i32,
    pub qualflag: i32,
    pub trace_node: i32,
    pub flow_units: i32,
    pub press_units: i32,
    pub statistic: i32,
    pub rstart: i32,
    pub rstep: i32,
    pub duration: i32,
    pub title: [String; 3],
    pub node_ids: Vec<String>,
    pub link_ids: Vec<String>,
    pub link_nodes: Vec<(i32, i32)>,
    pub link_types: Vec<i32>,
}

/// Per-pump energy summary written to the epilog.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PumpEnergyRecord {
    pub link: i32,
    pub utilization: f32,
    pub efficiency: f32,
    pub kw_per_flow: f32,
    pub avg_kw: f32,
    pub peak_kw: f32,
    pub cost: f32,
}

pub(crate) struct OutFile {
    pub path: PathBuf,
    file: Option<File>,
    nnodes: usize,
    nlinks: usize,
    data_start: u64,
    pub nperiods: usize,
    pub open: bool,
}

impl std::fmt::Debug for OutFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutFile")
            .field("path", &self.path)
            .field("nperiods", &self.nperiods)
            .finish()
    }
}

fn write_fixed(file: &mut File, s: &str, len: usize) -> std::io::Result<()> {
    let mut buf = vec![0u8; len];
    let bytes = s.as_bytes();
    let n = bytes.len().min(len - 1);
    buf[..n].copy_from_slice(&bytes[..n]);
    file.write_all(&buf)
}

impl OutFile {
    pub fn new(path: PathBuf) -> Self {
        OutFile {
            path,
            file: None,
            nnodes: 0,
            nlinks: 0,
            data_start: 0,
            nperiods: 0,
            open: false,
        }
    }

    pub fn open_for_write(&mut self, prolog: &OutFileProlog) -> EngineResult<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|_| ErrorCode::CannotOpenOutputFile)?;
        let res: std::io::Result<u64> = (|| {
            file.write_i32::<LittleEndian>(MAGIC_NUMBER)?;
            file.write_i32::<LittleEndian>(ENGINE_VERSION)?;
            file.write_i32::<LittleEndian>(prolog.nnodes)?;
            file.write_i32::<LittleEndian>(prolog.ntanks)?;
            file.write_i32::<LittleEndian>(prolog.nlinks)?;
            file.write_i32::<LittleEndian>(prolog.npumps)?;
            file.write_i32::<LittleEndian>(prolog.nvalves)?;
            file.write_i32::<LittleEndian>(prolog.qualflag)?;
            file.write_i32::<LittleEndian>(prolog.trace_node)?;
            file.write_i32::<LittleEndian>(prolog.flow_units)?;
            file.write_i32::<LittleEndian>(prolog.press_units)?;
            file.write_i32::<LittleEndian>(prolog.statistic)?;
            file.write_i32::<LittleEndian>(prolog.rstart)?;
            file.write_i32::<LittleEndian>(prolog.rstep)?;
            file.write_i32::<LittleEndian>(prolog.duration)?;
            for line in &prolog.title {
                write_fixed(&mut file, line, TITLE_BYTES)?;
            }
            for id in &prolog.node_ids {
                write_fixed(&mut file, id, ID_BYTES)?;
            }
            for id in &prolog.link_ids {
                write_fixed(&mut file, id, ID_BYTES)?;
            }
            for (n1, n2) in &prolog.link_nodes {
                file.write_i32::<LittleEndian>(*n1)?;
                file.write_i32::<LittleEndian>(*n2)?;
            }
            for lt in &prolog.link_types {
                file.write_i32::<LittleEndian>(*lt)?;
            }
            file.stream_position()
        })();
        self.data_start = res.map_err(|_| ErrorCode::CannotSaveResults)?;
        self.nnodes = prolog.nnodes as usize;
        self.nlinks = prolog.nlinks as usize;
        self.nperiods = 0;
        self.file = Some(file);
        self.open = true;
        Ok(())
    }

    /// Appends one reporting period. Slices are 1-indexed with a sentinel at
    /// zero and are written variable-major like the prolog promises.
    pub fn write_period(
        &mut self,
        node_vars: &[Vec<f64>; NODE_VARS],
        link_vars: &[Vec<f64>; LINK_VARS],
    ) -> EngineResult<()> {
        let file = self.file.as_mut().ok_or(ErrorCode::CannotOpenOutputFile)?;
        let res: std::io::Result<()> = (|| {
            for var in node_vars {
                for v in &var[1..] {
                    file.write_f32::<LittleEndian>(*v as f32)?;
                }
            }
            for var in link_vars {
                for v in &var[1..] {
                    file.write_f32::<LittleEndian>(*v as f32)?;
                }
            }
            Ok(())
        })();
        res.map_err(|_| ErrorCode::CannotSaveResults)?;
        self.nperiods += 1;
        Ok(())
    }

    pub fn write_epilog(
        &mut self,
        pumps: &[PumpEnergyRecord],
        demand_charge: f64,
        warning_count: i32,
    ) -> EngineResult<()> {
        let file = self.file.as_mut().ok_or(ErrorCode::CannotOpenOutputFile)?;
        let nperiods = self.nperiods;
        let res: std::io::Result<()> = (|| {
            for p in pumps {
                file.write_i32::<LittleEndian>(p.link)?;
                file.write_f32::<LittleEndian>(p.utilization)?;
                file.write_f32::<LittleEndian>(p.efficiency)?;
                file.write_f32::<LittleEndian>(p.kw_per_flow)?;
                file.write_f32::<LittleEndian>(p.avg_kw)?;
                file.write_f32::<LittleEndian>(p.peak_kw)?;
                file.write_f32::<LittleEndian>(p.cost)?;
            }
            file.write_f32::<LittleEndian>(demand_charge as f32)?;
            file.write_i32::<LittleEndian>(nperiods as i32)?;
            file.write_i32::<LittleEndian>(warning_count)?;
            file.write_i32::<LittleEndian>(MAGIC_NUMBER)?;
            file.flush()
        })();
        res.map_err(|_| ErrorCode::CannotSaveResults)
    }

    fn period_bytes(&self) -> u64 {
        ((self.nnodes * NODE_VARS + self.nlinks * LINK_VARS) * 4) as u64
    }

    /// Reads back one stored period for reporting. Returns 1-indexed arrays.
    #[allow(clippy::type_complexity)]
    pub fn read_period(
        &mut self,
        period: usize,
    ) -> EngineResult<([Vec<f64>; NODE_VARS], [Vec<f64>; LINK_VARS])> {
        if period >= self.nperiods {
            return Err(ErrorCode::NoResults);
        }
        let offset = self.data_start + period as u64 * self.period_bytes();
        let nnodes = self.nnodes;
        let nlinks = self.nlinks;
        let file = self.file.as_mut().ok_or(ErrorCode::NoResults)?;
        let res: std::io::Result<_> = (|| {
            file.seek(SeekFrom::Start(offset))?;
            let mut nodes: [Vec<f64>; NODE_VARS] = Default::default();
            for var in nodes.iter_mut() {
                var.push(0.0);
                for _ in 0..nnodes {
                    var.push(file.read_f32::<LittleEndian>()? as f64);
                }
            }
            let mut links: [Vec<f64>; LINK_VARS] = Default::default();
            for var in links.iter_mut() {
                var.push(0.0);
                for _ in 0..nlinks {
                    var.push(file.read_f32::<LittleEndian>()? as f64);
                }
            }
            Ok((nodes, links))
        })();
        res.map_err(|_| ErrorCode::NoResults)
    }

    /// Copies the finished output file to a user-requested destination.
    pub fn save_to(&mut self, dest: &std::path::Path) -> EngineResult<()> {
        if let Some(f) = self.file.as_mut() {
            f.flush().map_err(|_| ErrorCode::CannotSaveResults)?;
        }
        std::fs::copy(&self.path, dest).map_err(|_| ErrorCode::CannotSaveResults)?;
        Ok(())
    }

    pub fn close(&mut self) {
        self.file = None;
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prolog() -> OutFileProlog {
        OutFileProlog {
            nnodes: 2,
            ntanks: 1,
            nlinks: 1,
            npumps: 0,
            nvalves: 0,
            qualflag: 0,
            trace_node: 0,
            flow_units: 1,
            press_units: 0,
            statistic: 0,
            rstart: 0,
            rstep: 3600,
            duration: 3600,
            title: Default::default(),
            node_ids: vec!["J1".into(), "T1".into()],
            link_ids: vec!["P1".into()],
            link_nodes: vec![(1, 2)],
            link_types: vec![1],
        }
    }

    #[test]
    fn period_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = OutFile::new(dir.path().join("out.bin"));
        out.open_for_write(&prolog()).unwrap();

        let node_vars = [
            vec![0.0, 10.0, 0.0],
            vec![0.0, 120.0, 130.0],
            vec![0.0, 52.0, 56.3],
            vec![0.0, 0.4, 0.6],
        ];
        let link_vars = [
            vec![0.0, 10.0],
            vec![0.0, 1.2],
            vec![0.0, 0.8],
            vec![0.0, 0.5],
            vec![0.0, 3.0],
            vec![0.0, 1.0],
        ];
        out.write_period(&node_vars, &link_vars).unwrap();
        out.write_epilog(&[], 0.0, 0).unwrap();

        let (nodes, links) = out.read_period(0).unwrap();
        assert_eq!(nodes[1][2], 130.0);
        assert!((nodes[2][2] - 56.3).abs() < 1e-4);
        assert_eq!(links[0][1], 10.0);
        assert!(out.read_period(1).is_err());
    }
}
