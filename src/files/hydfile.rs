//! The hydraulics scratch file: one fixed-layout record per converged
//! hydraulic period, consumed later by the water-quality solver. The layout
//! is stable so a file saved by one project can drive another
//! (`save_hyd_file` / `use_hyd_file`).
//!
//! Header: magic, engine version, then six i32 size fields (nodes, links,
//! tanks, pumps, valves, duration). Per period: current time (i32), node
//! demands and heads (f64), link flows (f64), statuses (i32), settings (f64).
//! All values little-endian.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::epanet_error::{EngineResult, ErrorCode};
use crate::files::{ENGINE_VERSION, MAGIC_NUMBER};
use crate::network::element::Status;

impl Status {
    pub(crate) fn to_code(self) -> i32 {
        match self {
            Status::XHead => 0,
            Status::TempClosed => 1,
            Status::Closed => 2,
            Status::Open => 3,
            Status::Active => 4,
            Status::XFlow => 5,
            Status::XFcv => 6,
            Status::XPressure => 7,
        }
    }

    pub(crate) fn from_code(code: i32) -> Status {
        match code {
            0 => Status::XHead,
            1 => Status::TempClosed,
            2 => Status::Closed,
            4 => Status::Active,
            5 => Status::XFlow,
            6 => Status::XFcv,
            7 => Status::XPressure,
            _ => Status::Open,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum HydFileMode {
    /// Engine-owned scratch file, rewritten on each `initH(SAVE)`.
    Scratch,
    /// Results are being supplied from a caller-provided file.
    Use,
}

/// The six network-size fields validated when reopening a saved file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HydFileShape {
    pub nnodes: i32,
    pub nlinks: i32,
    pub ntanks: i32,
    pub npumps: i32,
    pub nvalves: i32,
    pub duration: i32,
}

/// One hydraulic period as stored on disk.
#[derive(Debug, Clone)]
pub(crate) struct HydStep {
    pub time: u64,
    pub demand: Vec<f64>,
    pub head: Vec<f64>,
    pub flow: Vec<f64>,
    pub status: Vec<Status>,
    pub setting: Vec<f64>,
}

pub(crate) struct HydFile {
    pub path: PathBuf,
    pub mode: HydFileMode,
    file: Option<File>,
    /// Set once a complete run has been saved, enabling WQ consumption.
    pub saved: bool,
}

impl std::fmt::Debug for HydFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HydFile")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("saved", &self.saved)
            .finish()
    }
}

impl HydFile {
    pub fn new(path: PathBuf) -> Self {
        HydFile {
            path,
            mode: HydFileMode::Scratch,
            file: None,
            saved: false,
        }
    }

    /// Creates/truncates the scratch file and writes the header.
    pub fn open_for_write(&mut self, shape: HydFileShape) -> EngineResult<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|_| ErrorCode::CannotOpenHydFile)?;
        write_header(&mut file, shape)?;
        self.file = Some(file);
        self.saved = false;
        Ok(())
    }

    /// Appends one converged period.
    pub fn write_step(
        &mut self,
        time: u64,
        demand: &[f64],
        head: &[f64],
        flow: &[f64],
        status: &[Status],
        setting: &[f64],
    ) -> EngineResult<()> {
        let file = self.file.as_mut().ok_or(ErrorCode::CannotOpenHydFile)?;
        let res: std::io::Result<()> = (|| {
            file.write_i32::<LittleEndian>(time as i32)?;
            for v in &demand[1..] {
                file.write_f64::<LittleEndian>(*v)?;
            }
            for v in &head[1..] {
                file.write_f64::<LittleEndian>(*v)?;
            }
            for v in &flow[1..] {
                file.write_f64::<LittleEndian>(*v)?;
            }
            for s in &status[1..] {
                file.write_i32::<LittleEndian>(s.to_code())?;
            }
            for v in &setting[1..] {
                file.write_f64::<LittleEndian>(*v)?;
            }
            Ok(())
        })();
        res.map_err(|_| ErrorCode::CannotSaveResults)
    }

    /// Validates the header against the current network and positions the
    /// cursor at the first period record.
    pub fn open_for_read(&mut self, expected: HydFileShape) -> EngineResult<()> {
        let mut file = match self.file.take() {
            Some(f) => f,
            None => File::open(&self.path).map_err(|_| ErrorCode::CannotOpenHydFile)?,
        };
        file.seek(SeekFrom::Start(0))
            .map_err(|_| ErrorCode::CannotReadHydFile)?;
        let shape = read_header(&mut file)?;
        if shape != expected {
            return Err(ErrorCode::HydFileMismatch);
        }
        self.file = Some(file);
        Ok(())
    }

    /// Reads the next period record, or None at end of file.
    pub fn read_step(&mut self, nnodes: usize, nlinks: usize) -> EngineResult<Option<HydStep>> {
        let file = self.file.as_mut().ok_or(ErrorCode::CannotReadHydFile)?;
        let time = match file.read_i32::<LittleEndian>() {
            Ok(t) => t as u64,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(_) => return Err(ErrorCode::CannotReadHydFile),
        };
        let read = |file: &mut File, n: usize| -> std::io::Result<Vec<f64>> {
            let mut v = vec![0.0; n + 1];
            for x in v.iter_mut().skip(1) {
                *x = file.read_f64::<LittleEndian>()?;
            }
            Ok(v)
        };
        let res: std::io::Result<HydStep> = (|| {
            let demand = read(file, nnodes)?;
            let head = read(file, nnodes)?;
            let flow = read(file, nlinks)?;
            let mut status = vec![Status::Closed; nlinks + 1];
            for s in status.iter_mut().skip(1) {
                *s = Status::from_code(file.read_i32::<LittleEndian>()?);
            }
            let setting = read(file, nlinks)?;
            Ok(HydStep {
                time,
                demand,
                head,
                flow,
                status,
                setting,
            })
        })();
        res.map(Some).map_err(|_| ErrorCode::CannotReadHydFile)
    }

    /// Copies the scratch file to a caller-chosen destination.
    pub fn save_to(&mut self, dest: &Path) -> EngineResult<()> {
        if !self.saved {
            return Err(ErrorCode::NoHydResults);
        }
        if let Some(f) = self.file.as_mut() {
            f.flush().map_err(|_| ErrorCode::CannotSaveResults)?;
        }
        std::fs::copy(&self.path, dest).map_err(|_| ErrorCode::CannotSaveResults)?;
        Ok(())
    }

    /// Switches to an externally supplied hydraulics file after validating
    /// its header shape.
    pub fn use_file(&mut self, path: &Path, expected: HydFileShape) -> EngineResult<()> {
        let mut file = File::open(path).map_err(|_| ErrorCode::CannotOpenHydFile)?;
        let shape = read_header(&mut file).map_err(|_| ErrorCode::HydFileMismatch)?;
        if shape != expected {
            return Err(ErrorCode::HydFileMismatch);
        }
        self.close();
        self.path = path.to_path_buf();
        self.mode = HydFileMode::Use;
        self.saved = true;
        Ok(())
    }

    pub fn close(&mut self) {
        self.file = None;
    }
}

fn write_header(file: &mut File, shape: HydFileShape) -> EngineResult<()> {
    let res: std::io::Result<()> = (|| {
        file.write_i32::<LittleEndian>(MAGIC_NUMBER)?;
        file.write_i32::<LittleEndian>(ENGINE_VERSION)?;
        file.write_i32::<LittleEndian>(shape.nnodes)?;
        file.write_i32::<LittleEndian>(shape.nlinks)?;
        file.write_i32::<LittleEndian>(shape.ntanks)?;
        file.write_i32::<LittleEndian>(shape.npumps)?;
        file.write_i32::<LittleEndian>(shape.nvalves)?;
        file.write_i32::<LittleEndian>(shape.duration)?;
        Ok(())
    })();
    res.map_err(|_| ErrorCode::CannotSaveResults)
}

fn read_header(file: &mut File) -> EngineResult<HydFileShape> {
    let res: std::io::Result<(i32, i32, HydFileShape)> = (|| {
        let magic = file.read_i32::<LittleEndian>()?;
        let version = file.read_i32::<LittleEndian>()?;
        let shape = HydFileShape {
            nnodes: file.read_i32::<LittleEndian>()?,
            nlinks: file.read_i32::<LittleEndian>()?,
            ntanks: file.read_i32::<LittleEndian>()?,
            npumps: file.read_i32::<LittleEndian>()?,
            nvalves: file.read_i32::<LittleEndian>()?,
            duration: file.read_i32::<LittleEndian>()?,
        };
        Ok((magic, version, shape))
    })();
    match res {
        Ok((magic, version, shape)) => {
            if magic != MAGIC_NUMBER || version != ENGINE_VERSION {
                Err(ErrorCode::HydFileMismatch)
            } else {
                Ok(shape)
            }
        }
        Err(_) => Err(ErrorCode::CannotReadHydFile),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> HydFileShape {
        HydFileShape {
            nnodes: 2,
            nlinks: 1,
            ntanks: 1,
            npumps: 0,
            nvalves: 0,
            duration: 3600,
        }
    }

    #[test]
    fn write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut hf = HydFile::new(dir.path().join("hyd.bin"));
        hf.open_for_write(shape()).unwrap();
        hf.write_step(
            0,
            &[0.0, 1.5, -1.5],
            &[0.0, 100.0, 95.0],
            &[0.0, 1.5],
            &[Status::Closed, Status::Open],
            &[0.0, 1.0],
        )
        .unwrap();
        hf.saved = true;

        hf.open_for_read(shape()).unwrap();
        let step = hf.read_step(2, 1).unwrap().unwrap();
        assert_eq!(step.time, 0);
        assert_eq!(step.demand[2], -1.5);
        assert_eq!(step.head[1], 100.0);
        assert_eq!(step.status[1], Status::Open);
        assert!(hf.read_step(2, 1).unwrap().is_none());
    }

    #[test]
    fn shape_mismatch_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let mut hf = HydFile::new(dir.path().join("hyd.bin"));
        hf.open_for_write(shape()).unwrap();
        hf.saved = true;
        let wrong = HydFileShape {
            nnodes: 3,
            ..shape()
        };
        assert_eq!(hf.open_for_read(wrong), Err(ErrorCode::HydFileMismatch));
    }
}
