//! Segment-scoped trajectory output.
//!
//! A [`SinkFactory`] opens one [`FrameSink`] per segment; the engine feeds it
//! frames while advancing and the driver closes it before the next segment
//! opens. [`DumpDirectory`] writes LAMMPS-style text dumps, one file per
//! segment.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[error("output artifact {}: {source}", .path.display())]
pub struct SinkError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl SinkError {
    pub fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SinkError {
            path: path.into(),
            source,
        }
    }
}

/// Borrowed view of the particle set at one timestep.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Cumulative engine step count.
    pub timestep: u64,
    pub bounds: [[f64; 2]; 3],
    pub ids: &'a [u64],
    pub types: &'a [usize],
    pub positions: &'a [[f64; 3]],
}

impl<'a> Frame<'a> {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub trait FrameSink {
    /// Number of engine steps between frames.
    fn cadence(&self) -> u64;

    fn write_frame(&mut self, frame: &Frame<'_>) -> Result<(), SinkError>;

    /// Flushes and releases the sink. Nothing can be written afterwards.
    fn close(self) -> Result<(), SinkError>
    where
        Self: Sized;
}

pub trait SinkFactory {
    type Sink: FrameSink;

    fn open(&mut self, name: &str, cadence: u64) -> Result<Self::Sink, SinkError>;
}

/// Writes every segment's dump into one directory.
#[derive(Debug, Clone)]
pub struct DumpDirectory {
    dir: PathBuf,
}

impl DumpDirectory {
    /// Uses `dir` for output, creating it when missing.
    pub fn create(dir: impl Into<PathBuf>) -> Result<DumpDirectory, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| SinkError::new(dir.clone(), e))?;
        Ok(DumpDirectory { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl SinkFactory for DumpDirectory {
    type Sink = DumpFile;

    fn open(&mut self, name: &str, cadence: u64) -> Result<DumpFile, SinkError> {
        DumpFile::create(self.dir.join(name), cadence)
    }
}

/// One segment's dump file. Dropping it without `close` still flushes what
/// it can, but only `close` reports failures.
#[derive(Debug)]
pub struct DumpFile {
    path: PathBuf,
    cadence: u64,
    frames: u64,
    file: Option<BufWriter<File>>,
}

impl DumpFile {
    pub fn create(path: PathBuf, cadence: u64) -> Result<DumpFile, SinkError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| SinkError::new(path.clone(), e))?;

        debug!(path = %path.display(), cadence, "opened dump file");

        Ok(DumpFile {
            path,
            cadence,
            frames: 0,
            file: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn write_items(file: &mut BufWriter<File>, frame: &Frame<'_>) -> io::Result<()> {
        writeln!(file, "ITEM: TIMESTEP")?;
        writeln!(file, "{}", frame.timestep)?;
        writeln!(file, "ITEM: NUMBER OF ATOMS")?;
        writeln!(file, "{}", frame.len())?;
        writeln!(file, "ITEM: BOX BOUNDS pp pp pp")?;
        for [lo, hi] in frame.bounds.iter() {
            writeln!(file, "{} {}", lo, hi)?;
        }
        writeln!(file, "ITEM: ATOMS id type x y z")?;
        for i in 0..frame.len() {
            let x = frame.positions[i];
            writeln!(file, "{} {} {} {} {}", frame.ids[i], frame.types[i], x[0], x[1], x[2])?;
        }
        Ok(())
    }
}

impl FrameSink for DumpFile {
    fn cadence(&self) -> u64 {
        self.cadence
    }

    fn write_frame(&mut self, frame: &Frame<'_>) -> Result<(), SinkError> {
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => {
                return Err(SinkError::new(
                    self.path.clone(),
                    io::Error::new(io::ErrorKind::Other, "dump file already closed"),
                ))
            }
        };
        DumpFile::write_items(file, frame).map_err(|e| SinkError::new(self.path.clone(), e))?;
        self.frames += 1;
        Ok(())
    }

    fn close(mut self) -> Result<(), SinkError> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .map_err(|e| SinkError::new(self.path.clone(), e))?;
            debug!(path = %self.path.display(), frames = self.frames, "closed dump file");
        }
        Ok(())
    }
}

impl Drop for DumpFile {
    fn drop(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame<'a>(ids: &'a [u64], types: &'a [usize], positions: &'a [[f64; 3]]) -> Frame<'a> {
        Frame {
            timestep: 10,
            bounds: [[0.0, 4.0], [0.0, 4.0], [-1.0, 1.0]],
            ids,
            types,
            positions,
        }
    }

    #[test]
    fn writes_lammps_dump_items() {
        let dir = tempfile::tempdir().unwrap();
        let mut sinks = DumpDirectory::create(dir.path()).unwrap();
        let mut sink = sinks.open("dump_1.trj", 5).unwrap();
        assert_eq!(sink.cadence(), 5);

        let ids = [1, 2];
        let types = [1, 2];
        let positions = [[0.5, 1.0, 0.0], [2.0, 3.5, -0.25]];
        sink.write_frame(&frame(&ids, &types, &positions)).unwrap();
        assert_eq!(sink.frames(), 1);
        sink.close().unwrap();

        let text = fs::read_to_string(dir.path().join("dump_1.trj")).unwrap();
        let expected = "ITEM: TIMESTEP\n10\nITEM: NUMBER OF ATOMS\n2\n\
                        ITEM: BOX BOUNDS pp pp pp\n0 4\n0 4\n-1 1\n\
                        ITEM: ATOMS id type x y z\n1 1 0.5 1 0\n2 2 2 3.5 -0.25\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn reopening_a_name_truncates_stale_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump_1.trj");
        fs::write(&path, "stale contents").unwrap();

        let sink = DumpFile::create(path.clone(), 1).unwrap();
        sink.close().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn dropping_an_unclosed_sink_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropped.trj");
        {
            let mut sink = DumpFile::create(path.clone(), 1).unwrap();
            let ids = [7];
            let types = [1];
            let positions = [[0.0, 0.0, 0.0]];
            sink.write_frame(&frame(&ids, &types, &positions)).unwrap();
        }
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("7 1 0 0 0"));
    }

    #[test]
    fn unwritable_location_is_a_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        // a directory squatting on the artifact name
        fs::create_dir(dir.path().join("dump_3.trj")).unwrap();
        let mut sinks = DumpDirectory::create(dir.path()).unwrap();
        let err = sinks.open("dump_3.trj", 1).unwrap_err();
        assert!(err.path.ends_with("dump_3.trj"));
    }
}
