use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::CalcError;

pub trait OutputCollector<T> {
    fn push(&mut self, item: T);
}

impl<T, F> OutputCollector<T> for F
where
    F: FnMut(T),
{
    #[inline(always)]
    fn push(&mut self, item: T) {
        (self)(item);
    }
}

/// One step of an occupancy step function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyPoint {
    /// Time relative to the forwarder window start.
    pub time: i128,
    /// Entries held from `time` on.
    pub level: i64,
}

impl OccupancyPoint {
    pub fn new(time: i128, level: i64) -> Self {
        Self { time, level }
    }
}

impl Display for OccupancyPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.time, self.level)
    }
}

pub const SERIES_HEADER: &str = "timeR FIBEntries";

/// Streams occupancy points into a two-column text file.
///
/// `push` cannot fail, so the first write error is kept and returned by
/// [`SeriesWriter::finish`].
pub struct SeriesWriter<W: Write> {
    path: PathBuf,
    out: W,
    error: Option<std::io::Error>,
}

impl SeriesWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, CalcError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(CalcError::io(path))?;
        Self::new(path, BufWriter::new(file))
    }
}

impl<W: Write> SeriesWriter<W> {
    pub fn new(path: impl Into<PathBuf>, mut out: W) -> Result<Self, CalcError> {
        let path = path.into();
        writeln!(out, "{SERIES_HEADER}").map_err(CalcError::io(path.clone()))?;
        Ok(Self {
            path,
            out,
            error: None,
        })
    }

    pub fn finish(mut self) -> Result<W, CalcError> {
        if let Some(e) = self.error.take() {
            return Err(CalcError::Io {
                path: self.path,
                source: e,
            });
        }
        self.out.flush().map_err(CalcError::io(self.path))?;
        Ok(self.out)
    }
}

impl<W: Write> OutputCollector<OccupancyPoint> for SeriesWriter<W> {
    fn push(&mut self, item: OccupancyPoint) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = writeln!(self.out, "{item}") {
            self.error = Some(e);
        }
    }
}

/// Writes a complete series in one go.
pub fn write_series(path: &Path, points: &[OccupancyPoint]) -> Result<(), CalcError> {
    let mut writer = SeriesWriter::create(path)?;
    for point in points {
        writer.push(*point);
    }
    writer.finish()?;
    Ok(())
}
