//! Boundary to the e-ink panel.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::frame::Frame;

/// Something that can put a [`Frame`] on the panel.
///
/// Every failure here is a hardware fault.
pub trait DisplaySink {
    fn init(&mut self) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
    /// Partial refresh: faster, at the cost of some ghosting.
    fn set_fast_refresh(&mut self, enabled: bool) -> Result<()>;
    fn display(&mut self, frame: Frame) -> Result<()>;
    /// Put the panel to sleep. Called once before power-off or exit.
    fn shutdown(&mut self) -> Result<()>;
}

/// Hands frames to the panel driver process through a spool file.
///
/// Each frame replaces the BMP at `spool_path` atomically, so the driver
/// never reads a partially written frame.
///
/// The spool carries pixels only. Fast refresh cannot be requested through
/// it: [`DisplaySink::set_fast_refresh`] is recorded in the log and the
/// driver picks its own refresh mode.
pub struct SpoolDisplay {
    spool_path: PathBuf,
    fast_refresh: bool,
    active: bool,
}

impl SpoolDisplay {
    pub fn new(spool_path: impl Into<PathBuf>) -> Self {
        Self {
            spool_path: spool_path.into(),
            fast_refresh: false,
            active: false,
        }
    }

    pub fn spool_path(&self) -> &Path {
        &self.spool_path
    }

    fn spool_dir(&self) -> &Path {
        match self.spool_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn write(&self, frame: &Frame) -> Result<()> {
        if !self.active {
            return Err(Error::Hardware("display is not initialised".into()));
        }
        let mut tmp = tempfile::NamedTempFile::new_in(self.spool_dir()).map_err(Error::hardware)?;
        frame
            .write_bmp(BufWriter::new(tmp.as_file_mut()))
            .map_err(Error::hardware)?;
        tmp.as_file().sync_all().map_err(Error::hardware)?;
        tmp.persist(&self.spool_path)
            .map_err(|err| Error::hardware(err.error))?;
        Ok(())
    }
}

impl DisplaySink for SpoolDisplay {
    fn init(&mut self) -> Result<()> {
        fs::create_dir_all(self.spool_dir()).map_err(|err| {
            Error::Hardware(format!(
                "failed to prepare spool directory {}: {err}",
                self.spool_dir().display()
            ))
        })?;
        self.active = true;
        info!(spool = %self.spool_path.display(), "display initialised");
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.write(&Frame::blank())
    }

    fn set_fast_refresh(&mut self, enabled: bool) -> Result<()> {
        if self.fast_refresh != enabled {
            debug!(enabled, "fast refresh");
        }
        self.fast_refresh = enabled;
        Ok(())
    }

    fn display(&mut self, frame: Frame) -> Result<()> {
        self.write(&frame)?;
        debug!(spool = %self.spool_path.display(), fast = self.fast_refresh, "frame spooled");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        if std::mem::take(&mut self.active) {
            info!("display released");
        }
        Ok(())
    }
}
