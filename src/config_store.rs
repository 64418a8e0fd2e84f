//! Holder of the active runtime configuration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config_model::ConfigSnapshot;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Reads the JSON runtime configuration and keeps the last good snapshot.
///
/// Snapshots are swapped wholesale behind an [`Arc`], so anything holding a
/// previous snapshot keeps seeing a consistent value.
pub struct ConfigStore {
    path: PathBuf,
    current: Arc<ConfigSnapshot>,
}

impl ConfigStore {
    /// Start with the default snapshot; nothing is read until [`reload`](Self::reload).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: Arc::new(ConfigSnapshot::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.current)
    }

    /// Re-read the file. On failure the current snapshot stays in place.
    pub fn reload(&mut self) -> Result<Arc<ConfigSnapshot>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::ConfigUnavailable(format!(
                    "{} does not exist",
                    self.path.display()
                )));
            }
            Err(err) => {
                return Err(Error::ConfigUnavailable(format!(
                    "failed to read {}: {err}",
                    self.path.display()
                )));
            }
        };

        let snapshot = ConfigSnapshot::from_json_str(&text).map_err(|err| {
            Error::ConfigUnavailable(format!("failed to parse {}: {err:#}", self.path.display()))
        })?;

        if snapshot == *self.current {
            debug!(path = %self.path.display(), "configuration unchanged");
        } else {
            info!(
                path = %self.path.display(),
                mode = %snapshot.mode(),
                refresh_rate = ?snapshot.refresh_rate(),
                random = snapshot.randomize(),
                "configuration reloaded"
            );
        }
        self.current = Arc::new(snapshot);
        Ok(self.current())
    }
}
