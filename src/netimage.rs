//! Download of the optional remote image shown in the network fallback mode.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::transform;

const FALLBACK_NAME: &str = "image";

pub struct NetImageFetcher {
    client: Client,
    folder: PathBuf,
}

impl NetImageFetcher {
    pub fn new(folder: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            folder: folder.into(),
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Download `url` into the network image folder and convert it to a frame.
    ///
    /// Returns the path of the converted frame.
    pub fn fetch(&self, url: &Url) -> Result<PathBuf> {
        debug!(%url, "fetching network image");
        let response = self.client.get(url.clone()).send()?;
        if !response.status().is_success() {
            return Err(Error::NetworkFetch(format!(
                "{url} returned status {}",
                response.status()
            )));
        }
        let body = response.bytes()?;

        fs::create_dir_all(&self.folder)?;
        let target = self.folder.join(file_name(url));
        let mut tmp = tempfile::NamedTempFile::new_in(&self.folder)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|err| err.error)?;

        let frame = match transform::transform_file(&target) {
            Ok(frame) => frame,
            Err(err) => {
                // Leave no undecodable body behind under a frame name.
                if let Err(rm) = fs::remove_file(&target) {
                    warn!(path = %target.display(), error = %rm, "failed to remove unusable download");
                }
                return Err(err);
            }
        };
        info!(%url, bytes = body.len(), path = %frame.display(), "network image stored");
        Ok(frame)
    }
}

/// Last non-empty path segment of `url`, or a fixed name.
fn file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_owned)
        .unwrap_or_else(|| FALLBACK_NAME.to_owned())
}
