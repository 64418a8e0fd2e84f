use std::path::PathBuf;

use thiserror::Error;

/// Library error type for frame controller operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A source image could not be decoded; the file is left in place.
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The runtime configuration file is missing or unusable.
    #[error("configuration unavailable: {0}")]
    ConfigUnavailable(String),

    /// Downloading the remote image failed.
    #[error("network fetch failed: {0}")]
    NetworkFetch(String),

    /// Display or input line I/O failed.
    #[error("hardware fault: {0}")]
    Hardware(String),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the controller must stop after this error.
    ///
    /// Everything except hardware faults is absorbed at the component
    /// boundary that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Hardware(_))
    }

    pub fn hardware(err: impl std::fmt::Display) -> Self {
        Error::Hardware(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::NetworkFetch(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
