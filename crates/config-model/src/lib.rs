//! Runtime configuration model shared by the frame controller and its
//! collaborators.
//!
//! The configuration file is a flat JSON object. A handful of keys drive
//! playback; every key (recognised or not) is kept verbatim so the status
//! screen can echo the live configuration back to the user.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use tracing::warn;
use url::Url;

/// Playback behaviour selected by the button or the `mode` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ModeId {
    /// Cycle through the most recently dated image folder.
    #[default]
    LocalCycle,
    /// Like [`ModeId::LocalCycle`], periodically substituting the network image.
    LocalCycleWithNetworkFallback,
    /// Cycle through the curated, non-dated collection folder.
    FixedCollection,
}

impl ModeId {
    pub const ALL: [Self; 3] = [
        Self::LocalCycle,
        Self::LocalCycleWithNetworkFallback,
        Self::FixedCollection,
    ];

    /// Highest valid zero-based mode index.
    pub const MAX_INDEX: u8 = 2;

    pub fn index(self) -> u8 {
        match self {
            Self::LocalCycle => 0,
            Self::LocalCycleWithNetworkFallback => 1,
            Self::FixedCollection => 2,
        }
    }

    pub fn from_index(index: u64) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|idx| Self::ALL.get(idx))
            .copied()
    }

    /// Next mode in cycle order, wrapping to the first mode past `max_index`.
    ///
    /// `max_index` is clamped to [`ModeId::MAX_INDEX`].
    pub fn next(self, max_index: u8) -> Self {
        let max_index = max_index.min(Self::MAX_INDEX);
        let next = self.index() + 1;
        if next > max_index {
            Self::LocalCycle
        } else {
            Self::from_index(u64::from(next)).unwrap_or_default()
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::LocalCycle => "local-cycle",
            Self::LocalCycleWithNetworkFallback => "local-cycle-with-network",
            Self::FixedCollection => "fixed-collection",
        }
    }
}

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable view of one successfully parsed configuration file.
///
/// A reload builds a fresh snapshot and swaps it in wholesale; nothing here
/// is ever mutated after construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigSnapshot {
    mode: ModeId,
    refresh_rate: Option<Duration>,
    randomize: bool,
    remote_image_url: Option<Url>,
    entries: Vec<(String, String)>,
}

impl ConfigSnapshot {
    pub const MODE_KEY: &'static str = "mode";
    pub const REFRESH_RATE_KEY: &'static str = "refresh_rate";
    pub const RANDOM_KEY: &'static str = "random";
    pub const URL_IMAGE_KEY: &'static str = "url_image";

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).context("config is not valid JSON")?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            bail!("config must be a JSON object");
        };
        Ok(Self::from_map(&map))
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let mode = match map.get(Self::MODE_KEY) {
            None | Some(Value::Null) => ModeId::default(),
            Some(raw) => match as_integer(raw).and_then(ModeId::from_index) {
                Some(mode) => mode,
                None => {
                    warn!(value = %raw, "ignoring unsupported mode");
                    ModeId::default()
                }
            },
        };

        let refresh_rate = match map.get(Self::REFRESH_RATE_KEY) {
            None | Some(Value::Null) => None,
            Some(raw) => match as_seconds(raw) {
                Some(secs) if secs > 0.0 => match Duration::try_from_secs_f64(secs) {
                    Ok(rate) => Some(rate),
                    Err(err) => {
                        warn!(value = %raw, error = %err, "ignoring out-of-range refresh_rate");
                        None
                    }
                },
                Some(_) => None,
                None => {
                    warn!(value = %raw, "ignoring non-numeric refresh_rate");
                    None
                }
            },
        };

        let randomize = map.get(Self::RANDOM_KEY).is_some_and(is_truthy);

        let remote_image_url = match map.get(Self::URL_IMAGE_KEY) {
            Some(Value::String(raw)) if !raw.trim().is_empty() => match Url::parse(raw.trim()) {
                Ok(url) => Some(url),
                Err(err) => {
                    warn!(url = %raw, error = %err, "ignoring malformed url_image");
                    None
                }
            },
            _ => None,
        };

        let entries = map
            .iter()
            .map(|(key, value)| (key.clone(), display_value(value)))
            .collect();

        Self {
            mode,
            refresh_rate,
            randomize,
            remote_image_url,
            entries,
        }
    }

    pub fn mode(&self) -> ModeId {
        self.mode
    }

    /// Interval between image changes; `None` keeps the frame static.
    pub fn refresh_rate(&self) -> Option<Duration> {
        self.refresh_rate
    }

    pub fn randomize(&self) -> bool {
        self.randomize
    }

    pub fn remote_image_url(&self) -> Option<&Url> {
        self.remote_image_url.as_ref()
    }

    /// Every key of the source file in file order, rendered for display.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn as_integer(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_seconds(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|secs| secs.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|secs| secs.is_finite()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
