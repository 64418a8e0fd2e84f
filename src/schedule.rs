//! Playback state machine.
//!
//! Each tick the scheduler walks a fixed agenda of `(deadline, action)`
//! pairs in priority order and returns the first action whose deadline has
//! passed. A due configuration reload therefore always wins over an image
//! change in the same tick; the image change runs on the following tick.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use config_model::{ConfigSnapshot, ModeId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::catalog;

/// Network substitution spacing, in multiples of the refresh rate.
const NETWORK_INTERVAL_FACTOR: u32 = 10;
/// How long a network image stays up, in multiples of the refresh rate.
const NETWORK_HOLD_FACTOR: u32 = 2;

/// Folders the scheduler reads frames from.
#[derive(Debug, Clone)]
pub struct Folders {
    /// Root holding one folder per import date.
    pub images_root: PathBuf,
    pub netimage_root: PathBuf,
    pub collection_root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Dated,
    Collection,
    Network,
}

/// What the controller should do after a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Re-read configuration and import new assets.
    Reload,
    /// Put this frame file on the display.
    Show { path: PathBuf, origin: Origin },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Reload,
    NetworkImage,
    NextImage,
}

#[derive(Debug, Clone)]
pub struct PlaybackState {
    pub current_mode: ModeId,
    /// Index of the next image to show in the active list.
    pub cursor: usize,
    pub next_config_check: Instant,
    pub next_image_change: Instant,
    pub next_network_check: Instant,
    pub randomize: bool,
}

pub struct PlaybackScheduler {
    state: PlaybackState,
    folders: Folders,
    reload_interval: Duration,
    max_mode: u8,
    /// Folder and length of the list the cursor currently points into.
    active_list: Option<(PathBuf, usize)>,
    /// Local frames skipped in a row because they failed to display.
    skipped: usize,
    rng: StdRng,
}

impl PlaybackScheduler {
    /// Start in the mode named by `config`.
    ///
    /// The caller is expected to have just loaded `config`, so the first
    /// reload is scheduled one interval out while the first image and the
    /// first network check are due immediately.
    pub fn new(
        folders: Folders,
        reload_interval: Duration,
        max_mode: u8,
        config: &ConfigSnapshot,
        now: Instant,
    ) -> Self {
        let max_mode = max_mode.min(ModeId::MAX_INDEX);
        let mut mode = config.mode();
        if mode.index() > max_mode {
            debug!(%mode, max_mode, "configured mode not reachable; starting at first mode");
            mode = ModeId::default();
        }
        Self {
            state: PlaybackState {
                current_mode: mode,
                cursor: 0,
                next_config_check: later(now, reload_interval),
                next_image_change: now,
                next_network_check: now,
                randomize: config.randomize(),
            },
            folders,
            reload_interval,
            max_mode,
            active_list: None,
            skipped: 0,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Replace the random source, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn mode(&self) -> ModeId {
        self.state.current_mode
    }

    /// Pick up per-snapshot options after a successful reload.
    pub fn apply_config(&mut self, config: &ConfigSnapshot) {
        self.state.randomize = config.randomize();
    }

    /// Cycle to the next mode; its first image becomes due immediately.
    pub fn advance_mode(&mut self, now: Instant) -> ModeId {
        let next = self.state.current_mode.next(self.max_mode);
        info!(from = %self.state.current_mode, to = %next, "mode changed");
        self.state.current_mode = next;
        self.state.cursor = 0;
        self.state.next_image_change = now;
        self.active_list = None;
        next
    }

    /// The frame from the last [`Directive::Show`] reached the display.
    pub fn show_succeeded(&mut self) {
        self.skipped = 0;
    }

    /// The frame from the last [`Directive::Show`] could not be displayed.
    ///
    /// A network frame hands its slot back to the local cycle at once. A
    /// local frame makes the next file due immediately, until every file in
    /// the list has failed in a row; then the normal refresh wait applies.
    pub fn show_failed(&mut self, origin: Origin, now: Instant) {
        match origin {
            Origin::Network => {
                debug!("network frame unusable; resuming local cycle");
                self.state.next_image_change = now;
            }
            Origin::Dated | Origin::Collection => {
                let len = self.active_list.as_ref().map_or(0, |(_, len)| *len);
                if self.skipped + 1 < len {
                    self.skipped += 1;
                    self.state.next_image_change = now;
                } else {
                    debug!(count = len, "no displayable frame in list; waiting for next refresh");
                    self.skipped = 0;
                }
            }
        }
    }

    pub fn tick(&mut self, now: Instant, config: &ConfigSnapshot) -> Option<Directive> {
        let refresh = config.refresh_rate().filter(|rate| !rate.is_zero());
        let action = self.due_action(now, refresh)?;
        debug!(?action, mode = %self.state.current_mode, "tick action due");

        match (action, refresh) {
            (Action::Reload, _) => {
                self.state.next_config_check = later(now, self.reload_interval);
                Some(Directive::Reload)
            }
            (Action::NetworkImage, Some(rate)) => self.show_network(now, rate),
            (Action::NextImage, Some(rate)) => self.show_local(now, rate),
            (_, None) => None,
        }
    }

    fn due_action(&self, now: Instant, refresh: Option<Duration>) -> Option<Action> {
        let image_due = refresh.map(|_| self.state.next_image_change);
        let network_due = match self.state.current_mode {
            ModeId::LocalCycleWithNetworkFallback => {
                image_due.map(|due| due.max(self.state.next_network_check))
            }
            _ => None,
        };

        let agenda = [
            (Some(self.state.next_config_check), Action::Reload),
            (network_due, Action::NetworkImage),
            (image_due, Action::NextImage),
        ];
        agenda
            .into_iter()
            .find_map(|(deadline, action)| deadline.filter(|due| now >= *due).map(|_| action))
    }

    fn show_network(&mut self, now: Instant, rate: Duration) -> Option<Directive> {
        self.state.next_network_check =
            later(now, rate.saturating_mul(NETWORK_INTERVAL_FACTOR));
        match catalog::most_recent_file(&self.folders.netimage_root) {
            Some(path) => {
                self.state.next_image_change = later(now, rate.saturating_mul(NETWORK_HOLD_FACTOR));
                Some(Directive::Show {
                    path,
                    origin: Origin::Network,
                })
            }
            None => {
                info!("no network image available; continuing local cycle");
                self.show_local(now, rate)
            }
        }
    }

    fn show_local(&mut self, now: Instant, rate: Duration) -> Option<Directive> {
        self.state.next_image_change = later(now, rate);

        let (folder, origin) = match self.state.current_mode {
            ModeId::FixedCollection => (self.folders.collection_root.clone(), Origin::Collection),
            ModeId::LocalCycle | ModeId::LocalCycleWithNetworkFallback => {
                (catalog::most_recent_subfolder(&self.folders.images_root)?, Origin::Dated)
            }
        };

        let files = catalog::all_files(&folder);
        if files.is_empty() {
            debug!(folder = %folder.display(), "nothing to display");
            return None;
        }

        let same_list = self
            .active_list
            .as_ref()
            .is_some_and(|(active, len)| *active == folder && *len == files.len());
        if !same_list || self.state.cursor >= files.len() {
            if self.active_list.is_some() {
                debug!(folder = %folder.display(), count = files.len(), "image list changed; cursor reset");
            }
            self.state.cursor = 0;
            self.active_list = Some((folder, files.len()));
        }

        let path = files[self.state.cursor].clone();
        self.state.cursor = if self.state.randomize {
            self.rng.random_range(0..files.len())
        } else {
            (self.state.cursor + 1) % files.len()
        };

        Some(Directive::Show { path, origin })
    }
}

fn later(now: Instant, by: Duration) -> Instant {
    now.checked_add(by)
        .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 3600))
}
