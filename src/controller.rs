//! Top-level poll loop.
//!
//! All mutable state lives here and is driven from a single thread: each
//! tick samples the button, lets the scheduler decide, and pushes at most one
//! frame to the display. Routine failures are logged and absorbed where they
//! happen; only hardware faults leave the loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use config_model::{ConfigSnapshot, ModeId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::button::{ButtonEvent, ButtonMonitor, Durations, InputLine};
use crate::catalog;
use crate::config::Configuration;
use crate::config_store::ConfigStore;
use crate::display::DisplaySink;
use crate::error::Result;
use crate::frame::Frame;
use crate::import::UsbImporter;
use crate::netimage::NetImageFetcher;
use crate::power::PowerControl;
use crate::schedule::{Directive, Folders, PlaybackScheduler};
use crate::status::StatusRenderer;
use crate::transform;

/// Devices the controller owns for its whole lifetime.
pub struct Hardware<D, I, P> {
    pub display: D,
    pub input: I,
    pub power: P,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Interrupted by a signal; the device stays powered.
    Interrupted,
    /// The button was held; the device powers off.
    ShutdownRequested,
}

pub struct FrameController<D, I, P> {
    settings: Configuration,
    hardware: Hardware<D, I, P>,
    reloader: Reloader,
    config: Arc<ConfigSnapshot>,
    scheduler: PlaybackScheduler,
    button: ButtonMonitor,
    status: StatusRenderer,
    cancel: CancellationToken,
}

impl<D, I, P> FrameController<D, I, P>
where
    D: DisplaySink,
    I: InputLine,
    P: PowerControl,
{
    /// Bring up the display, load configuration and show the startup screen.
    pub fn start(
        settings: Configuration,
        mut hardware: Hardware<D, I, P>,
        status: StatusRenderer,
        cancel: CancellationToken,
    ) -> Result<Self> {
        hardware.display.init()?;
        let initial_level = match hardware
            .display
            .clear()
            .and_then(|()| hardware.input.read_level())
        {
            Ok(level) => level,
            Err(err) => {
                release(&mut hardware);
                return Err(err);
            }
        };
        let button = ButtonMonitor::new(
            Durations {
                debounce: settings.debounce,
                hold_to_shutdown: settings.hold_to_shutdown,
            },
            initial_level,
        );

        let mut reloader = Reloader::new(&settings);
        let config = reloader.reload();

        let folders = Folders {
            images_root: settings.images_root(),
            netimage_root: settings.netimage_root(),
            collection_root: settings.collection_root(),
        };
        let scheduler = PlaybackScheduler::new(
            folders,
            settings.reload_interval,
            settings.max_mode,
            &config,
            Instant::now(),
        );
        info!(mode = %scheduler.mode(), "playback starting");

        let mut controller = Self {
            settings,
            hardware,
            reloader,
            config,
            scheduler,
            button,
            status,
            cancel,
        };
        let info = controller.status.startup_info(&controller.config);
        if let Err(err) = controller.show_status(info, controller.settings.startup_info_dwell) {
            release(&mut controller.hardware);
            return Err(err);
        }
        Ok(controller)
    }

    pub fn mode(&self) -> ModeId {
        self.scheduler.mode()
    }

    pub fn config(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.config)
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn display(&self) -> &D {
        &self.hardware.display
    }

    /// Poll until interrupted or shutdown is requested, then release the
    /// hardware and, after a shutdown request, power off.
    pub fn run(mut self) -> anyhow::Result<Outcome> {
        let outcome = loop {
            if self.cancel.is_cancelled() {
                info!("interrupted");
                break Ok(Outcome::Interrupted);
            }
            match self.step(Instant::now()) {
                Ok(Some(outcome)) => break Ok(outcome),
                Ok(None) => {}
                Err(err) if !err.is_fatal() => warn!(error = %err, "tick failed; continuing"),
                Err(err) => break Err(err),
            }
            thread::sleep(self.settings.tick_interval);
        };

        match outcome {
            Ok(outcome) => self.finish(outcome),
            Err(err) => {
                warn!(error = %err, "hardware fault; stopping");
                release(&mut self.hardware);
                Err(err).context("frame controller stopped on a hardware fault")
            }
        }
    }

    /// One tick at `now`.
    ///
    /// Returns the outcome once the loop should stop. Routine failures are
    /// absorbed here; [`run`](Self::run) stops only on fatal errors.
    pub fn step(&mut self, now: Instant) -> Result<Option<Outcome>> {
        let level = self.hardware.input.read_level()?;
        match self.button.sample(level, now) {
            Some(ButtonEvent::ShutdownRequested) => return Ok(Some(Outcome::ShutdownRequested)),
            Some(ButtonEvent::ModeAdvance) => {
                let mode = self.scheduler.advance_mode(now);
                let banner = self.status.mode_banner(mode);
                self.show_status(banner, self.settings.banner_dwell)?;
            }
            None => {}
        }

        match self.scheduler.tick(now, &self.config) {
            Some(Directive::Reload) => {
                self.config = self.reloader.reload();
                self.scheduler.apply_config(&self.config);
            }
            Some(Directive::Show { path, origin }) => match transform::load_frame(&path) {
                Ok(frame) => {
                    self.hardware.display.set_fast_refresh(false)?;
                    self.hardware.display.display(frame)?;
                    self.scheduler.show_succeeded();
                    info!(path = %path.display(), ?origin, "image displayed");
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "cannot display image");
                    self.scheduler.show_failed(origin, now);
                }
            },
            None => {}
        }
        Ok(None)
    }

    /// Release the hardware and, for a shutdown request, power off.
    ///
    /// Release always happens first, so a failing power-off still leaves the
    /// display and input line released.
    pub fn finish(mut self, outcome: Outcome) -> anyhow::Result<Outcome> {
        release(&mut self.hardware);
        if outcome == Outcome::ShutdownRequested {
            self.hardware.power.power_off()?;
        }
        Ok(outcome)
    }

    fn show_status(&mut self, frame: Frame, dwell: Duration) -> Result<()> {
        self.hardware.display.set_fast_refresh(true)?;
        self.hardware.display.display(frame)?;
        self.pause(dwell);
        Ok(())
    }

    /// Sleep for `duration`, waking early on cancellation.
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.cancel.is_cancelled() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            thread::sleep(left.min(self.settings.tick_interval));
        }
    }
}

fn release<D: DisplaySink, I: InputLine, P>(hardware: &mut Hardware<D, I, P>) {
    if let Err(err) = hardware.display.shutdown() {
        warn!(error = %err, "failed to release display");
    }
    if let Err(err) = hardware.input.release() {
        warn!(error = %err, "failed to release button line");
    }
    debug!("hardware released");
}

/// Everything a configuration reload touches.
struct Reloader {
    store: ConfigStore,
    importer: Option<UsbImporter>,
    fetcher: Option<NetImageFetcher>,
    images_root: PathBuf,
    collection_root: PathBuf,
}

impl Reloader {
    fn new(settings: &Configuration) -> Self {
        let fetcher = match NetImageFetcher::new(settings.netimage_root(), settings.fetch_timeout) {
            Ok(fetcher) => Some(fetcher),
            Err(err) => {
                warn!(error = %err, "network image fetch disabled");
                None
            }
        };
        Self {
            store: ConfigStore::new(settings.config_path()),
            importer: UsbImporter::from_config(settings),
            fetcher,
            images_root: settings.images_root(),
            collection_root: settings.collection_root(),
        }
    }

    /// Import new media, re-read the configuration and refresh derived
    /// assets. Returns the snapshot now in effect.
    fn reload(&mut self) -> Arc<ConfigSnapshot> {
        if let Some(importer) = &self.importer {
            let report = importer.run();
            if report.device.is_some() {
                info!(
                    images = report.images_copied,
                    converted = report.frames.converted.len(),
                    failed = report.frames.failed.len(),
                    config = report.config_updated,
                    wifi = report.wifi_applied,
                    "import finished"
                );
            }
        }

        if let Err(err) = self.store.reload() {
            warn!(error = %err, "keeping previous configuration");
        }
        let config = self.store.current();

        // Pick up anything dropped into the folders since the last reload.
        let pending = catalog::most_recent_subfolder(&self.images_root)
            .into_iter()
            .chain(Some(self.collection_root.clone()));
        for folder in pending {
            if let Err(err) = transform::transform_folder(&folder) {
                warn!(folder = %folder.display(), error = %err, "failed to convert folder");
            }
        }

        if let Some(fetcher) = &self.fetcher
            && let Some(url) = config.remote_image_url()
            && let Err(err) = fetcher.fetch(url)
        {
            warn!(%url, error = %err, "network image unavailable; using local images");
        }
        config
    }
}
