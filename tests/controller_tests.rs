use eink_frame::button::{InputLine, Level};
use eink_frame::config::Configuration;
use eink_frame::controller::{FrameController, Hardware, Outcome};
use eink_frame::display::DisplaySink;
use eink_frame::frame::Frame;
use eink_frame::power::PowerControl;
use eink_frame::status::StatusRenderer;
use eink_frame::{Error, ModeId, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

type Log = Arc<Mutex<Vec<String>>>;

fn record(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

struct FakeDisplay {
    log: Log,
    frames: Vec<Frame>,
}

impl DisplaySink for FakeDisplay {
    fn init(&mut self) -> Result<()> {
        record(&self.log, "display:init");
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        record(&self.log, "display:clear");
        Ok(())
    }

    fn set_fast_refresh(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    fn display(&mut self, frame: Frame) -> Result<()> {
        record(&self.log, "display:frame");
        self.frames.push(frame);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        record(&self.log, "display:shutdown");
        Ok(())
    }
}

/// Button whose level the test flips through a shared cell.
///
/// While `glitches` is non-zero each read fails with a transient IO error.
struct FakeButton {
    log: Log,
    level: Arc<Mutex<Option<Level>>>,
    glitches: Arc<Mutex<u32>>,
}

impl InputLine for FakeButton {
    fn read_level(&mut self) -> Result<Level> {
        let mut glitches = self.glitches.lock().unwrap();
        if *glitches > 0 {
            *glitches -= 1;
            return Err(Error::Io(io::Error::other("bounce")));
        }
        (*self.level.lock().unwrap()).ok_or_else(|| Error::Hardware("line vanished".into()))
    }

    fn release(&mut self) -> Result<()> {
        record(&self.log, "input:release");
        Ok(())
    }
}

struct FakePower {
    log: Log,
    fail: bool,
}

impl PowerControl for FakePower {
    fn power_off(&mut self) -> anyhow::Result<()> {
        record(&self.log, "power:off");
        if self.fail {
            anyhow::bail!("shutdown refused");
        }
        Ok(())
    }
}

struct Rig {
    _tmp: TempDir,
    data: PathBuf,
    log: Log,
    level: Arc<Mutex<Option<Level>>>,
    glitches: Arc<Mutex<u32>>,
    controller: FrameController<FakeDisplay, FakeButton, FakePower>,
}

fn write_frame(path: &Path, black: (u32, u32)) -> Frame {
    let mut frame = Frame::blank();
    frame.set_pixel(black.0, black.1, false);
    fs::write(path, frame.to_bmp()).unwrap();
    frame
}

fn rig(config_json: &str, power_fails: bool) -> (Rig, Vec<Frame>) {
    rig_with(config_json, power_fails, |_| {})
}

fn rig_with(
    config_json: &str,
    power_fails: bool,
    tweak: impl FnOnce(&mut Configuration),
) -> (Rig, Vec<Frame>) {
    let tmp = tempdir().unwrap();
    let data = tmp.path().to_path_buf();
    let dated = data.join("images").join("2024-05-01");
    fs::create_dir_all(&dated).unwrap();
    fs::create_dir_all(data.join("us")).unwrap();
    let frames = vec![
        write_frame(&dated.join("a.bmp"), (1, 1)),
        write_frame(&dated.join("b.bmp"), (2, 2)),
    ];
    fs::write(data.join("config.txt"), config_json).unwrap();

    let mut settings = Configuration {
        data_dir: data.clone(),
        banner_dwell: Duration::ZERO,
        startup_info_dwell: Duration::ZERO,
        tick_interval: Duration::from_millis(1),
        ..Configuration::default()
    };
    tweak(&mut settings);

    let log = Log::default();
    let level = Arc::new(Mutex::new(Some(Level::High)));
    let glitches = Arc::new(Mutex::new(0));
    let hardware = Hardware {
        display: FakeDisplay {
            log: log.clone(),
            frames: Vec::new(),
        },
        input: FakeButton {
            log: log.clone(),
            level: level.clone(),
            glitches: glitches.clone(),
        },
        power: FakePower {
            log: log.clone(),
            fail: power_fails,
        },
    };
    let controller = FrameController::start(
        settings,
        hardware,
        StatusRenderer::with_font(None, "lo"),
        CancellationToken::new(),
    )
    .unwrap();

    (
        Rig {
            _tmp: tmp,
            data,
            log,
            level,
            glitches,
            controller,
        },
        frames,
    )
}

impl Rig {
    fn press(&self, level: Level) {
        *self.level.lock().unwrap() = Some(level);
    }
}

#[test]
fn startup_shows_info_then_first_image() {
    let (mut rig, frames) = rig(r#"{"mode": 0, "refresh_rate": 60}"#, false);
    assert_eq!(rig.controller.mode(), ModeId::LocalCycle);
    // Startup info screen, blank without a font.
    assert_eq!(rig.controller.display().frames, vec![Frame::blank()]);

    let now = Instant::now();
    assert_eq!(rig.controller.step(now).unwrap(), None);
    assert_eq!(rig.controller.display().frames.last(), Some(&frames[0]));

    // Nothing new until the refresh rate has passed.
    rig.controller.step(now + Duration::from_secs(1)).unwrap();
    assert_eq!(rig.controller.display().frames.len(), 2);

    rig.controller.step(now + Duration::from_secs(61)).unwrap();
    assert_eq!(rig.controller.display().frames.last(), Some(&frames[1]));
}

#[test]
fn initial_mode_comes_from_config() {
    let (rig, _) = rig(r#"{"mode": 2}"#, false);
    assert_eq!(rig.controller.mode(), ModeId::FixedCollection);
    assert_eq!(rig.controller.config().mode(), ModeId::FixedCollection);
}

#[test]
fn short_press_advances_mode_and_shows_banner() {
    let (mut rig, frames) = rig(r#"{"mode": 2, "refresh_rate": 60}"#, false);
    let now = Instant::now();
    rig.controller.step(now).unwrap();
    let shown = rig.controller.display().frames.len();

    rig.press(Level::Low);
    rig.controller.step(now + Duration::from_millis(100)).unwrap();
    rig.press(Level::High);
    let released = now + Duration::from_millis(300);
    assert_eq!(rig.controller.step(released).unwrap(), None);

    assert_eq!(rig.controller.mode(), ModeId::LocalCycle);
    // Banner, then the first image of the new mode in the same tick.
    let after = &rig.controller.display().frames[shown..];
    assert_eq!(after, &[Frame::blank(), frames[0].clone()]);
}

#[test]
fn long_hold_releases_hardware_then_powers_off() {
    let (mut rig, _) = rig(r#"{"refresh_rate": 60}"#, false);
    let now = Instant::now();
    rig.press(Level::Low);
    assert_eq!(rig.controller.step(now).unwrap(), None);
    assert_eq!(
        rig.controller.step(now + Duration::from_secs(1)).unwrap(),
        None
    );
    let outcome = rig
        .controller
        .step(now + Duration::from_secs(3))
        .unwrap()
        .unwrap();
    assert_eq!(outcome, Outcome::ShutdownRequested);

    // A completed hold does not also advance the mode.
    assert_eq!(rig.controller.mode(), ModeId::LocalCycle);

    let log = rig.log.clone();
    assert_eq!(rig.controller.finish(outcome).unwrap(), outcome);

    let entries = log.lock().unwrap().clone();
    let tail = &entries[entries.len() - 3..];
    assert_eq!(tail, ["display:shutdown", "input:release", "power:off"]);
}

#[test]
fn failing_power_off_still_releases_hardware() {
    let (rig, _) = rig(r#"{}"#, true);
    let Rig {
        controller, log, ..
    } = rig;

    let err = controller.finish(Outcome::ShutdownRequested).unwrap_err();
    assert!(err.to_string().contains("shutdown refused"));
    let entries = log.lock().unwrap().clone();
    assert!(entries.contains(&"display:shutdown".to_string()));
    assert!(entries.contains(&"input:release".to_string()));
}

#[test]
fn interrupt_releases_without_power_off() {
    let (rig, _) = rig(r#"{}"#, false);
    let log = rig.log.clone();
    assert_eq!(
        rig.controller.finish(Outcome::Interrupted).unwrap(),
        Outcome::Interrupted
    );
    let entries = log.lock().unwrap().clone();
    assert!(entries.contains(&"display:shutdown".to_string()));
    assert!(!entries.contains(&"power:off".to_string()));
}

#[test]
fn cancelled_run_stops_and_releases() {
    let tmp = tempdir().unwrap();
    let settings = Configuration {
        data_dir: tmp.path().to_path_buf(),
        startup_info_dwell: Duration::ZERO,
        tick_interval: Duration::from_millis(1),
        ..Configuration::default()
    };
    let log = Log::default();
    let hardware = Hardware {
        display: FakeDisplay {
            log: log.clone(),
            frames: Vec::new(),
        },
        input: FakeButton {
            log: log.clone(),
            level: Arc::new(Mutex::new(Some(Level::High))),
            glitches: Arc::default(),
        },
        power: FakePower {
            log: log.clone(),
            fail: false,
        },
    };
    let cancel = CancellationToken::new();
    let controller = FrameController::start(
        settings,
        hardware,
        StatusRenderer::with_font(None, "lo"),
        cancel.clone(),
    )
    .unwrap();

    cancel.cancel();
    assert_eq!(controller.run().unwrap(), Outcome::Interrupted);
    assert!(!log.lock().unwrap().contains(&"power:off".to_string()));
}

#[test]
fn input_fault_is_fatal_and_releases_display() {
    let (rig, _) = rig(r#"{"refresh_rate": 60}"#, false);
    rig.level.lock().unwrap().take();
    let Rig {
        controller, log, ..
    } = rig;

    let err = controller.run().unwrap_err();
    let fault = err.downcast_ref::<Error>().unwrap();
    assert!(fault.is_fatal());

    let entries = log.lock().unwrap().clone();
    assert!(entries.contains(&"display:shutdown".to_string()));
    assert!(entries.contains(&"input:release".to_string()));
    assert!(!entries.contains(&"power:off".to_string()));
}

#[test]
fn unusable_network_frame_falls_back_to_local_cycle() {
    let (mut rig, frames) = rig(r#"{"mode": 1, "refresh_rate": 60}"#, false);
    let netimage = rig.data.join("netimage");
    fs::create_dir_all(&netimage).unwrap();
    fs::write(netimage.join("remote.bmp"), "<html>not an image</html>").unwrap();

    let now = Instant::now();
    rig.controller.step(now).unwrap();
    assert_eq!(rig.controller.display().frames.len(), 1);

    let next = now + Duration::from_millis(10);
    rig.controller.step(next).unwrap();
    assert_eq!(rig.controller.display().frames.last(), Some(&frames[0]));
    assert_eq!(
        rig.controller.scheduler().state().next_image_change,
        next + Duration::from_secs(60)
    );
}

#[test]
fn reload_picks_up_new_config_but_keeps_selected_mode() {
    let (mut rig, _) = rig_with(r#"{"mode": 0, "refresh_rate": 60}"#, false, |settings| {
        settings.reload_interval = Duration::from_secs(10);
    });
    let now = Instant::now();
    rig.controller.step(now).unwrap();
    rig.press(Level::Low);
    rig.controller.step(now + Duration::from_millis(100)).unwrap();
    rig.press(Level::High);
    rig.controller.step(now + Duration::from_millis(300)).unwrap();
    assert_eq!(rig.controller.mode(), ModeId::LocalCycleWithNetworkFallback);

    let config_path = rig.data.join("config.txt");
    fs::write(&config_path, r#"{"mode": 2, "refresh_rate": 5, "random": true}"#).unwrap();
    rig.controller.step(now + Duration::from_secs(11)).unwrap();

    let reloaded = rig.controller.config();
    assert_eq!(reloaded.refresh_rate(), Some(Duration::from_secs(5)));
    assert!(rig.controller.scheduler().state().randomize);
    assert_eq!(rig.controller.mode(), ModeId::LocalCycleWithNetworkFallback);

    // A corrupt file keeps the previous snapshot.
    fs::write(&config_path, "{ not json").unwrap();
    rig.controller.step(now + Duration::from_secs(22)).unwrap();
    assert_eq!(rig.controller.config(), reloaded);
    assert!(rig.controller.scheduler().state().randomize);
}

#[test]
fn transient_input_errors_do_not_stop_the_loop() {
    let (rig, _) = rig_with(r#"{}"#, false, |settings| {
        settings.hold_to_shutdown = Duration::from_millis(20);
    });
    *rig.glitches.lock().unwrap() = 3;
    rig.press(Level::Low);
    let Rig {
        controller,
        log,
        glitches,
        ..
    } = rig;

    assert_eq!(controller.run().unwrap(), Outcome::ShutdownRequested);
    assert_eq!(*glitches.lock().unwrap(), 0);
    assert!(log.lock().unwrap().contains(&"power:off".to_string()));
}
