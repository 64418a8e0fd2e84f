//! Binary entrypoint for the e-ink frame.
//!
//! Wires the real hardware into the library's controller; no local modules here.

use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use eink_frame::button::GpioLine;
use eink_frame::config::Configuration;
use eink_frame::controller::{FrameController, Hardware, Outcome};
use eink_frame::display::SpoolDisplay;
use eink_frame::power::ShellPower;
use eink_frame::status::StatusRenderer;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "eink-frame", about = "Button-driven e-ink picture frame")]
struct Cli {
    /// Path to the YAML device settings
    #[arg(short, long, value_name = "FILE", default_value = "settings.yaml")]
    settings: PathBuf,

    /// Skip importing from removable media
    #[arg(long)]
    no_import: bool,

    /// Run startup and a single tick, then exit without powering off
    #[arg(long)]
    once: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("eink_frame={level}").parse()?)
        .add_directive(format!("config_model={level}").parse()?);
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM.
///
/// The controller stays on the main thread; only signal delivery needs a runtime.
fn spawn_signal_listener(token: CancellationToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            runtime.block_on(async move {
                if let Err(err) = wait_for_signal().await {
                    warn!(error = %err, "signal listener failed");
                    return;
                }
                info!("signal received; stopping");
                token.cancel();
            });
        })
        .context("failed to spawn signal listener")?;
    Ok(())
}

async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = terminate.recv() => Ok(()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut settings = Configuration::from_yaml_file(&cli.settings)
        .with_context(|| format!("loading settings from {}", cli.settings.display()))?
        .validated()
        .context("validating settings")?;
    if cli.no_import {
        settings.usb_mount_point = None;
    }
    info!(
        data_dir = %settings.data_dir.display(),
        tick = %humantime::format_duration(settings.tick_interval),
        reload = %humantime::format_duration(settings.reload_interval),
        "settings loaded"
    );

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone())?;

    let hardware = Hardware {
        display: SpoolDisplay::new(&settings.display.spool_path),
        input: GpioLine::open(&settings.button.chip, settings.button.line)?,
        power: ShellPower::new(settings.shutdown_command.clone()),
    };
    let status = StatusRenderer::new(settings.network_interface.clone());
    let mut controller = FrameController::start(settings, hardware, status, cancel)
        .context("failed to start frame controller")?;

    let outcome = if cli.once {
        match controller.step(Instant::now()) {
            Ok(outcome) => controller.finish(outcome.unwrap_or(Outcome::Interrupted))?,
            Err(err) => {
                controller.finish(Outcome::Interrupted)?;
                return Err(err).context("hardware fault during tick");
            }
        }
    } else {
        controller.run()?
    };
    info!(?outcome, "frame controller stopped");
    Ok(())
}
