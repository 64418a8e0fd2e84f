//! OS-level actions: powering the device off and other shell hooks.

use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::info;

/// Turns the device off once the controller has released its hardware.
pub trait PowerControl {
    fn power_off(&mut self) -> Result<()>;
}

/// Runs the configured shutdown command through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellPower {
    command: String,
}

impl ShellPower {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl PowerControl for ShellPower {
    fn power_off(&mut self) -> Result<()> {
        info!(command = %self.command, "powering off");
        run_command(&self.command).context("power-off command failed")
    }
}

pub(crate) fn run_command(command: &str) -> Result<()> {
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .status()
        .with_context(|| format!("failed to spawn shell for command: {command}"))?;

    if status.success() {
        Ok(())
    } else {
        Err(anyhow!(
            "command exited with status {}: {command}",
            status.code().unwrap_or(-1)
        ))
    }
}
