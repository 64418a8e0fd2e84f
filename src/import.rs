//! Import of images, configuration and Wi-Fi credentials from removable media.
//!
//! The stick is expected to be auto-mounted as a directory below the
//! configured mount point. Recognised content at the top of the stick:
//!
//! - `images/`: copied into a dated folder and converted to frames;
//! - `config.txt`: replaces the runtime configuration file;
//! - `wifi.txt`: appended to the wpa_supplicant file, then renamed to
//!   `wifi_processed.txt` so it is applied only once.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Configuration;
use crate::power::run_command;
use crate::transform::{self, TransformReport};

const IMAGES_DIR: &str = "images";
const CONFIG_FILE: &str = "config.txt";
const WIFI_FILE: &str = "wifi.txt";
const WIFI_PROCESSED_FILE: &str = "wifi_processed.txt";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// Stick directory the content came from.
    pub device: Option<PathBuf>,
    pub images_copied: usize,
    pub frames: TransformReport,
    pub config_updated: bool,
    pub wifi_applied: bool,
}

#[derive(Debug, Clone)]
pub struct UsbImporter {
    mount_point: PathBuf,
    images_root: PathBuf,
    config_path: PathBuf,
    wifi_config_path: PathBuf,
    wifi_reconfigure_command: String,
}

impl UsbImporter {
    /// `None` when no mount point is configured.
    pub fn from_config(config: &Configuration) -> Option<Self> {
        let mount_point = config.usb_mount_point.as_ref()?;
        Some(Self {
            mount_point: config.resolve(mount_point),
            images_root: config.images_root(),
            config_path: config.config_path(),
            wifi_config_path: config.wifi_config_path.clone(),
            wifi_reconfigure_command: config.wifi_reconfigure_command.clone(),
        })
    }

    pub fn run(&self) -> ImportReport {
        self.run_for_date(Local::now().date_naive())
    }

    /// Import using `date` for the destination folder name.
    ///
    /// Every step is attempted even when an earlier one fails.
    pub fn run_for_date(&self, date: NaiveDate) -> ImportReport {
        let mut report = ImportReport::default();
        let Some(device) = self.find_device() else {
            debug!(mount = %self.mount_point.display(), "no removable media mounted");
            return report;
        };
        info!(device = %device.display(), "removable media connected");

        let images = device.join(IMAGES_DIR);
        if images.is_dir() {
            let dest = self.images_root.join(date.format("%Y-%m-%d").to_string());
            match copy_tree(&images, &dest) {
                Ok(copied) => {
                    info!(count = copied.len(), dest = %dest.display(), "images copied");
                    report.images_copied = copied.len();
                    report.frames = convert_all(&dest, &copied);
                }
                Err(err) => warn!(error = ?err, "failed to copy images"),
            }
        } else {
            debug!("no new images");
        }

        let config = device.join(CONFIG_FILE);
        if config.is_file() {
            match self.install_config(&config) {
                Ok(()) => {
                    info!(path = %self.config_path.display(), "configuration updated from media");
                    report.config_updated = true;
                }
                Err(err) => warn!(error = ?err, "failed to copy configuration"),
            }
        }

        let wifi = device.join(WIFI_FILE);
        if wifi.is_file() {
            match self.apply_wifi(&wifi) {
                Ok(()) => {
                    info!("wifi credentials applied");
                    report.wifi_applied = true;
                }
                Err(err) => warn!(error = ?err, "failed to update wifi settings"),
            }
        }

        report.device = Some(device);
        report
    }

    /// First directory below the mount point, in name order.
    fn find_device(&self) -> Option<PathBuf> {
        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.mount_point)
            .ok()?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();
        dirs.into_iter().next()
    }

    fn install_config(&self, source: &Path) -> Result<()> {
        let dir = match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let contents =
            fs::read(source).with_context(|| format!("failed to read {}", source.display()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.config_path)
            .with_context(|| format!("failed to replace {}", self.config_path.display()))?;
        Ok(())
    }

    fn apply_wifi(&self, source: &Path) -> Result<()> {
        let credentials = fs::read_to_string(source)
            .with_context(|| format!("failed to read {}", source.display()))?;
        let mut wpa = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.wifi_config_path)
            .with_context(|| format!("failed to open {}", self.wifi_config_path.display()))?;
        wpa.write_all(credentials.as_bytes())?;
        wpa.sync_all()?;

        // Appended once; a failed reconfigure must not append again next time.
        let processed = source.with_file_name(WIFI_PROCESSED_FILE);
        fs::rename(source, &processed)
            .with_context(|| format!("failed to mark {} as processed", source.display()))?;

        run_command(&self.wifi_reconfigure_command).context("wifi reconfigure failed")?;
        Ok(())
    }
}

/// Copy everything below `src` into `dest`, returning the copied files.
fn copy_tree(src: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dest).with_context(|| format!("failed to create {}", dest.display()))?;
    let mut copied = Vec::new();
    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("failed to copy {}", entry.path().display()))?;
            copied.push(target);
        }
    }
    Ok(copied)
}

/// Convert the copied files, folder by folder.
fn convert_all(dest: &Path, copied: &[PathBuf]) -> TransformReport {
    let mut folders: Vec<&Path> = copied.iter().filter_map(|path| path.parent()).collect();
    folders.push(dest);
    folders.sort();
    folders.dedup();

    let mut report = TransformReport::default();
    for folder in folders {
        match transform::transform_folder(folder) {
            Ok(partial) => {
                report.converted.extend(partial.converted);
                report.failed.extend(partial.failed);
            }
            Err(err) => warn!(folder = %folder.display(), error = %err, "failed to convert folder"),
        }
    }
    report
}
