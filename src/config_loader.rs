/// Logger configuration from `temp_logger.yaml`.
///
/// Layout:
/// ```yaml
/// default:
///   port: /dev/ttyACM0
///   baud: 9600
/// hosts:
///   lab-pc-2:
///     port: /dev/ttyUSB0
/// ```
/// Keys under `hosts.<hostname>` override `default`, which overrides the
/// built-in defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::backup::DEFAULT_BACKUP_FILE;
use crate::channels::DEFAULT_CHANNEL_NAMES_FILE;
use crate::protocol::DISCONNECTED_SENTINEL;

pub const CONFIG_FILE_NAME: &str = "temp_logger.yaml";

#[derive(Debug, Clone, PartialEq)]
pub struct LoggerSettings {
    pub port: String,
    pub baud: u32,
    pub data_bits: u8,
    pub read_timeout_ms: u64,
    pub backup_path: PathBuf,
    pub channel_names_path: PathBuf,
    pub disconnected_sentinel: f64,
    pub channel_names: Option<Vec<String>>,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            port: if cfg!(windows) { "COM3".into() } else { "/dev/ttyACM0".into() },
            baud: 9600,
            data_bits: 8,
            read_timeout_ms: 250,
            backup_path: PathBuf::from(DEFAULT_BACKUP_FILE),
            channel_names_path: PathBuf::from(DEFAULT_CHANNEL_NAMES_FILE),
            disconnected_sentinel: DISCONNECTED_SENTINEL,
            channel_names: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsBlock {
    port: Option<String>,
    baud: Option<u32>,
    data_bits: Option<u8>,
    read_timeout_ms: Option<u64>,
    backup_path: Option<PathBuf>,
    channel_names_path: Option<PathBuf>,
    disconnected_sentinel: Option<f64>,
    channel_names: Option<Vec<String>>,
}

impl SettingsBlock {
    fn apply(self, settings: &mut LoggerSettings) {
        if let Some(v) = self.port { settings.port = v; }
        if let Some(v) = self.baud { settings.baud = v; }
        if let Some(v) = self.data_bits { settings.data_bits = v; }
        if let Some(v) = self.read_timeout_ms { settings.read_timeout_ms = v; }
        if let Some(v) = self.backup_path { settings.backup_path = v; }
        if let Some(v) = self.channel_names_path { settings.channel_names_path = v; }
        if let Some(v) = self.disconnected_sentinel { settings.disconnected_sentinel = v; }
        if let Some(v) = self.channel_names { settings.channel_names = Some(v); }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    default: Option<SettingsBlock>,
    hosts: Option<BTreeMap<String, SettingsBlock>>,
}

/// `temp_logger.yaml` next to Cargo.toml.
pub fn default_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(CONFIG_FILE_NAME)
}

/// Resolve settings for `hostname` from YAML text.
pub fn parse_logger_settings(yaml: &str, hostname: &str) -> Result<LoggerSettings> {
    let cfg: ConfigFile = if yaml.trim().is_empty() {
        ConfigFile::default()
    } else {
        serde_yaml::from_str(yaml)?
    };
    resolve(cfg, hostname)
}

fn resolve(cfg: ConfigFile, hostname: &str) -> Result<LoggerSettings> {
    let mut settings = LoggerSettings::default();
    if let Some(block) = cfg.default {
        block.apply(&mut settings);
    }
    if let Some(block) = cfg.hosts.and_then(|mut hosts| hosts.remove(hostname)) {
        log::info!(target: "config_loader", "Applying host overrides for '{}'", hostname);
        block.apply(&mut settings);
    }
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &LoggerSettings) -> Result<()> {
    if settings.baud == 0 {
        return Err(anyhow!("baud must be positive"));
    }
    if !(5..=8).contains(&settings.data_bits) {
        return Err(anyhow!("data_bits must be 5..=8, got {}", settings.data_bits));
    }
    if settings.read_timeout_ms == 0 {
        return Err(anyhow!("read_timeout_ms must be positive"));
    }
    Ok(())
}

/// Load settings from `path`. A missing file means built-in defaults; a file
/// that exists but does not parse is an error.
pub fn load_logger_settings(path: &Path, hostname: &str) -> Result<LoggerSettings> {
    let yaml = match std::fs::read_to_string(path) {
        Ok(yaml) => yaml,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!(target: "config_loader", "No config at {:?}; using defaults", path);
            return Ok(LoggerSettings::default());
        }
        Err(e) => return Err(anyhow!("Failed to read {:?}: {}", path, e)),
    };
    let settings = parse_logger_settings(&yaml, hostname)
        .map_err(|e| anyhow!("Invalid config {:?}: {}", path, e))?;
    log::info!(
        target: "config_loader",
        "LoggerSettings: port={}, baud={}, backup={:?} (hostname={})",
        settings.port,
        settings.baud,
        settings.backup_path,
        hostname
    );
    Ok(settings)
}
