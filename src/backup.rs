/// Crash-safety backup: every completed row is appended to a plain CSV file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

use crate::dataset::Row;
use crate::export::header_record;

pub const DEFAULT_BACKUP_FILE: &str = "backup_data.csv";

#[derive(Debug, Clone)]
pub struct BackupFile {
    path: PathBuf,
}

impl BackupFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate and write the `Time,<names>` header.
    pub fn start(&self, channel_names: &[String]) -> Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create backup file {:?}", self.path))?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(header_record(channel_names))?;
        writer.flush()?;
        log::info!(target: "backup", "Backup file started at {:?}", self.path);
        Ok(())
    }

    pub fn append(&self, row: &Row) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open backup file {:?}", self.path))?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(row.csv_record())?;
        writer.flush()?;
        Ok(())
    }

    /// Empty the file.
    pub fn clear(&self) -> Result<()> {
        File::create(&self.path)
            .with_context(|| format!("Failed to truncate backup file {:?}", self.path))?;
        log::info!(target: "backup", "Backup file cleared");
        Ok(())
    }
}
