/// "Save Data": write the whole session to a user-chosen CSV file.

use std::fs::File;
use std::path::Path;
use anyhow::{Context, Result};

use crate::dataset::Row;

pub const CSV_FILTER_NAME: &str = "Comma-separated values";
pub const CSV_EXTENSIONS: &[&str] = &["csv"];

/// `Time` followed by the current channel names.
pub fn header_record(channel_names: &[String]) -> Vec<String> {
    std::iter::once("Time".to_string())
        .chain(channel_names.iter().cloned())
        .collect()
}

pub fn save_all(path: &Path, channel_names: &[String], rows: &[Row]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create data file {:?}", path))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(header_record(channel_names))?;
    for row in rows {
        writer.write_record(row.csv_record())?;
    }
    writer.flush()?;
    log::info!(target: "export", "Saved {} rows to {:?}", rows.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChannelSet, CHANNEL_COUNT};
    use chrono::{Duration, Local, TimeZone};

    #[test]
    fn header_uses_current_names() {
        let mut channels = ChannelSet::default();
        channels.rename(2, "Probe B").unwrap();
        let header = header_record(&channels.names());
        assert_eq!(header.len(), CHANNEL_COUNT + 1);
        assert_eq!(header[0], "Time");
        assert_eq!(header[2], "Probe B");
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let start = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let rows: Vec<Row> = (0..3)
            .map(|i| Row {
                time: start + Duration::seconds(i),
                temperatures: [Some(20.0 + i as f64); CHANNEL_COUNT],
            })
            .collect();

        save_all(&path, &ChannelSet::default().names(), &rows).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "Time");
        assert_eq!(&headers[8], "Ch. 8");
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(&records[2][0], "2024-01-02 03:04:07.000000");
        assert_eq!(&records[2][1], "22.0");
    }
}
