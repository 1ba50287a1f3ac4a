/// In-memory session data: completed rows plus the views the GUI draws from them.

use chrono::{DateTime, Duration, Local};
use crate::channels::CHANNEL_COUNT;

/// Timestamp format used in backup and export files.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One full cycle of readings, channel 1 first.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub time: DateTime<Local>,
    pub temperatures: [Option<f64>; CHANNEL_COUNT],
}

impl Row {
    pub fn active(&self) -> [bool; CHANNEL_COUNT] {
        self.temperatures.map(|t| t.is_some())
    }

    /// Table time column: wall-clock time without sub-seconds.
    pub fn time_of_day(&self) -> String {
        self.time.format("%H:%M:%S").to_string()
    }

    /// Table cell for a 0-based channel index; blank when inactive.
    pub fn cell(&self, idx: usize) -> String {
        self.temperatures
            .get(idx)
            .copied()
            .flatten()
            .map(format_temperature)
            .unwrap_or_default()
    }

    /// Backup/export record: timestamp, then one field per channel.
    pub fn csv_record(&self) -> Vec<String> {
        let mut record = Vec::with_capacity(CHANNEL_COUNT + 1);
        record.push(self.time.format(TIMESTAMP_FORMAT).to_string());
        for t in &self.temperatures {
            record.push(match t {
                Some(v) => format_temperature(*v),
                None => "nan".to_string(),
            });
        }
        record
    }
}

/// Always keep a decimal point so whole degrees read as `24.0`, not `24`.
pub fn format_temperature(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// `DD:HH:MM:SS`, every field zero-padded to two digits.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{:02}:{:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Debug, Default)]
pub struct Dataset {
    rows: Vec<Row>,
    began: Option<DateTime<Local>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the session start; later calls keep the first time.
    pub fn begin(&mut self, now: DateTime<Local>) {
        if self.began.is_none() {
            self.began = Some(now);
        }
    }

    pub fn began(&self) -> Option<DateTime<Local>> {
        self.began
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.began = None;
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn latest(&self) -> Option<&Row> {
        self.rows.last()
    }

    /// Elapsed time since `begin`, zero before the session starts.
    pub fn duration(&self, now: DateTime<Local>) -> Duration {
        match self.began {
            Some(began) => now - began,
            None => Duration::zero(),
        }
    }

    fn origin(&self) -> Option<DateTime<Local>> {
        self.began.or_else(|| self.rows.first().map(|r| r.time))
    }

    fn x_of(origin: DateTime<Local>, row: &Row) -> f64 {
        (row.time - origin).num_milliseconds() as f64 / 1000.0
    }

    /// All valid points of one channel as (seconds since start, value).
    pub fn points(&self, idx: usize) -> Vec<[f64; 2]> {
        let Some(origin) = self.origin() else { return Vec::new(); };
        self.rows
            .iter()
            .filter_map(|row| {
                let value = row.temperatures.get(idx).copied().flatten()?;
                Some([Self::x_of(origin, row), value])
            })
            .collect()
    }

    /// Contiguous runs of valid points; an inactive reading breaks the line.
    pub fn segments(&self, idx: usize) -> Vec<Vec<[f64; 2]>> {
        let Some(origin) = self.origin() else { return Vec::new(); };
        let mut segments = Vec::new();
        let mut current: Vec<[f64; 2]> = Vec::new();
        for row in &self.rows {
            match row.temperatures.get(idx).copied().flatten() {
                Some(value) => current.push([Self::x_of(origin, row), value]),
                None => {
                    if !current.is_empty() {
                        segments.push(std::mem::take(&mut current));
                    }
                }
            }
        }
        if !current.is_empty() {
            segments.push(current);
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32, micros: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 1, h, m, s)
            .unwrap()
            + Duration::microseconds(micros as i64)
    }

    fn row(time: DateTime<Local>, first: Option<f64>) -> Row {
        let mut temperatures = [Some(20.0); CHANNEL_COUNT];
        temperatures[0] = first;
        Row { time, temperatures }
    }

    #[test]
    fn row_views() {
        let mut r = row(at(9, 5, 7, 250_000), Some(23.64));
        r.temperatures[2] = None;
        r.temperatures[3] = Some(24.0);

        assert_eq!(r.time_of_day(), "09:05:07");
        assert_eq!(r.cell(0), "23.64");
        assert_eq!(r.cell(2), "");
        assert_eq!(r.cell(3), "24.0");
        assert_eq!(r.cell(42), "");
        assert!(!r.active()[2]);
        assert!(r.active()[0]);

        let record = r.csv_record();
        assert_eq!(record.len(), CHANNEL_COUNT + 1);
        assert_eq!(record[0], "2024-03-01 09:05:07.250000");
        assert_eq!(record[1], "23.64");
        assert_eq!(record[3], "nan");
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(Duration::zero()), "00:00:00:00");
        assert_eq!(format_duration(Duration::seconds(65)), "00:00:01:05");
        assert_eq!(
            format_duration(Duration::days(2) + Duration::hours(3) + Duration::minutes(4) + Duration::seconds(5)),
            "02:03:04:05"
        );
        assert_eq!(format_duration(Duration::days(123)), "123:00:00:00");
        assert_eq!(format_duration(Duration::seconds(-5)), "00:00:00:00");
    }

    #[test]
    fn begin_keeps_first_start() {
        let mut data = Dataset::new();
        assert_eq!(data.duration(at(10, 0, 0, 0)), Duration::zero());
        data.begin(at(10, 0, 0, 0));
        data.begin(at(11, 0, 0, 0));
        assert_eq!(data.began(), Some(at(10, 0, 0, 0)));
        assert_eq!(data.duration(at(10, 1, 30, 0)), Duration::seconds(90));

        data.push(row(at(10, 0, 1, 0), Some(1.0)));
        data.clear();
        assert!(data.is_empty());
        assert_eq!(data.began(), None);
    }

    #[test]
    fn inactive_readings_split_segments() {
        let mut data = Dataset::new();
        data.begin(at(12, 0, 0, 0));
        data.push(row(at(12, 0, 1, 0), Some(1.0)));
        data.push(row(at(12, 0, 2, 0), Some(2.0)));
        data.push(row(at(12, 0, 3, 0), None));
        data.push(row(at(12, 0, 4, 500_000), Some(4.0)));

        assert_eq!(data.len(), 4);
        assert_eq!(data.points(0), vec![[1.0, 1.0], [2.0, 2.0], [4.5, 4.0]]);
        assert_eq!(
            data.segments(0),
            vec![vec![[1.0, 1.0], [2.0, 2.0]], vec![[4.5, 4.0]]]
        );
        assert_eq!(data.segments(1).len(), 1);
        assert_eq!(data.latest().unwrap().temperatures[0], Some(4.0));
    }

    #[test]
    fn empty_dataset_has_no_series() {
        let data = Dataset::new();
        assert!(data.points(0).is_empty());
        assert!(data.segments(0).is_empty());
        assert!(data.latest().is_none());
    }
}
