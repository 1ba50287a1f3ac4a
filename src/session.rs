/// Logging session: the Connect/Start/Stop/Reset state machine and the data
/// it owns. The GUI only renders this and forwards button presses.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Local};

use crate::arduino_connection::LineSource;
use crate::backup::BackupFile;
use crate::channels::ChannelSet;
use crate::collector::{Collector, CollectorEvent};
use crate::dataset::Dataset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// Port open, collector idle, no data yet.
    Connected,
    Collecting,
    /// Collector idle, data kept.
    Stopped,
}

impl SessionState {
    pub fn can_connect(self) -> bool {
        self == SessionState::Disconnected
    }

    pub fn can_start(self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Stopped)
    }

    pub fn can_stop(self) -> bool {
        self == SessionState::Collecting
    }

    pub fn can_reset(self) -> bool {
        self == SessionState::Stopped
    }

    pub fn status_message(self) -> &'static str {
        match self {
            SessionState::Disconnected => "Connect to a port...",
            SessionState::Connected => "Connected.",
            SessionState::Collecting => "Collecting",
            SessionState::Stopped => "Stopped",
        }
    }
}

/// Result of draining the collector once.
#[derive(Debug, Default, PartialEq)]
pub struct PollOutcome {
    pub rows_added: usize,
    pub rows_discarded: usize,
    pub errors: Vec<String>,
}

#[derive(Debug)]
pub struct Session {
    state: SessionState,
    pub channels: ChannelSet,
    dataset: Dataset,
    backup: BackupFile,
    collector: Option<Collector>,
    sentinel: f64,
    stopped_at: Option<DateTime<Local>>,
}

impl Session {
    pub fn new(channels: ChannelSet, backup: BackupFile, sentinel: f64) -> Self {
        Self {
            state: SessionState::Disconnected,
            channels,
            dataset: Dataset::new(),
            backup,
            collector: None,
            sentinel,
            stopped_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn backup(&self) -> &BackupFile {
        &self.backup
    }

    /// Hand an opened line source to a new collector thread.
    pub fn connect<S: LineSource + 'static>(&mut self, source: S) -> Result<()> {
        if !self.state.can_connect() {
            return Err(anyhow!("Already connected"));
        }
        self.collector = Some(Collector::spawn(source, self.sentinel)?);
        self.state = SessionState::Connected;
        log::info!(target: "session", "Connected");
        Ok(())
    }

    /// The first start after Connect or Reset stamps the session begin time
    /// and starts a fresh backup file; a restart after Stop keeps both.
    pub fn start(&mut self, now: DateTime<Local>) -> Result<()> {
        if !self.state.can_start() {
            return Err(anyhow!("Cannot start while {:?}", self.state));
        }
        let collector = self.collector.as_ref().ok_or_else(|| anyhow!("No collector"))?;
        if self.dataset.began().is_none() {
            self.backup.start(&self.channels.names())?;
            self.dataset.begin(now);
        }
        collector.start();
        self.state = SessionState::Collecting;
        Ok(())
    }

    pub fn stop(&mut self, now: DateTime<Local>) -> Result<()> {
        if !self.state.can_stop() {
            return Err(anyhow!("Cannot stop while {:?}", self.state));
        }
        if let Some(collector) = self.collector.as_ref() {
            collector.stop();
        }
        self.stopped_at = Some(now);
        self.state = SessionState::Stopped;
        Ok(())
    }

    /// Running duration: live while collecting, otherwise frozen at the last
    /// row, or at the stop time if no row arrived.
    pub fn elapsed(&self, now: DateTime<Local>) -> Duration {
        if self.state == SessionState::Collecting {
            return self.dataset.duration(now);
        }
        match self.dataset.latest().map(|row| row.time).or(self.stopped_at) {
            Some(until) => self.dataset.duration(until),
            None => Duration::zero(),
        }
    }

    /// Drop all data and empty the backup file. Caller confirms with the user.
    pub fn reset(&mut self) -> Result<()> {
        if !self.state.can_reset() {
            return Err(anyhow!("Cannot reset while {:?}", self.state));
        }
        self.dataset.clear();
        self.stopped_at = None;
        self.backup.clear()?;
        self.state = SessionState::Connected;
        log::info!(target: "session", "Reset");
        Ok(())
    }

    /// Move finished rows from the collector into the dataset and backup.
    /// Rows that arrive while not collecting are discarded.
    pub fn poll(&mut self) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        let events = match self.collector.as_ref() {
            Some(collector) => collector.drain(),
            None => return outcome,
        };
        for event in events {
            match event {
                CollectorEvent::Row(row) if self.state == SessionState::Collecting => {
                    if let Err(e) = self.backup.append(&row) {
                        log::error!(target: "session", "Backup write failed: {:#}", e);
                        outcome.errors.push(format!("Backup write failed: {:#}", e));
                    }
                    self.dataset.push(row);
                    outcome.rows_added += 1;
                }
                CollectorEvent::Row(_) => outcome.rows_discarded += 1,
                CollectorEvent::Failed(msg) => {
                    outcome.errors.push(format!("Serial connection lost: {}", msg));
                    self.disconnect();
                }
            }
        }
        outcome
    }

    /// Stop the collector thread and close the port. Data is kept.
    pub fn disconnect(&mut self) {
        if let Some(mut collector) = self.collector.take() {
            collector.shutdown();
        }
        self.state = SessionState::Disconnected;
        log::info!(target: "session", "Disconnected");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.collector.is_some() {
            self.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::testing::ScriptedSource;
    use crate::protocol::DISCONNECTED_SENTINEL;
    use std::time::{Duration, Instant};

    fn session_in(dir: &tempfile::TempDir) -> Session {
        Session::new(
            ChannelSet::default(),
            BackupFile::new(dir.path().join("backup_data.csv")),
            DISCONNECTED_SENTINEL,
        )
    }

    fn scripted(cycles: &[f64]) -> ScriptedSource {
        let lines: Vec<String> = cycles.iter().flat_map(|b| ScriptedSource::cycle(*b)).collect();
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
        ScriptedSource::new(&refs)
    }

    fn poll_until(session: &mut Session, rows: usize) -> PollOutcome {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut total = PollOutcome::default();
        while total.rows_added < rows && total.errors.is_empty() && Instant::now() < deadline {
            let o = session.poll();
            total.rows_added += o.rows_added;
            total.rows_discarded += o.rows_discarded;
            total.errors.extend(o.errors);
            std::thread::sleep(Duration::from_millis(5));
        }
        total
    }

    #[test]
    fn button_enablement_per_state() {
        use SessionState::*;
        assert!(Disconnected.can_connect() && !Disconnected.can_start());
        assert!(Connected.can_start() && !Connected.can_stop() && !Connected.can_reset());
        assert!(Collecting.can_stop() && !Collecting.can_start() && !Collecting.can_reset());
        assert!(Stopped.can_start() && Stopped.can_reset() && !Stopped.can_connect());
        assert_eq!(Disconnected.status_message(), "Connect to a port...");
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir);
        assert!(session.start(Local::now()).is_err());
        assert!(session.stop(Local::now()).is_err());
        assert!(session.reset().is_err());

        session.connect(scripted(&[])).unwrap();
        assert!(session.connect(scripted(&[])).is_err());
        assert!(session.reset().is_err());
    }

    #[test]
    fn full_session_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir);
        session.connect(scripted(&[10.0, 20.0])).unwrap();
        assert_eq!(session.state(), SessionState::Connected);

        session.start(Local::now()).unwrap();
        assert_eq!(session.state(), SessionState::Collecting);
        let outcome = poll_until(&mut session, 2);
        assert_eq!(outcome.rows_added, 2);
        assert!(outcome.errors.is_empty());
        assert_eq!(session.dataset().len(), 2);
        assert_eq!(session.dataset().rows()[1].temperatures[7], Some(28.0));

        let backup = std::fs::read_to_string(session.backup().path()).unwrap();
        assert_eq!(backup.lines().count(), 3);
        assert!(backup.starts_with("Time,Ch. 1,"));

        session.stop(Local::now()).unwrap();
        let began = session.dataset().began();
        session.start(Local::now()).unwrap();
        assert_eq!(session.dataset().began(), began);
        let backup = std::fs::read_to_string(session.backup().path()).unwrap();
        assert_eq!(backup.lines().count(), 3, "restart keeps backup rows");

        session.stop(Local::now()).unwrap();
        session.reset().unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.dataset().is_empty());
        assert!(session.dataset().began().is_none());
        assert_eq!(std::fs::read_to_string(session.backup().path()).unwrap(), "");
    }

    #[test]
    fn rows_after_stop_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir);
        session.connect(scripted(&[1.0, 2.0, 3.0])).unwrap();
        session.start(Local::now()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while session.collector.as_ref().map_or(0, |c| c.pending()) < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        session.stop(Local::now()).unwrap();

        let outcome = session.poll();
        assert_eq!(outcome.rows_discarded, 3);
        assert_eq!(outcome.rows_added, 0);
        assert!(session.dataset().is_empty());
        let backup = std::fs::read_to_string(session.backup().path()).unwrap();
        assert_eq!(backup.lines().count(), 1, "header only");
    }

    #[test]
    fn duration_freezes_when_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir);
        session.connect(scripted(&[])).unwrap();
        let began = Local::now();
        session.start(began).unwrap();
        let later = began + chrono::Duration::seconds(30);
        assert_eq!(session.elapsed(later), chrono::Duration::seconds(30));

        session.stop(began + chrono::Duration::seconds(5)).unwrap();
        assert!(session.dataset().is_empty());
        assert_eq!(session.elapsed(later), chrono::Duration::seconds(5));

        session.reset().unwrap();
        assert_eq!(session.elapsed(later), chrono::Duration::zero());
    }

    #[test]
    fn collector_failure_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir);
        let mut source = scripted(&[5.0]);
        source.fail_when_empty = true;
        session.connect(source).unwrap();
        session.start(Local::now()).unwrap();

        let outcome = poll_until(&mut session, 2);
        assert_eq!(outcome.rows_added, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.dataset().len(), 1);
        assert!(session.state().can_connect());
    }
}
