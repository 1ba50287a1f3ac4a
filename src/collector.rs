/// Background collector: reads serial lines off the GUI thread and assembles
/// complete eight-channel rows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use anyhow::Result;
use chrono::Local;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::arduino_connection::LineSource;
use crate::channels::CHANNEL_COUNT;
use crate::dataset::Row;
use crate::protocol::{parse_line, Reading};

const IDLE_POLL: Duration = Duration::from_millis(20);

/// What the collector thread reports back to the GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectorEvent {
    Row(Row),
    /// The line source failed; the thread has exited.
    Failed(String),
}

#[derive(Debug, Default)]
struct Flags {
    running: AtomicBool,
    shutdown: AtomicBool,
    reset_requested: AtomicBool,
}

#[derive(Debug)]
pub struct Collector {
    flags: Arc<Flags>,
    rx: Receiver<CollectorEvent>,
    handle: Option<JoinHandle<()>>,
}

impl Collector {
    /// Spawn the read loop. It idles until `start` is called.
    pub fn spawn<S: LineSource + 'static>(source: S, sentinel: f64) -> Result<Self> {
        let flags = Arc::new(Flags::default());
        let (tx, rx) = unbounded();
        let thread_flags = Arc::clone(&flags);
        let handle = thread::Builder::new()
            .name("collector".into())
            .spawn(move || read_loop(source, thread_flags, tx, sentinel))?;
        log::debug!(target: "collector", "Collector thread spawned");
        Ok(Self { flags, rx, handle: Some(handle) })
    }

    /// Clear stale input and begin producing rows.
    pub fn start(&self) {
        self.flags.reset_requested.store(true, Ordering::SeqCst);
        self.flags.running.store(true, Ordering::SeqCst);
        log::info!(target: "collector", "Collection started");
    }

    pub fn stop(&self) {
        self.flags.running.store(false, Ordering::SeqCst);
        log::info!(target: "collector", "Collection stopped");
    }

    pub fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    /// Events sent but not yet drained.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Everything the thread has sent since the last call.
    pub fn drain(&self) -> Vec<CollectorEvent> {
        self.rx.try_iter().collect()
    }

    /// Stop the thread and wait for it; the line source is dropped with it.
    pub fn shutdown(&mut self) {
        self.flags.running.store(false, Ordering::SeqCst);
        self.flags.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!(target: "collector", "Collector thread panicked");
            }
            log::debug!(target: "collector", "Collector thread joined");
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_loop<S: LineSource>(mut source: S, flags: Arc<Flags>, tx: Sender<CollectorEvent>, sentinel: f64) {
    while !flags.shutdown.load(Ordering::SeqCst) {
        if !flags.running.load(Ordering::SeqCst) {
            thread::sleep(IDLE_POLL);
            continue;
        }
        if flags.reset_requested.swap(false, Ordering::SeqCst) {
            if let Err(e) = source.reset_input() {
                log::warn!(target: "collector", "{}", e);
            }
        }
        match read_cycle(&mut source, &flags.shutdown, sentinel) {
            Ok(Some(row)) => {
                log::debug!(target: "collector", "Row at {}: {:?}", row.time_of_day(), row.temperatures);
                if tx.send(CollectorEvent::Row(row)).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::error!(target: "collector", "Collector stopping: {:#}", e);
                let _ = tx.send(CollectorEvent::Failed(format!("{:#}", e)));
                break;
            }
        }
    }
    log::debug!(target: "collector", "Read loop exited");
}

/// Next parsed reading. Unparseable lines are logged and skipped.
/// Returns `Ok(None)` on a read timeout when `wait` is false, or on shutdown.
fn next_reading<S: LineSource>(source: &mut S, shutdown: &AtomicBool, sentinel: f64, wait: bool) -> Result<Option<Reading>> {
    while !shutdown.load(Ordering::SeqCst) {
        match source.read_line()? {
            Some(line) => match parse_line(&line, sentinel) {
                Ok(reading) => return Ok(Some(reading)),
                Err(e) => log::warn!(target: "collector", "Skipping line: {}", e),
            },
            None if wait => continue,
            None => return Ok(None),
        }
    }
    Ok(None)
}

/// One cycle: a reading on channel 1 opens the row, the next seven readings
/// fill it in arrival order. Readings outside a cycle are discarded.
pub fn read_cycle<S: LineSource>(source: &mut S, shutdown: &AtomicBool, sentinel: f64) -> Result<Option<Row>> {
    let Some(first) = next_reading(source, shutdown, sentinel, false)? else {
        return Ok(None);
    };
    if first.channel != 1 {
        log::trace!(target: "collector", "Waiting for channel 1, got channel {}", first.channel);
        return Ok(None);
    }
    let time = Local::now();
    let mut temperatures = [None; CHANNEL_COUNT];
    temperatures[0] = first.temperature;
    for slot in temperatures.iter_mut().skip(1) {
        let Some(reading) = next_reading(source, shutdown, sentinel, true)? else {
            return Ok(None);
        };
        *slot = reading.temperature;
    }
    Ok(Some(Row { time, temperatures }))
}
