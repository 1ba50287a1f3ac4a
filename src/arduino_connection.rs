/// Serial connection to the thermocouple Arduino.
///
/// The board streams one `#ch: value` line per reading. The port is opened with
/// a short read timeout so the collector thread regains control regularly and
/// can notice stop/shutdown requests.

use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::time::Duration;
use anyhow::{anyhow, bail, Result};
use serialport::{ClearBuffer, DataBits, SerialPort};

use crate::config_loader::LoggerSettings;

/// Anything the collector can pull text lines from.
pub trait LineSource: Send {
    /// Next complete line, or `Ok(None)` if nothing arrived before the timeout.
    fn read_line(&mut self) -> Result<Option<String>>;

    /// Drop anything buffered so collection starts from fresh data.
    fn reset_input(&mut self) -> Result<()>;
}

/// Names of the serial ports the OS reports.
pub fn available_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            log::warn!(target: "arduino_connection", "Could not enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}

fn data_bits(bits: u8) -> Result<DataBits> {
    Ok(match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        8 => DataBits::Eight,
        other => bail!("Unsupported data bits: {}", other),
    })
}

/// Splits a byte stream into `\n`-terminated lines. A read that times out
/// mid-line keeps the partial bytes until the rest arrives.
pub struct LineReader<R: Read> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { reader: BufReader::new(inner), pending: Vec::new() }
    }

    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }

    /// Bytes of an unfinished line.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// `Ok(None)` on timeout; end of stream is an error.
    pub fn next_line(&mut self) -> std::io::Result<Option<String>> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => Err(std::io::Error::new(ErrorKind::UnexpectedEof, "port closed")),
            Ok(_) => {
                if self.pending.last() != Some(&b'\n') {
                    return Ok(None);
                }
                let line = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                Ok(Some(line))
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop buffered and partial input.
    pub fn discard_buffered(&mut self) {
        let buffered = self.reader.buffer().len();
        self.reader.consume(buffered);
        self.pending.clear();
    }
}

pub struct ArduinoConnection {
    lines: LineReader<Box<dyn SerialPort>>,
    port_path: String,
}

impl std::fmt::Debug for ArduinoConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArduinoConnection")
            .field("port_path", &self.port_path)
            .field("pending", &self.lines.pending_len())
            .finish()
    }
}

impl ArduinoConnection {
    pub fn open(port_path: &str, settings: &LoggerSettings) -> Result<Self> {
        log::info!(
            target: "arduino_connection",
            "Connecting to Arduino on {} @{} ({} data bits)",
            port_path,
            settings.baud,
            settings.data_bits
        );
        let port = serialport::new(port_path, settings.baud)
            .data_bits(data_bits(settings.data_bits)?)
            .timeout(Duration::from_millis(settings.read_timeout_ms))
            .open()
            .map_err(|e| anyhow!("Connection failed on {}: {}", port_path, e))?;
        Ok(Self {
            lines: LineReader::new(port),
            port_path: port_path.to_string(),
        })
    }

    pub fn port_path(&self) -> &str {
        &self.port_path
    }
}

impl LineSource for ArduinoConnection {
    fn read_line(&mut self) -> Result<Option<String>> {
        self.lines.next_line().map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => anyhow!("Serial port {} closed", self.port_path),
            _ => anyhow!("Read error on {}: {}", self.port_path, e),
        })
    }

    fn reset_input(&mut self) -> Result<()> {
        self.lines.discard_buffered();
        self.lines
            .get_ref()
            .clear(ClearBuffer::Input)
            .map_err(|e| anyhow!("Failed to clear input on {}: {}", self.port_path, e))?;
        log::debug!(target: "arduino_connection", "Input buffer cleared on {}", self.port_path);
        Ok(())
    }
}
