/// Line parser for the thermocouple multiplexer firmware.
///
/// Every reading arrives as one text line of the form `#<ch>: <value>\r\n`,
/// e.g. `#2: 23.64`. The firmware reports an open thermocouple with a fixed
/// sentinel value instead of a real temperature.

use anyhow::{anyhow, Result};
use nom::{
    character::complete::{char, one_of, space0},
    number::complete::double,
    sequence::{pair, preceded, separated_pair},
    IResult,
};

/// Value the firmware sends for a channel with no sensor attached.
pub const DISCONNECTED_SENTINEL: f64 = 512.50;

/// One parsed serial line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub channel: u8,
    /// `None` when the firmware reported the disconnected sentinel.
    pub temperature: Option<f64>,
}

impl Reading {
    pub fn is_active(&self) -> bool {
        self.temperature.is_some()
    }
}

fn channel_number(input: &str) -> IResult<&str, u8> {
    let (rest, digit) = preceded(char('#'), one_of("0123456789"))(input)?;
    Ok((rest, digit as u8 - b'0'))
}

fn reading(input: &str) -> IResult<&str, (u8, f64)> {
    separated_pair(channel_number, pair(char(':'), space0), double)(input)
}

/// Parse one line. Trailing `\r`/`\n` are ignored.
pub fn parse_line(line: &str, sentinel: f64) -> Result<Reading> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let (rest, (channel, value)) = reading(trimmed)
        .map_err(|e| anyhow!("Malformed reading {:?}: {}", trimmed, e))?;
    if !rest.trim().is_empty() {
        return Err(anyhow!("Trailing data after reading {:?}: {:?}", trimmed, rest));
    }
    let temperature = if value == sentinel { None } else { Some(value) };
    Ok(Reading { channel, temperature })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_reading() {
        let r = parse_line("#2: 23.64\r\n", DISCONNECTED_SENTINEL).unwrap();
        assert_eq!(r.channel, 2);
        assert_eq!(r.temperature, Some(23.64));
        assert!(r.is_active());
    }

    #[test]
    fn parses_negative_and_integer_values() {
        let r = parse_line("#8: -4.5\n", DISCONNECTED_SENTINEL).unwrap();
        assert_eq!(r.channel, 8);
        assert_eq!(r.temperature, Some(-4.5));

        let r = parse_line("#1: 21", DISCONNECTED_SENTINEL).unwrap();
        assert_eq!(r.temperature, Some(21.0));
    }

    #[test]
    fn sentinel_marks_channel_inactive() {
        let r = parse_line("#5: 512.50\r\n", DISCONNECTED_SENTINEL).unwrap();
        assert_eq!(r.channel, 5);
        assert_eq!(r.temperature, None);
        assert!(!r.is_active());
    }

    #[test]
    fn custom_sentinel_is_honoured() {
        let r = parse_line("#3: 999\r\n", 999.0).unwrap();
        assert_eq!(r.temperature, None);
        let r = parse_line("#3: 512.5\r\n", 999.0).unwrap();
        assert_eq!(r.temperature, Some(512.5));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_line("", DISCONNECTED_SENTINEL).is_err());
        assert!(parse_line("2: 23.64", DISCONNECTED_SENTINEL).is_err());
        assert!(parse_line("#x: 23.64", DISCONNECTED_SENTINEL).is_err());
        assert!(parse_line("#2 23.64", DISCONNECTED_SENTINEL).is_err());
        assert!(parse_line("#2: 23.64 extra", DISCONNECTED_SENTINEL).is_err());
    }
}
