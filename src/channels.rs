/// Channel table: the eight sensor inputs with their display names and colors.

use std::fs::File;
use std::path::Path;
use anyhow::{anyhow, Context, Result};
use egui::Color32;

pub const CHANNEL_COUNT: usize = 8;

/// Plot/name colors per channel (matplotlib "tab10", first eight).
pub const CHANNEL_COLORS: [[u8; 3]; CHANNEL_COUNT] = [
    [31, 119, 180],
    [255, 127, 14],
    [44, 160, 44],
    [214, 39, 40],
    [148, 103, 189],
    [140, 86, 75],
    [227, 119, 194],
    [127, 127, 127],
];

pub const DEFAULT_CHANNEL_NAMES_FILE: &str = "./channel_names.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// 1-based, as printed by the firmware.
    pub number: usize,
    pub name: String,
    pub rgb: [u8; 3],
}

impl Channel {
    pub fn default_name(number: usize) -> String {
        format!("Ch. {}", number)
    }

    pub fn color(&self) -> Color32 {
        Color32::from_rgb(self.rgb[0], self.rgb[1], self.rgb[2])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSet {
    channels: Vec<Channel>,
}

impl Default for ChannelSet {
    fn default() -> Self {
        let channels = (1..=CHANNEL_COUNT)
            .map(|number| Channel {
                number,
                name: Channel::default_name(number),
                rgb: CHANNEL_COLORS[number - 1],
            })
            .collect();
        Self { channels }
    }
}

impl ChannelSet {
    /// Start from configured names; anything but exactly eight names is ignored.
    pub fn with_names(names: Option<&[String]>) -> Self {
        let mut set = Self::default();
        match names {
            Some(names) if names.len() == CHANNEL_COUNT => set.apply_names(names),
            Some(names) => log::warn!(
                target: "channels",
                "Ignoring configured channel names: expected {} names, got {}",
                CHANNEL_COUNT,
                names.len()
            ),
            None => {}
        }
        set
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn get(&self, number: usize) -> Option<&Channel> {
        number.checked_sub(1).and_then(|idx| self.channels.get(idx))
    }

    pub fn names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn rename(&mut self, number: usize, name: &str) -> Result<()> {
        let channel = number
            .checked_sub(1)
            .and_then(|idx| self.channels.get_mut(idx))
            .ok_or_else(|| anyhow!("Channel {} out of range 1..={}", number, CHANNEL_COUNT))?;
        channel.name = name.to_string();
        Ok(())
    }

    fn apply_names(&mut self, names: &[String]) {
        for (channel, name) in self.channels.iter_mut().zip(names) {
            channel.name = name.clone();
        }
    }

    /// Write the current names as a single CSV row.
    pub fn save_names(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create channel file {:?}", path))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(self.channels.iter().map(|c| c.name.as_str()))?;
        writer.flush()?;
        log::info!(target: "channels", "Saved channel names to {:?}", path);
        Ok(())
    }

    /// Load names from the first CSV row. Returns `false` (names untouched)
    /// if the row does not hold exactly eight names.
    pub fn load_names(&mut self, path: &Path) -> Result<bool> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open channel file {:?}", path))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);
        let record = match reader.records().next() {
            Some(record) => record?,
            None => return Err(anyhow!("Channel file {:?} is empty", path)),
        };
        let names: Vec<String> = record.iter().map(|s| s.to_string()).collect();
        if names.len() != CHANNEL_COUNT {
            log::warn!(
                target: "channels",
                "Channel file {:?} has {} names, expected {}; keeping current names",
                path,
                names.len(),
                CHANNEL_COUNT
            );
            return Ok(false);
        }
        self.apply_names(&names);
        log::info!(target: "channels", "Loaded channel names from {:?}", path);
        Ok(true)
    }
}
