/// Temperature Array Logger GUI
///
/// Run with: cargo run --bin temp_logger -- --port /dev/ttyACM0

use std::path::PathBuf;
use std::time::Duration;
use anyhow::Result;
use chrono::Local;
use clap::Parser;
use eframe::egui;
use egui::Color32;
use egui_plot::{Legend, Line, Plot, PlotPoints, Points};
use gethostname::gethostname;

use temp_logger::arduino_connection::{available_ports, ArduinoConnection};
use temp_logger::backup::BackupFile;
use temp_logger::channels::{ChannelSet, CHANNEL_COUNT};
use temp_logger::config_loader::{self, LoggerSettings};
use temp_logger::dataset::format_duration;
use temp_logger::export::{self, CSV_EXTENSIONS, CSV_FILTER_NAME};
use temp_logger::session::{Session, SessionState};

const WINDOW_TITLE: &str = "Temperature Array Logger";
const GO_COLOR: Color32 = Color32::from_rgb(0, 140, 0);
const STOP_COLOR: Color32 = Color32::from_rgb(190, 30, 30);
const LOG_LIMIT: usize = 10000;
/// "Save Data" starts in the working directory, where the backup file lives.
const DATA_DIR: &str = ".";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config (default: temp_logger.yaml next to Cargo.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Serial port, overrides the config file
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    debug: bool,
}

enum Action {
    Connect,
    Start,
    Stop,
    RequestReset,
    ConfirmReset,
    CancelReset,
    RefreshPorts,
    Rename(usize, String),
    SaveData,
    SaveChannels,
    LoadChannels,
}

/// Keep roughly the newest half of `log` once it exceeds `limit` bytes,
/// cutting at a line start (or at least a char boundary).
fn trim_log(log: &mut String, limit: usize) {
    if log.len() <= limit {
        return;
    }
    let mut cut = log.len() - limit / 2;
    while !log.is_char_boundary(cut) {
        cut += 1;
    }
    if let Some(newline) = log[cut..].find('\n') {
        if newline + 1 < log.len() - cut {
            cut += newline + 1;
        }
    }
    log.replace_range(..cut, "");
}

struct TempLoggerGUI {
    settings: LoggerSettings,
    session: Session,
    port_path: String,
    available_ports: Vec<String>,
    status: String,
    debug_log: String,
    port_error: Option<String>,
    confirm_clear: bool,
}

impl TempLoggerGUI {
    fn new(settings: LoggerSettings) -> Self {
        let channels = ChannelSet::with_names(settings.channel_names.as_deref());
        let backup = BackupFile::new(settings.backup_path.clone());
        let session = Session::new(channels, backup, settings.disconnected_sentinel);
        let mut gui = Self {
            port_path: settings.port.clone(),
            settings,
            session,
            available_ports: available_ports(),
            status: SessionState::Disconnected.status_message().to_string(),
            debug_log: String::new(),
            port_error: None,
            confirm_clear: false,
        };
        gui.log(&format!("Found {} serial port(s)", gui.available_ports.len()));
        gui
    }

    fn log(&mut self, message: &str) {
        log::info!(target: "gui", "{}", message);
        self.debug_log.push_str(&Local::now().format("%H:%M:%S ").to_string());
        self.debug_log.push_str(message);
        self.debug_log.push('\n');
        trim_log(&mut self.debug_log, LOG_LIMIT);
    }

    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
    }

    fn report(&mut self, context: &str, result: Result<()>) {
        if let Err(e) = result {
            let message = format!("{}: {:#}", context, e);
            log::error!(target: "gui", "{}", message);
            self.log(&message);
            self.set_status(&message);
        }
    }

    fn connect(&mut self) {
        let port_path = self.port_path.trim().to_string();
        let opened = ArduinoConnection::open(&port_path, &self.settings)
            .and_then(|conn| self.session.connect(conn));
        match opened {
            Ok(()) => {
                self.log(&format!("Connected to {}", port_path));
                self.set_status(self.session.state().status_message());
            }
            Err(e) => {
                self.log(&format!("Bad port {}: {:#}", port_path, e));
                self.port_error = Some(format!("{:#}", e));
            }
        }
    }

    fn start(&mut self) {
        match self.session.start(Local::now()) {
            Ok(()) => {
                self.log("Reading...");
                self.set_status(self.session.state().status_message());
            }
            Err(e) => self.report("Start failed", Err(e)),
        }
    }

    fn stop(&mut self) {
        match self.session.stop(Local::now()) {
            Ok(()) => {
                self.log("Stopped");
                self.set_status(self.session.state().status_message());
            }
            Err(e) => self.report("Stop failed", Err(e)),
        }
    }

    fn reset(&mut self) {
        match self.session.reset() {
            Ok(()) => {
                self.log("Reset");
                self.set_status("Ready");
            }
            Err(e) => self.report("Reset failed", Err(e)),
        }
    }

    fn channel_dir(&self) -> PathBuf {
        self.settings
            .channel_names_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn csv_dialog(title: &str, dir: PathBuf, file_name: &str) -> rfd::FileDialog {
        rfd::FileDialog::new()
            .set_title(title)
            .set_directory(dir)
            .set_file_name(file_name)
            .add_filter(CSV_FILTER_NAME, CSV_EXTENSIONS)
    }

    fn default_channel_file_name(&self) -> String {
        self.settings
            .channel_names_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "channel_names.csv".to_string())
    }

    fn save_data(&mut self) {
        let Some(path) = Self::csv_dialog("Save File", PathBuf::from(DATA_DIR), "data.csv").save_file() else { return; };
        let result = export::save_all(&path, &self.session.channels.names(), self.session.dataset().rows());
        if result.is_ok() {
            self.log(&format!("Saved {} rows to {}", self.session.dataset().len(), path.display()));
        }
        self.report("Save failed", result);
    }

    fn save_channels(&mut self) {
        let name = self.default_channel_file_name();
        let Some(path) = Self::csv_dialog("Save Channel File", self.channel_dir(), &name).save_file() else { return; };
        let result = self.session.channels.save_names(&path);
        if result.is_ok() {
            self.log(&format!("Saved channel names to {}", path.display()));
        }
        self.report("Saving channel names failed", result);
    }

    fn load_channels(&mut self) {
        let name = self.default_channel_file_name();
        let Some(path) = Self::csv_dialog("Open Channel File", self.channel_dir(), &name).pick_file() else { return; };
        match self.session.channels.load_names(&path) {
            Ok(true) => self.log(&format!("Loaded channel names from {}", path.display())),
            Ok(false) => self.log(&format!(
                "{} does not hold {} channel names; ignored",
                path.display(),
                CHANNEL_COUNT
            )),
            Err(e) => self.report("Loading channel names failed", Err(e)),
        }
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::Connect => self.connect(),
            Action::Start => self.start(),
            Action::Stop => self.stop(),
            Action::RequestReset => self.confirm_clear = true,
            Action::ConfirmReset => {
                self.confirm_clear = false;
                self.reset();
            }
            Action::CancelReset => self.confirm_clear = false,
            Action::RefreshPorts => {
                self.available_ports = available_ports();
                let n = self.available_ports.len();
                self.log(&format!("Found {} serial port(s)", n));
            }
            Action::Rename(number, name) => {
                let result = self.session.channels.rename(number, &name);
                self.report("Rename failed", result);
            }
            Action::SaveData => self.save_data(),
            Action::SaveChannels => self.save_channels(),
            Action::LoadChannels => self.load_channels(),
        }
    }

    fn poll_collector(&mut self) {
        let outcome = self.session.poll();
        if outcome.rows_added > 0 {
            log::debug!(target: "gui", "{} new row(s), {} total", outcome.rows_added, self.session.dataset().len());
        }
        if outcome.rows_discarded > 0 {
            log::debug!(target: "gui", "Discarded {} row(s) received while not collecting", outcome.rows_discarded);
        }
        for error in outcome.errors {
            self.log(&error);
            self.set_status(&error);
        }
    }

    fn render_controls(&mut self, ui: &mut egui::Ui, actions: &mut Vec<Action>) {
        let state = self.session.state();
        ui.horizontal(|ui| {
            ui.label("Port:");
            ui.add_enabled(
                state.can_connect(),
                egui::TextEdit::singleline(&mut self.port_path).desired_width(160.0),
            );
            ui.add_enabled_ui(state.can_connect(), |ui| {
                egui::ComboBox::from_id_source("port_picker")
                    .selected_text("Detected")
                    .show_ui(ui, |ui| {
                        for port in &self.available_ports {
                            ui.selectable_value(&mut self.port_path, port.clone(), port.as_str());
                        }
                    });
            });
            if ui.add_enabled(state.can_connect(), egui::Button::new("⟳")).on_hover_text("Rescan ports").clicked() {
                actions.push(Action::RefreshPorts);
            }

            let connect = egui::Button::new("Connect").fill(if state.can_connect() { GO_COLOR } else { Color32::TRANSPARENT });
            if ui.add_enabled(state.can_connect(), connect).clicked() {
                actions.push(Action::Connect);
            }
            let start = egui::Button::new("Start").fill(if state.can_start() { GO_COLOR } else { Color32::TRANSPARENT });
            if ui.add_enabled(state.can_start(), start).clicked() {
                actions.push(Action::Start);
            }
            let stop = egui::Button::new("Stop").fill(if state.can_stop() { STOP_COLOR } else { Color32::TRANSPARENT });
            if ui.add_enabled(state.can_stop(), stop).clicked() {
                actions.push(Action::Stop);
            }
            if ui.add_enabled(state.can_reset(), egui::Button::new("Reset")).clicked() {
                actions.push(Action::RequestReset);
            }

            ui.separator();
            ui.label("Running Duration:");
            let mut duration = format_duration(self.session.elapsed(Local::now()));
            ui.add(egui::TextEdit::singleline(&mut duration).interactive(false).desired_width(110.0));
        });
    }

    fn render_channels(&mut self, ui: &mut egui::Ui, actions: &mut Vec<Action>) {
        ui.heading("Channels");
        ui.separator();
        let active = self
            .session
            .dataset()
            .latest()
            .map(|row| row.active())
            .unwrap_or([true; CHANNEL_COUNT]);
        for (idx, channel) in self.session.channels.iter().enumerate() {
            let mut name = channel.name.clone();
            ui.horizontal(|ui| {
                ui.colored_label(channel.color(), format!("{}", channel.number));
                let edit = egui::TextEdit::singleline(&mut name)
                    .text_color(channel.color())
                    .desired_width(150.0);
                if ui.add_enabled(active[idx], edit).changed() {
                    actions.push(Action::Rename(channel.number, name.clone()));
                }
            });
        }
        ui.add_space(10.0);
        ui.horizontal(|ui| {
            if ui.button("Save Channels").clicked() {
                actions.push(Action::SaveChannels);
            }
            if ui.button("Load Channels").clicked() {
                actions.push(Action::LoadChannels);
            }
        });
        ui.add_space(10.0);
        if ui.button("Save Data").clicked() {
            actions.push(Action::SaveData);
        }
    }

    fn render_table(&self, ui: &mut egui::Ui) {
        egui::ScrollArea::both()
            .id_source("data_table_scroll")
            .auto_shrink([false; 2])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                egui::Grid::new("data_table")
                    .striped(true)
                    .num_columns(CHANNEL_COUNT + 1)
                    .show(ui, |ui| {
                        ui.strong("Time");
                        for channel in self.session.channels.iter() {
                            ui.colored_label(channel.color(), egui::RichText::new(&channel.name).strong());
                        }
                        ui.end_row();
                        for row in self.session.dataset().rows() {
                            ui.monospace(row.time_of_day());
                            for idx in 0..CHANNEL_COUNT {
                                ui.monospace(row.cell(idx));
                            }
                            ui.end_row();
                        }
                    });
            });
    }

    fn render_plot(&self, ui: &mut egui::Ui) {
        let dataset = self.session.dataset();
        Plot::new("temperature_plot")
            .legend(Legend::default())
            .x_axis_label("Time [s]")
            .y_axis_label("Temperature [°C]")
            .show(ui, |plot_ui| {
                for (idx, channel) in self.session.channels.iter().enumerate() {
                    let color = channel.color();
                    for segment in dataset.segments(idx) {
                        plot_ui.line(
                            Line::new(PlotPoints::from(segment))
                                .name(&channel.name)
                                .color(color)
                                .width(1.0),
                        );
                    }
                    let points = dataset.points(idx);
                    if !points.is_empty() {
                        plot_ui.points(
                            Points::new(PlotPoints::from(points))
                                .name(&channel.name)
                                .color(color)
                                .radius(2.0),
                        );
                    }
                }
            });
    }

    fn render_dialogs(&mut self, ctx: &egui::Context, actions: &mut Vec<Action>) {
        if let Some(message) = self.port_error.clone() {
            egui::Window::new("\"Houston, we have a problem.\"")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label("There is an issue with the serial port you selected.");
                    ui.small(message);
                    if ui.button("OK").clicked() {
                        self.port_error = None;
                    }
                });
        }
        if self.confirm_clear {
            egui::Window::new("Clearing")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label("Are you sure you want to clear the data?");
                    ui.horizontal(|ui| {
                        if ui.button("Yes").clicked() {
                            actions.push(Action::ConfirmReset);
                        }
                        if ui.button("No").clicked() {
                            actions.push(Action::CancelReset);
                        }
                    });
                });
        }
    }
}

impl eframe::App for TempLoggerGUI {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_collector();
        let mut actions = Vec::new();

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            self.render_controls(ui, &mut actions);
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(self.status.as_str());
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(format!("{} rows", self.session.dataset().len()));
                });
            });
        });

        egui::SidePanel::left("channel_panel")
            .resizable(true)
            .default_width(230.0)
            .show(ctx, |ui| {
                self.render_channels(ui, &mut actions);
                ui.add_space(10.0);
                ui.collapsing("Debug log", |ui| {
                    ui.horizontal(|ui| {
                        if ui.button("Clear log").clicked() {
                            self.debug_log.clear();
                        }
                        if ui.button("Copy log").clicked() {
                            let log = self.debug_log.clone();
                            ui.output_mut(|o| o.copied_text = log);
                        }
                    });
                    egui::ScrollArea::vertical()
                        .id_source("debug_log_scroll")
                        .max_height(300.0)
                        .auto_shrink([false; 2])
                        .stick_to_bottom(true)
                        .show(ui, |ui| {
                            ui.add(
                                egui::TextEdit::multiline(&mut self.debug_log)
                                    .desired_width(f32::INFINITY)
                                    .interactive(true)
                                    .code_editor(),
                            );
                        });
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.columns(2, |columns| {
                self.render_table(&mut columns[0]);
                self.render_plot(&mut columns[1]);
            });
        });

        self.render_dialogs(ctx, &mut actions);

        for action in actions {
            self.apply(action);
        }

        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

fn main() {
    let args = Args::parse();
    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let hostname = gethostname().to_string_lossy().to_string();
    let config_path = args.config.clone().unwrap_or_else(config_loader::default_config_path);
    let mut settings = match config_loader::load_logger_settings(&config_path, &hostname) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load settings for host '{}': {:#}", hostname, e);
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        settings.port = port;
    }

    let gui = TempLoggerGUI::new(settings);
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size([1400.0, 800.0]),
        ..Default::default()
    };

    if let Err(e) = eframe::run_native(WINDOW_TITLE, options, Box::new(|_cc| Box::new(gui))) {
        eprintln!("GUI error: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_dialogs_start_next_to_names_file() {
        let settings = LoggerSettings {
            channel_names_path: PathBuf::from("/tmp/rig/names.csv"),
            ..LoggerSettings::default()
        };
        let gui = TempLoggerGUI::new(settings);
        assert_eq!(gui.channel_dir(), PathBuf::from("/tmp/rig"));
        assert_eq!(gui.default_channel_file_name(), "names.csv");
        assert_ne!(PathBuf::from(DATA_DIR), gui.channel_dir());

        let gui = TempLoggerGUI::new(LoggerSettings {
            channel_names_path: PathBuf::from("names.csv"),
            ..LoggerSettings::default()
        });
        assert_eq!(gui.channel_dir(), PathBuf::from("."));
    }

    #[test]
    fn trim_keeps_newest_lines() {
        let mut log = String::new();
        for i in 0..2000 {
            log.push_str(&format!("line {}\n", i));
        }
        trim_log(&mut log, LOG_LIMIT);
        assert!(log.len() <= LOG_LIMIT / 2);
        assert!(log.starts_with("line "));
        assert!(log.ends_with("line 1999\n"));
    }

    #[test]
    fn trim_handles_multibyte_text() {
        let mut log = String::new();
        for _ in 0..60 {
            log.push_str(&"ä".repeat(100));
            trim_log(&mut log, LOG_LIMIT);
        }
        assert!(log.len() <= LOG_LIMIT);
        assert!(log.chars().all(|c| c == 'ä'));

        let mut log = format!("x{}", "ü".repeat(LOG_LIMIT));
        trim_log(&mut log, LOG_LIMIT);
        assert!(log.len() <= LOG_LIMIT / 2 + 1);
    }
}
