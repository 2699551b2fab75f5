// src/gui.rs
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use eframe::egui;
use egui::{Color32, RichText};
use log::{info, warn};
use crate::config::ViewerConfig;
use crate::session::Session;
use crate::simulator::SimConnector;
use crate::stream::{Connector, EventSink, Link, LinkRequest, WsConnector};
use crate::telemetry::{render_chart_png, Metric, PlotStyle, ViewerError};
use crate::types::{ConnectionMode, LinkState};
use crate::visualizer::{draw_chart, draw_indicator};

/// Routes `open` to the live backend or the simulated device.
pub struct ModeConnector {
    mode: ConnectionMode,
    live: WsConnector,
    sim: SimConnector,
}

impl ModeConnector {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            mode: config.mode,
            live: WsConnector::new(
                config.base_url.clone(),
                config.keepalive_interval(),
                config.connect_timeout(),
            ),
            sim: SimConnector::new(config.sim_period()),
        }
    }

    pub fn set_mode(&mut self, mode: ConnectionMode) {
        self.mode = mode;
    }
}

impl Connector for ModeConnector {
    fn open(
        &mut self,
        request: &LinkRequest,
        sink: EventSink,
    ) -> Result<Box<dyn Link>, ViewerError> {
        match self.mode {
            ConnectionMode::Live => self.live.open(request, sink),
            ConnectionMode::Simulation => self.sim.open(request, sink),
        }
    }
}

pub struct ViewerApp {
    // 会话与配置
    session: Session<ModeConnector>,
    connection_mode: ConnectionMode,
    device_input: String,
    export_dir: std::path::PathBuf,
    plot_style: PlotStyle,

    // 界面状态
    chart_area_width: f32,
    last_state: LinkState,
    log_messages: Vec<String>,
}

impl ViewerApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: ViewerConfig) -> Self {
        let mut session = Session::new(ModeConnector::new(&config), &config);
        let ctx = cc.egui_ctx.clone();
        session.set_repaint_hook(Arc::new(move || ctx.request_repaint()));
        let mut app = Self {
            session,
            connection_mode: config.mode,
            device_input: config.device_id.clone(),
            export_dir: config.export_dir.clone(),
            plot_style: PlotStyle::default(),
            chart_area_width: config.chart_max_width,
            last_state: LinkState::Disconnected,
            log_messages: vec!["Telemetry viewer ready.".to_owned()],
        };
        // Same as pressing CONNECT with the configured device.
        app.connect();
        app
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > 8 {
            self.log_messages.remove(0);
        }
    }

    fn connect(&mut self) {
        self.session.connector_mut().set_mode(self.connection_mode);
        let device = self.device_input.clone();
        match self.session.connect(&device) {
            Ok(link) => self.log(&format!(
                "{} link {} -> {}",
                self.connection_mode.label(),
                link.0,
                device.trim()
            )),
            Err(err) => self.log(&format!("Connect failed: {err}")),
        }
    }

    fn export_charts(&mut self) {
        let mut written = 0;
        let mut failures = Vec::new();
        for view in self.session.render().charts() {
            if view.is_empty() {
                continue;
            }
            let path = self
                .export_dir
                .join(format!("chart-{}.png", view.metric.key()));
            match render_chart_png(view, &self.plot_style)
                .and_then(|png| write_png(&path, &png))
            {
                Ok(()) => written += 1,
                Err(err) => failures.push(format!("{}: {err}", view.metric.key())),
            }
        }
        info!("exported {written} chart(s) to {}", self.export_dir.display());
        self.log(&format!("Exported {written} chart(s)"));
        for failure in failures {
            warn!("chart export failed: {failure}");
            self.log(&format!("Export failed: {failure}"));
        }
    }

    fn track_state(&mut self) {
        let state = self.session.state();
        if state != self.last_state {
            let device = self.session.device_id().unwrap_or("-").to_owned();
            let msg = match state {
                LinkState::Open => format!("Stream open ({device})"),
                LinkState::Connecting => format!("Connecting to {device}..."),
                LinkState::Disconnected => format!("Stream closed ({device})"),
            };
            self.log(&msg);
            self.last_state = state;
        }
    }
}

fn write_png(path: &Path, png: &[u8]) -> Result<(), ViewerError> {
    std::fs::write(path, png)?;
    Ok(())
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // 1. 消息处理：逐个处理连接事件
        self.session.set_viewport_width(self.chart_area_width);
        self.session.pump();
        let now = Instant::now();
        self.session.tick(now);
        if let Some(at) = self.session.reconnect_pending() {
            ctx.request_repaint_after(at.saturating_duration_since(now));
        }
        self.track_state();

        // 2. UI 绘制
        let mut visuals = egui::Visuals::dark();
        visuals.widgets.noninteractive.bg_fill = Color32::from_rgb(10, 10, 15);
        ctx.set_visuals(visuals);

        egui::SidePanel::left("L").min_width(280.0).show(ctx, |ui| {
            ui.add_space(10.0);
            ui.heading("Telemetry Viewer");
            ui.separator();

            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.connection_mode, ConnectionMode::Live, "LIVE");
                ui.selectable_value(&mut self.connection_mode, ConnectionMode::Simulation, "SIM");
            });
            ui.horizontal(|ui| {
                ui.label("Device");
                ui.text_edit_singleline(&mut self.device_input);
            });

            let connected = self.session.state() != LinkState::Disconnected;
            let btn_txt = if connected { "DISCONNECT" } else { "CONNECT" };
            if ui.button(btn_txt).clicked() {
                if connected {
                    self.session.disconnect();
                } else {
                    self.connect();
                }
            }
            let (state_txt, state_col) = match self.session.state() {
                LinkState::Open => ("● open", Color32::GREEN),
                LinkState::Connecting => ("● connecting", Color32::YELLOW),
                LinkState::Disconnected => ("● disconnected", Color32::GRAY),
            };
            ui.label(RichText::new(state_txt).color(state_col));
            let (accepted, rejected) = self.session.frame_counts();
            ui.label(
                RichText::new(format!(
                    "{} samples buffered · {accepted} accepted · {rejected} dropped",
                    self.session.window().len()
                ))
                .small(),
            );

            ui.add_space(12.0);
            ui.label("READINGS");
            let indicators = self.session.render().indicators();
            ui.horizontal_wrapped(|ui| {
                for (metric, value) in indicators.readings() {
                    draw_indicator(ui, metric.label(), metric.unit(), value);
                }
                draw_indicator(ui, "Presence", "", indicators.presence());
            });

            ui.add_space(12.0);
            ui.separator();
            ui.label("EVENTS");
            egui::ScrollArea::vertical()
                .id_source("events")
                .max_height(180.0)
                .show(ui, |ui| {
                    if self.session.render().event_count() == 0 {
                        ui.label(RichText::new("none yet").small().color(Color32::GRAY));
                    }
                    for entry in self.session.render().event_log() {
                        ui.monospace(entry);
                    }
                });

            ui.add_space(10.0);
            egui::ScrollArea::vertical()
                .id_source("log")
                .max_height(100.0)
                .show(ui, |ui| {
                    for m in &self.log_messages {
                        ui.monospace(m);
                    }
                });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let width = ui.available_width();
            if (width - self.chart_area_width).abs() > 1.0 {
                self.chart_area_width = width;
                self.session.set_viewport_width(width);
                self.session.redraw();
            }
            ui.horizontal(|ui| {
                if self.session.window().is_empty() {
                    ui.label("Waiting for data.");
                }
                if ui.button("EXPORT PNG").clicked() {
                    self.export_charts();
                }
            });
            egui::ScrollArea::vertical().show(ui, |ui| {
                for metric in Metric::CHARTED {
                    if let Some(view) = self.session.render().chart(metric) {
                        draw_chart(ui, view);
                        ui.add_space(8.0);
                    }
                }
            });
        });
    }
}
