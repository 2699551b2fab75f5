// src/main.rs
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
mod config;
mod gui;
mod render;
mod session;
mod simulator;
mod stream;
mod telemetry;
mod types;
mod visualizer;
use std::path::PathBuf;
use anyhow::anyhow;
use eframe::egui;
use log::info;
use crate::config::ViewerConfig;

// 入口函数：可选的第一个参数是 JSON 配置文件
fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = ViewerConfig::load(config_path.as_deref())?;
    info!(
        "starting viewer: {} mode, base {}, device {}",
        config.mode.label(),
        config.base_url,
        config.device_id
    );

    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1280.0, 860.0])
        .with_min_inner_size([900.0, 600.0])
        .with_title("Telemetry Viewer");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "Telemetry Viewer",
        options,
        Box::new(move |cc| Box::new(gui::ViewerApp::new(cc, config))),
    )
    .map_err(|err| anyhow!("window loop failed: {err}"))
}
