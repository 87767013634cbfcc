// src/main.rs
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
mod config;
mod debounce;
mod drivers;
mod engine;
mod gui;
mod types;
use eframe::egui;
use log::info;
use config::AppConfig;
fn main() -> eframe::Result<()> {
    env_logger::init();
    let config = AppConfig::load();
    info!("starting in {:?} mode", config.connection);
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1100.0, 760.0])
        .with_min_inner_size([900.0, 600.0])
        .with_title("Waveform Generator Panel");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "wavegen-panel",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Box::new(gui::WavegenApp::new(config))
        }),
    )
}
