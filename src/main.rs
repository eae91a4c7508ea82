mod app;
mod assets;
mod config;
mod core;
mod game;
mod ui;

use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    // Startup default when config is missing or malformed.
    log::set_max_level(log::LevelFilter::Warn);

    config::load();
    log::set_max_level(config::get().log_level);

    let beatmap_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("beatmap.json"), PathBuf::from);

    app::run(beatmap_path)
}
