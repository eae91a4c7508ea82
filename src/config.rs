use log::{LevelFilter, info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

const CONFIG_PATH: &str = "storysync.ini";

// --- Minimal INI reader ---
#[derive(Debug, Default)]
pub struct SimpleIni {
    sections: HashMap<String, HashMap<String, String>>,
}

impl SimpleIni {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        self.load_str(&content);
        Ok(())
    }

    fn load_str(&mut self, content: &str) {
        self.sections.clear();
        let mut current_section: Option<String> = None;

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            // Section header: [SectionName]
            if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
                let section = line[1..line.len() - 1].trim().to_string();
                current_section = Some(section.clone());
                self.sections.entry(section).or_default();
                continue;
            }

            // Key/value pair: key=value
            if let Some(eq_idx) = line.find('=') {
                let (key_raw, value_raw) = line.split_at(eq_idx);
                let key = key_raw.trim();
                if key.is_empty() {
                    continue;
                }
                let value = value_raw[1..].trim().to_string();
                let section = current_section.clone().unwrap_or_default();
                self.sections
                    .entry(section)
                    .or_default()
                    .insert(key.to_string(), value);
            }
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.sections.get(section).and_then(|s| s.get(key)).cloned()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub display_width: u32,
    pub display_height: u32,
    pub log_level: LevelFilter,
    /// Feed perfect inputs instead of reading the keyboard.
    pub autoplay: bool,
    /// Playback rate multiplier applied to the song clock.
    pub music_rate: f32,
    /// Log per-frame draw statistics.
    pub show_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_width: 1280,
            display_height: 720,
            log_level: LevelFilter::Info,
            autoplay: false,
            music_rate: 1.0,
            show_stats: false,
        }
    }
}

// Global, mutable configuration instance.
static CONFIG: std::sync::LazyLock<Mutex<Config>> =
    std::sync::LazyLock::new(|| Mutex::new(Config::default()));

fn parse_log_level(s: &str) -> Option<LevelFilter> {
    match s.trim().to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

const fn log_level_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "Off",
        LevelFilter::Error => "Error",
        LevelFilter::Warn => "Warn",
        LevelFilter::Info => "Info",
        LevelFilter::Debug => "Debug",
        LevelFilter::Trace => "Trace",
    }
}

fn create_default_config_file() -> Result<(), std::io::Error> {
    info!("'{CONFIG_PATH}' not found, creating with default values.");
    let default = Config::default();

    let mut content = String::new();
    content.push_str("[Options]\n");
    content.push_str(&format!(
        "Autoplay={}\n",
        if default.autoplay { "1" } else { "0" }
    ));
    content.push_str(&format!("DisplayHeight={}\n", default.display_height));
    content.push_str(&format!("DisplayWidth={}\n", default.display_width));
    content.push_str(&format!("LogLevel={}\n", log_level_str(default.log_level)));
    content.push_str(&format!("MusicRate={}\n", default.music_rate));
    content.push_str(&format!(
        "ShowStats={}\n",
        if default.show_stats { "1" } else { "0" }
    ));
    content.push('\n');

    std::fs::write(CONFIG_PATH, content)
}

fn apply_ini(conf: &SimpleIni) {
    let mut cfg = CONFIG.lock().unwrap();
    let default = Config::default();

    cfg.display_width = conf
        .get("Options", "DisplayWidth")
        .and_then(|v| v.parse().ok())
        .unwrap_or(default.display_width);
    cfg.display_height = conf
        .get("Options", "DisplayHeight")
        .and_then(|v| v.parse().ok())
        .unwrap_or(default.display_height);
    cfg.log_level = conf
        .get("Options", "LogLevel")
        .and_then(|v| parse_log_level(&v))
        .unwrap_or(default.log_level);
    cfg.autoplay = conf
        .get("Options", "Autoplay")
        .and_then(|v| v.parse::<u8>().ok())
        .map_or(default.autoplay, |v| v != 0);
    cfg.music_rate = conf
        .get("Options", "MusicRate")
        .and_then(|v| v.parse::<f32>().ok())
        .map_or(default.music_rate, |v| v.clamp(0.25, 3.0));
    cfg.show_stats = conf
        .get("Options", "ShowStats")
        .and_then(|v| v.parse::<u8>().ok())
        .map_or(default.show_stats, |v| v != 0);
}

pub fn load() {
    if !Path::new(CONFIG_PATH).exists()
        && let Err(e) = create_default_config_file()
    {
        warn!("Failed to create default config file: {e}");
    }

    let mut conf = SimpleIni::new();
    match conf.load(CONFIG_PATH) {
        Ok(()) => {
            apply_ini(&conf);
            info!("Configuration loaded from '{CONFIG_PATH}'.");
        }
        Err(e) => {
            warn!("Failed to load '{CONFIG_PATH}': {e}. Using default values.");
        }
    }
}

pub fn get() -> Config {
    *CONFIG.lock().unwrap()
}
