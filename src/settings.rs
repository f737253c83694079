use std::path::{Path, PathBuf};

use log::LevelFilter;

use crate::components::diff::DEFAULT_DIFF_BATCH_SIZE;
use crate::components::history::DEFAULT_MAX_HISTORY_ITEMS;
use crate::error::EngineError;
use crate::tiles::DEFAULT_TILE_SIZE;

const SETTINGS_FILE: &str = "tilecanvas_settings.cfg";
const DEFAULT_MAX_HISTORY_MEMORY: usize = 256 * 1024 * 1024;

/// How whole-layer snapshots (canvas resize history) are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotCodecKind {
    #[default]
    Png,
    Raw,
}

impl SnapshotCodecKind {
    fn as_str(self) -> &'static str {
        match self {
            SnapshotCodecKind::Png => "png",
            SnapshotCodecKind::Raw => "raw",
        }
    }
}

/// Engine tuning knobs, stored as a plain `key=value` file.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub tile_size: u32,
    pub max_history_items: usize,
    /// `None` disables the memory cap.
    pub max_history_memory_bytes: Option<usize>,
    pub diff_batch_size: usize,
    pub snapshot_codec: SnapshotCodecKind,
    pub log_level: LevelFilter,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            max_history_items: DEFAULT_MAX_HISTORY_ITEMS,
            max_history_memory_bytes: Some(DEFAULT_MAX_HISTORY_MEMORY),
            diff_batch_size: DEFAULT_DIFF_BATCH_SIZE,
            snapshot_codec: SnapshotCodecKind::Png,
            log_level: LevelFilter::Info,
        }
    }
}

impl EngineSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/tilecanvas/tilecanvas_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\tilecanvas\tilecanvas_settings.cfg
    /// On macOS:   ~/Library/Application Support/tilecanvas/tilecanvas_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("tilecanvas");
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("tilecanvas").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("tilecanvas")
                    .join(SETTINGS_FILE),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Load from the default location (defaults if the file is missing or unreadable).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else { return Self::default() };
        Self::parse(&content)
    }

    /// Unknown keys are ignored; unparsable values keep their default.
    pub fn parse(content: &str) -> Self {
        let defaults = Self::default();
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "tile_size" => {
                    s.tile_size = val.parse().ok().filter(|v| *v > 0).unwrap_or(defaults.tile_size);
                }
                "max_history_items" => {
                    s.max_history_items = val.parse().unwrap_or(defaults.max_history_items);
                }
                "max_history_memory_bytes" => {
                    s.max_history_memory_bytes = match val.parse::<usize>() {
                        Ok(0) => None,
                        Ok(v) => Some(v),
                        Err(_) => defaults.max_history_memory_bytes,
                    };
                }
                "diff_batch_size" => {
                    s.diff_batch_size = val.parse().ok().filter(|v| *v > 0).unwrap_or(defaults.diff_batch_size);
                }
                "snapshot_codec" => {
                    s.snapshot_codec = match val {
                        "raw" => SnapshotCodecKind::Raw,
                        _ => SnapshotCodecKind::Png,
                    };
                }
                "log_level" => {
                    s.log_level = val.parse().unwrap_or(defaults.log_level);
                }
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "tile_size={}\n\
             max_history_items={}\n\
             max_history_memory_bytes={}\n\
             diff_batch_size={}\n\
             snapshot_codec={}\n\
             log_level={}\n",
            self.tile_size,
            self.max_history_items,
            self.max_history_memory_bytes.unwrap_or(0),
            self.diff_batch_size,
            self.snapshot_codec.as_str(),
            self.log_level.as_str().to_lowercase(),
        )
    }

    pub fn save_to(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    pub fn save(&self) -> Result<(), EngineError> {
        match Self::settings_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }
}
