//! Configuration management for Stomp
//!
//! This module provides:
//! - The top-level TOML configuration (app settings, engine geometry, knobs)
//! - Named parameter presets stored as individual TOML files
//! - Hot-reload support for presets via a file system watcher

use crate::domain::audio::StreamConfig;
use crate::domain::params::Parameters;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("File watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding named parameter presets
    pub preset_dir: PathBuf,

    /// Reload the active preset when its file changes on disk
    pub watch_presets: bool,

    /// Preset applied at startup, if any
    pub startup_preset: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            preset_dir: PathBuf::from("presets"),
            watch_presets: false,
            startup_preset: None,
        }
    }
}

/// Complete Stomp configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StompConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub engine: StreamConfig,
    /// Active effect and knob positions restored at startup
    #[serde(default)]
    pub parameters: Parameters,
}

async fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).await?;
    Ok(toml::from_str(&contents)?)
}

async fn write_toml<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let toml_str = toml::to_string_pretty(value)?;
    fs::write(path, toml_str).await?;
    Ok(())
}

impl StompConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let config: Self = read_toml(path).await?;
        config
            .engine
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        write_toml(self, path).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Factory default: host default device, 48 kHz stereo i16, clean signal
    pub fn factory_default() -> Self {
        Self::default()
    }
}

/// File system watcher for preset hot-reload
pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
    config_tx: broadcast::Sender<PathBuf>,
}

impl ConfigWatcher {
    /// Watch `preset_dir` for created or modified `.toml` files
    pub async fn new(preset_dir: PathBuf) -> Result<Self> {
        use notify::Watcher;

        let (config_tx, _config_rx) = broadcast::channel(32);

        fs::create_dir_all(&preset_dir).await?;

        let tx_clone = config_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) {
                    for path in event.paths {
                        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                            if let Err(e) = tx_clone.send(path) {
                                debug!("No listener for preset change: {}", e);
                            }
                        }
                    }
                }
            }
        })?;

        watcher.watch(&preset_dir, notify::RecursiveMode::NonRecursive)?;

        info!(
            path = %preset_dir.display(),
            "Preset watcher started"
        );

        Ok(Self {
            _watcher: watcher,
            config_tx,
        })
    }

    /// Subscribe to preset change events
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.config_tx.subscribe()
    }
}

/// Named parameter presets, one TOML file each
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    pub fn preset_dir(&self) -> &Path {
        &self.preset_dir
    }

    /// File backing the preset called `name`
    pub fn preset_path(&self, name: &str) -> PathBuf {
        self.preset_dir.join(format!("{}.toml", name))
    }

    /// Preset name for a file inside the preset directory
    pub fn preset_name(path: &Path) -> Option<&str> {
        path.file_stem().and_then(|s| s.to_str())
    }

    /// List all available presets
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        if !self.preset_dir.exists() {
            return Ok(presets);
        }

        let mut entries = fs::read_dir(&self.preset_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                if let Some(name) = Self::preset_name(&path) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// Load a preset by name
    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<Parameters> {
        let path = self.preset_path(name);

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        self.load_preset_file(&path).await
    }

    /// Load a preset straight from its file, e.g. after a watcher event
    #[instrument(skip(self))]
    pub async fn load_preset_file(&self, path: &Path) -> Result<Parameters> {
        let params = read_toml(path).await?;
        debug!(path = %path.display(), "Preset loaded");
        Ok(params)
    }

    /// Save a preset by name
    #[instrument(skip(self, params))]
    pub async fn save_preset(&self, name: &str, params: &Parameters) -> Result<()> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!("bad preset name '{name}'")));
        }
        write_toml(params, &self.preset_path(name)).await?;
        info!(name, "Preset saved");
        Ok(())
    }

    /// Delete a preset by name
    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.preset_path(name);

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    pub async fn preset_exists(&self, name: &str) -> bool {
        self.preset_path(name).exists()
    }
}

/// Manages the main configuration file at `~/.config/stomp/config.toml`
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Manager for an explicit config file path
    pub fn with_path(config_path: PathBuf) -> Self {
        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            config_dir,
            config_path,
        }
    }

    /// `~/.config/stomp` on Linux, the platform config dir elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("stomp"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// A missing file is created with factory defaults. A corrupt file is
    /// copied aside as `config.toml.corrupt` and factory defaults are used.
    #[instrument(skip(self))]
    pub async fn load(&self) -> StompConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = StompConfig::factory_default();

            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }

            return config;
        }

        match StompConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                StompConfig::factory_default()
            }
        }
    }

    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &StompConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
