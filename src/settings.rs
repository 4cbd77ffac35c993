//! Demo settings
//!
//! Read from `drift/settings.toml` under the platform config directory. The
//! first run writes the defaults there so they can be tuned by hand.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use drift_game::WorldConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// All settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub input: InputSettings,
    pub demo: DemoSettings,
    /// Simulation, network and locomotion tuning
    pub world: WorldConfig,
}

impl Settings {
    pub fn path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("drift").join("settings.toml"))
    }

    /// Settings for this run. Any problem with the file falls back to the
    /// built-in tuning rather than stopping the demo.
    pub fn load_or_init() -> Self {
        let Some(path) = Self::path() else {
            warn!("No config directory on this platform, running with built-in tuning");
            return Self::default();
        };
        if !path.exists() {
            let settings = Self::default();
            match settings.save_to(&path) {
                Ok(()) => info!("Wrote default tuning to {}", path.display()),
                Err(e) => warn!("{:#}", e),
            }
            return settings;
        }
        Self::load_from(&path).unwrap_or_else(|e| {
            warn!("{:#}, running with built-in tuning", e);
            Self::default()
        })
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read drift settings at {}", path.display()))?;
        let settings = toml::from_str(&text)
            .with_context(|| format!("Bad drift settings in {}", path.display()))?;
        info!("Drift tuning loaded from {}", path.display());
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
        }
        let text = toml::to_string_pretty(self).context("Cannot encode drift settings")?;
        fs::write(path, text)
            .with_context(|| format!("Cannot write drift settings to {}", path.display()))
    }
}

/// Input settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    /// Mouse sensitivity multiplier
    pub mouse_sensitivity: f32,
    /// Invert Y axis
    pub invert_y: bool,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            mouse_sensitivity: 1.0,
            invert_y: false,
        }
    }
}

/// Headless demo run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    /// Render frames to simulate
    pub frames: u32,
    /// Render frames per second
    pub frame_rate: f32,
    /// One-way loopback latency in seconds
    pub latency: f32,
    /// Extra random delay per packet, up to this many seconds
    pub jitter: f32,
    pub seed: u64,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            frames: 600,
            frame_rate: 60.0,
            latency: 0.05,
            jitter: 0.04,
            seed: 7,
        }
    }
}
