// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Configuration system for syncplay.
//!
//! This module provides the session configuration: master defaults,
//! multiplier bounds, transition behaviour, undo depth and event
//! buffering. Files may be YAML or TOML.

pub mod watcher;

pub use watcher::{validate_config, ConfigEvent, ConfigWatcher};

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::sync::{SyncMode, TransitionCurve, TransitionSettings};
use crate::transport::history::DEFAULT_HISTORY_DEPTH;
use crate::transport::{DEFAULT_MULTIPLIER_MAX, DEFAULT_MULTIPLIER_MIN, DEFAULT_TEMPO};

/// Root configuration for a playback session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionConfig {
    /// Initial master state
    #[serde(default)]
    pub master: MasterConfig,
    /// Tempo multiplier settings
    #[serde(default)]
    pub tempo: TempoConfig,
    /// Tempo transition behaviour
    #[serde(default)]
    pub transitions: TransitionConfig,
    /// Undo history
    #[serde(default)]
    pub history: HistoryConfig,
    /// Event publication
    #[serde(default)]
    pub events: EventConfig,
}

impl SessionConfig {
    /// Load a session configuration, YAML or TOML by file extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        if is_toml(path) {
            Self::from_toml(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    /// Parse a session configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Parse a session configuration from TOML string
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse TOML configuration")
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).context("Failed to serialize configuration to TOML")
    }

    /// Save configuration, YAML or TOML by file extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = if is_toml(path) { self.to_toml()? } else { self.to_yaml()? };
        fs::write(path, text).with_context(|| format!("Failed to write config file: {:?}", path))
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        let master = &self.master;
        if !master.tempo.is_finite() || master.tempo <= 0.0 {
            bail!("master.tempo must be > 0 (got {})", master.tempo);
        }
        if !(0.0..=1.0).contains(&master.volume) {
            bail!("master.volume must be within [0, 1] (got {})", master.volume);
        }

        let tempo = &self.tempo;
        if !tempo.multiplier_min.is_finite() || tempo.multiplier_min <= 0.0 {
            bail!("tempo.multiplier_min must be > 0 (got {})", tempo.multiplier_min);
        }
        if !tempo.multiplier_max.is_finite() || tempo.multiplier_max < tempo.multiplier_min {
            bail!(
                "tempo.multiplier_max must be >= multiplier_min (got {} < {})",
                tempo.multiplier_max,
                tempo.multiplier_min
            );
        }
        if !(tempo.multiplier_min..=tempo.multiplier_max).contains(&tempo.multiplier) {
            bail!(
                "tempo.multiplier {} outside [{}, {}]",
                tempo.multiplier,
                tempo.multiplier_min,
                tempo.multiplier_max
            );
        }

        if self.transitions.tick_interval_ms == 0 {
            bail!("transitions.tick_interval_ms must be > 0");
        }
        if self.events.capacity == 0 {
            bail!("events.capacity must be > 0");
        }
        Ok(())
    }

    /// Transition settings for the sync engine
    pub fn transition_settings(&self) -> TransitionSettings {
        TransitionSettings {
            smooth: self.transitions.smooth,
            duration: Duration::from_millis(self.transitions.duration_ms),
            tick_interval: Duration::from_millis(self.transitions.tick_interval_ms),
            curve: self.transitions.curve,
        }
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "toml")
}

/// Initial master state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MasterConfig {
    /// Master tempo in BPM
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    /// Master volume (0.0 - 1.0)
    #[serde(default = "default_volume")]
    pub volume: f64,
    /// Sync mode at session start
    #[serde(default)]
    pub sync_mode: SyncMode,
}

fn default_tempo() -> f64 {
    DEFAULT_TEMPO
}
fn default_volume() -> f64 {
    1.0
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            tempo: default_tempo(),
            volume: default_volume(),
            sync_mode: SyncMode::default(),
        }
    }
}

/// Tempo multiplier settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TempoConfig {
    /// Multiplier at session start
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Lowest accepted multiplier
    #[serde(default = "default_multiplier_min")]
    pub multiplier_min: f64,
    /// Highest accepted multiplier
    #[serde(default = "default_multiplier_max")]
    pub multiplier_max: f64,
}

fn default_multiplier() -> f64 {
    1.0
}
fn default_multiplier_min() -> f64 {
    DEFAULT_MULTIPLIER_MIN
}
fn default_multiplier_max() -> f64 {
    DEFAULT_MULTIPLIER_MAX
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            multiplier: default_multiplier(),
            multiplier_min: default_multiplier_min(),
            multiplier_max: default_multiplier_max(),
        }
    }
}

/// Tempo transition behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionConfig {
    /// Ease between tempos instead of stepping
    #[serde(default = "default_smooth")]
    pub smooth: bool,
    /// Transition length in milliseconds
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    /// Tick interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Transition curve
    #[serde(default)]
    pub curve: TransitionCurve,
}

fn default_smooth() -> bool {
    true
}
fn default_duration_ms() -> u64 {
    500
}
fn default_tick_interval_ms() -> u64 {
    10
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            smooth: default_smooth(),
            duration_ms: default_duration_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            curve: TransitionCurve::default(),
        }
    }
}

/// Undo history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryConfig {
    /// Maximum undo steps (0 disables undo)
    #[serde(default = "default_depth")]
    pub depth: usize,
}

fn default_depth() -> usize {
    DEFAULT_HISTORY_DEPTH
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { depth: default_depth() }
    }
}

/// Event publication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventConfig {
    /// Events buffered per subscriber
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { capacity: default_capacity() }
    }
}
