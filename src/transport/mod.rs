// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Master transport.
//!
//! This module provides:
//! - Canonical master state (transport, tempo, multiplier, volume, sync mode)
//! - The controller that owns it and exposes the command surface
//! - Snapshots for save/restore and undo/redo
//! - The emergency stop fast path

pub mod controller;
pub mod emergency;
pub mod history;

pub use controller::MasterTransportController;
pub use emergency::EmergencyLatch;
pub use history::{History, HistoryEntry, ReversibleCommand};

use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::song::SongInstanceState;
use crate::sync::SyncMode;

/// Default master tempo in BPM
pub const DEFAULT_TEMPO: f64 = 120.0;

/// Default tempo multiplier bounds
pub const DEFAULT_MULTIPLIER_MIN: f64 = 0.25;
pub const DEFAULT_MULTIPLIER_MAX: f64 = 4.0;

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Stopped => "stopped",
            TransportState::Playing => "playing",
            TransportState::Paused => "paused",
        };
        write!(f, "{}", name)
    }
}

/// Session-wide playback state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasterState {
    /// Transport state
    pub transport_state: TransportState,
    /// Master tempo in BPM (> 0)
    pub master_tempo: f64,
    /// Scale applied to the master tempo
    pub tempo_multiplier: f64,
    /// Master volume (0.0 - 1.0)
    pub master_volume: f64,
    /// Active sync mode
    pub sync_mode: SyncMode,
}

impl MasterState {
    /// Tempo songs are synchronized against
    pub fn effective_tempo(&self) -> f64 {
        self.master_tempo * self.tempo_multiplier
    }
}

impl Default for MasterState {
    fn default() -> Self {
        Self {
            transport_state: TransportState::Stopped,
            master_tempo: DEFAULT_TEMPO,
            tempo_multiplier: 1.0,
            master_volume: 1.0,
            sync_mode: SyncMode::Independent,
        }
    }
}

/// Sync data for one song inside a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongSnapshot {
    pub song_id: String,
    pub is_active: bool,
    #[serde(default)]
    pub baseline_tempo: Option<f64>,
    #[serde(default)]
    pub tempo_ratio: Option<f64>,
    /// Tempo last applied by the transport
    pub tempo: f64,
    /// Song-owned state, when the snapshot was taken for recall
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<SongInstanceState>,
}

/// Immutable copy of the master state plus per-song sync data.
///
/// Holds no live handles, so it can be stored anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub master: MasterState,
    #[serde(default)]
    pub songs: Vec<SongSnapshot>,
}

impl StateSnapshot {
    /// Sync data of one song
    pub fn song(&self, song_id: &str) -> Option<&SongSnapshot> {
        self.songs.iter().find(|song| song.song_id == song_id)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize snapshot to YAML")
    }

    /// Parse from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse snapshot YAML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_defaults() {
        let master = MasterState::default();
        assert_eq!(master.transport_state, TransportState::Stopped);
        assert_eq!(master.master_tempo, 120.0);
        assert_eq!(master.effective_tempo(), 120.0);
        assert_eq!(master.sync_mode, SyncMode::Independent);
    }

    #[test]
    fn test_effective_tempo() {
        let master = MasterState {
            master_tempo: 100.0,
            tempo_multiplier: 0.5,
            ..MasterState::default()
        };
        assert_eq!(master.effective_tempo(), 50.0);
    }

    #[test]
    fn test_snapshot_yaml() {
        let snapshot = StateSnapshot {
            master: MasterState {
                transport_state: TransportState::Paused,
                master_tempo: 96.0,
                tempo_multiplier: 1.5,
                master_volume: 0.8,
                sync_mode: SyncMode::Ratio,
            },
            songs: vec![SongSnapshot {
                song_id: "bass".to_string(),
                is_active: true,
                baseline_tempo: Some(72.0),
                tempo_ratio: Some(0.5),
                tempo: 72.0,
                instance: None,
            }],
        };

        let yaml = snapshot.to_yaml().unwrap();
        assert!(yaml.contains("sync_mode: ratio"));
        assert!(yaml.contains("transport_state: paused"));
        assert!(!yaml.contains("instance"));

        let parsed = StateSnapshot::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, snapshot);
        assert_eq!(parsed.song("bass").unwrap().tempo_ratio, Some(0.5));
        assert!(parsed.song("drums").is_none());
    }

    #[test]
    fn test_snapshot_rejects_garbage() {
        assert!(StateSnapshot::from_yaml("master: [").is_err());
    }
}
