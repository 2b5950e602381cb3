// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Song control abstraction.
//!
//! The rendering side of the player exposes each song through a
//! [`SongControlHandle`]. The synchronization core never touches audio;
//! it only drives these handles.

pub mod simulated;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::HandleError;

pub use simulated::SimulatedSong;

/// Playback state owned by a single song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongInstanceState {
    /// Tempo the song is running at
    pub tempo: f64,
    /// Song-owned volume (0.0 - 1.0), before master scaling
    pub volume: f64,
    /// Whether the song is currently producing audio
    pub is_playing: bool,
    /// Playback position in seconds
    pub position_seconds: f64,
}

impl Default for SongInstanceState {
    fn default() -> Self {
        Self {
            tempo: 120.0,
            volume: 1.0,
            is_playing: false,
            position_seconds: 0.0,
        }
    }
}

/// Control surface a song exposes to the transport.
///
/// Implementations must be cheap to call and safe from any thread: tempo
/// transitions write through [`set_tempo`](Self::set_tempo) from their own
/// timer threads.
pub trait SongControlHandle: Send + Sync {
    /// Stable identifier of the song
    fn id(&self) -> &str;

    /// Whether the song wants to take part in playback
    fn is_active(&self) -> bool;

    /// Tempo currently applied to the song
    fn current_tempo(&self) -> f64;

    /// Start or resume playback
    fn play(&self) -> Result<(), HandleError>;

    /// Pause, keeping the position
    fn pause(&self) -> Result<(), HandleError>;

    /// Stop and rewind
    fn stop(&self) -> Result<(), HandleError>;

    /// Set the mixed output level (song volume already scaled by master)
    fn set_volume(&self, volume: f64) -> Result<(), HandleError>;

    /// Set the song tempo
    fn set_tempo(&self, tempo: f64) -> Result<(), HandleError>;

    /// Capture the song-owned state
    fn get_state(&self) -> SongInstanceState;

    /// Restore previously captured song-owned state
    fn restore_state(&self, state: &SongInstanceState) -> Result<(), HandleError>;
}

impl std::fmt::Debug for dyn SongControlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongControlHandle").field("id", &self.id()).finish()
    }
}

/// Shared handle to a registered song
pub type SharedSong = Arc<dyn SongControlHandle>;

/// A song registered with the transport
#[derive(Clone)]
pub struct SongEntry {
    /// Control handle
    pub handle: SharedSong,
    /// Song identifier (copied from the handle at registration)
    pub song_id: String,
    /// Whether the song takes part in propagation
    pub is_active: bool,
    /// Tempo captured when ratio sync was entered
    pub baseline_tempo: Option<f64>,
    /// Ratio of this song's tempo to the effective master tempo
    pub tempo_ratio: Option<f64>,
    /// Last tempo the transport applied or targeted (never an in-flight value)
    pub applied_tempo: f64,
}

impl SongEntry {
    /// Create an entry for a newly registered handle
    pub fn new(handle: SharedSong) -> Self {
        Self {
            song_id: handle.id().to_string(),
            is_active: handle.is_active(),
            applied_tempo: handle.current_tempo(),
            baseline_tempo: None,
            tempo_ratio: None,
            handle,
        }
    }

    /// Clear ratio sync data
    pub fn clear_ratio(&mut self) {
        self.baseline_tempo = None;
        self.tempo_ratio = None;
    }
}

impl std::fmt::Debug for SongEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongEntry")
            .field("song_id", &self.song_id)
            .field("is_active", &self.is_active)
            .field("baseline_tempo", &self.baseline_tempo)
            .field("tempo_ratio", &self.tempo_ratio)
            .field("applied_tempo", &self.applied_tempo)
            .finish()
    }
}
