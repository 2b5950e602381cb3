// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Error types for the synchronization core.
//!
//! Validation and missing-resource failures are returned to the caller as
//! [`SyncError`]. Failures inside a single song's control handle are
//! reported as [`HandleError`] and never abort a batch of songs.

use thiserror::Error;

/// Main error type for transport and sync commands
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Master or per-song tempo was zero, negative or not finite
    #[error("Invalid tempo: {0} (must be a finite value > 0)")]
    InvalidTempo(f64),

    /// Tempo multiplier outside the configured bounds
    #[error("Tempo multiplier {value} outside [{min}, {max}]")]
    MultiplierOutOfRange { value: f64, min: f64, max: f64 },

    /// Master volume outside [0, 1]
    #[error("Master volume {0} outside [0, 1]")]
    VolumeOutOfRange(f64),

    /// Tempo ratio was zero, negative or not finite
    #[error("Invalid tempo ratio: {0} (must be a finite value > 0)")]
    InvalidRatio(f64),

    /// Transition duration could not be represented
    #[error("Invalid transition duration: {0}")]
    InvalidDuration(String),

    /// No song registered under this id
    #[error("Song not found: {0}")]
    SongNotFound(String),

    /// A song with this id is already registered
    #[error("Song already registered: {0}")]
    DuplicateSong(String),

    /// Undo requested with an empty history
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Redo requested with an empty redo stack
    #[error("Nothing to redo")]
    NothingToRedo,

    /// Session configuration rejected
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// True for errors caused by an out-of-range or malformed input value
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidTempo(_)
                | SyncError::MultiplierOutOfRange { .. }
                | SyncError::VolumeOutOfRange(_)
                | SyncError::InvalidRatio(_)
                | SyncError::InvalidDuration(_)
        )
    }
}

/// Convenience Result type using [`SyncError`]
pub type Result<T> = std::result::Result<T, SyncError>;

/// Failure reported by a song's control handle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandleError {
    /// The rendering side has released the song
    #[error("song '{0}' is no longer available")]
    Unavailable(String),

    /// The rendering side refused the command
    #[error("song '{song_id}' rejected {command}: {reason}")]
    Rejected {
        song_id: String,
        command: &'static str,
        reason: String,
    },
}
