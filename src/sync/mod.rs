// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tempo synchronization between songs.
//!
//! This module provides:
//! - Sync modes deciding how master tempo changes reach each song
//! - Eased tempo transitions on dedicated timers
//! - Per-propagation reports that isolate failing songs

pub mod easing;
pub mod engine;
pub mod transition;

pub use easing::{ease_in_out_cubic, TempoTransitionRecord, TransitionCurve};
pub use engine::{SyncModeEngine, TransitionSettings};
pub use transition::{
    TempoTransition, TempoTransitionScheduler, TransitionPhase, TransitionTable, MIN_TRANSITION,
};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HandleError;

/// How master tempo changes propagate to songs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Songs keep their own tempo
    #[default]
    Independent,
    /// Every song follows the effective master tempo
    Locked,
    /// Every song keeps a fixed ratio to the effective master tempo
    Ratio,
}

impl SyncMode {
    /// All modes
    pub fn all() -> &'static [SyncMode] {
        &[SyncMode::Independent, SyncMode::Locked, SyncMode::Ratio]
    }

    /// Lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            SyncMode::Independent => "independent",
            SyncMode::Locked => "locked",
            SyncMode::Ratio => "ratio",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "independent" | "free" => Ok(SyncMode::Independent),
            "locked" | "lock" => Ok(SyncMode::Locked),
            "ratio" => Ok(SyncMode::Ratio),
            other => Err(format!("Unknown sync mode: {}", other)),
        }
    }
}

/// A song that failed during a batch command
#[derive(Debug, Clone, PartialEq)]
pub struct SongFailure {
    pub song_id: String,
    pub error: HandleError,
}

/// Outcome of a command applied across songs.
///
/// Failures here are non-fatal: the other songs were still updated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropagationReport {
    /// Songs that received a new target tempo, with that target
    pub targets: Vec<(String, f64)>,
    /// How many of those targets are being reached through a transition
    pub transitions_started: usize,
    /// Songs whose handle refused the command
    pub failures: Vec<SongFailure>,
    /// Propagation stopped early because of an emergency stop
    pub interrupted: bool,
}

impl PropagationReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no song failed and nothing was interrupted
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.interrupted
    }

    /// Target assigned to a song, if any
    pub fn target_for(&self, song_id: &str) -> Option<f64> {
        self.targets
            .iter()
            .find(|(id, _)| id == song_id)
            .map(|(_, tempo)| *tempo)
    }

    /// Record a per-song failure
    pub fn record_failure(&mut self, song_id: &str, error: HandleError) {
        self.failures.push(SongFailure {
            song_id: song_id.to_string(),
            error,
        });
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: PropagationReport) {
        self.targets.extend(other.targets);
        self.transitions_started += other.transitions_started;
        self.failures.extend(other.failures);
        self.interrupted |= other.interrupted;
    }
}
