// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! In-memory song handle.
//!
//! Stands in for the rendering side in the demo binary and in tests.
//! Every tempo write is recorded so callers can inspect how a transition
//! moved the song.

use parking_lot::Mutex;

use super::{SongControlHandle, SongInstanceState};
use crate::error::HandleError;

#[derive(Debug)]
struct SimState {
    state: SongInstanceState,
    output_volume: f64,
    active: bool,
    failing: bool,
    tempo_writes: Vec<f64>,
    stop_count: usize,
}

/// Song handle that keeps its state in memory
#[derive(Debug)]
pub struct SimulatedSong {
    id: String,
    inner: Mutex<SimState>,
}

impl SimulatedSong {
    /// Create a stopped song at the given tempo
    pub fn new(id: impl Into<String>, tempo: f64) -> Self {
        Self {
            id: id.into(),
            inner: Mutex::new(SimState {
                state: SongInstanceState {
                    tempo,
                    ..SongInstanceState::default()
                },
                output_volume: 1.0,
                active: true,
                failing: false,
                tempo_writes: Vec::new(),
                stop_count: 0,
            }),
        }
    }

    /// Set the song-owned volume
    pub fn with_volume(self, volume: f64) -> Self {
        self.inner.lock().state.volume = volume;
        self
    }

    /// Mark the song inactive at registration time
    pub fn inactive(self) -> Self {
        self.inner.lock().active = false;
        self
    }

    /// Make every command fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    /// Whether the song is playing
    pub fn is_playing(&self) -> bool {
        self.inner.lock().state.is_playing
    }

    /// Output level last set by the transport
    pub fn output_volume(&self) -> f64 {
        self.inner.lock().output_volume
    }

    /// All tempo values written so far, oldest first
    pub fn tempo_writes(&self) -> Vec<f64> {
        self.inner.lock().tempo_writes.clone()
    }

    /// Number of tempo writes so far
    pub fn tempo_write_count(&self) -> usize {
        self.inner.lock().tempo_writes.len()
    }

    /// Number of times `stop` was called
    pub fn stop_count(&self) -> usize {
        self.inner.lock().stop_count
    }

    /// Advance the playback position (demo clock)
    pub fn advance(&self, seconds: f64) {
        let mut inner = self.inner.lock();
        if inner.state.is_playing {
            inner.state.position_seconds += seconds * inner.state.tempo / 120.0;
        }
    }

    fn check(&self, inner: &SimState, command: &'static str) -> Result<(), HandleError> {
        if inner.failing {
            Err(HandleError::Rejected {
                song_id: self.id.clone(),
                command,
                reason: "simulated failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl SongControlHandle for SimulatedSong {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    fn current_tempo(&self) -> f64 {
        self.inner.lock().state.tempo
    }

    fn play(&self) -> Result<(), HandleError> {
        let mut inner = self.inner.lock();
        self.check(&inner, "play")?;
        inner.state.is_playing = true;
        Ok(())
    }

    fn pause(&self) -> Result<(), HandleError> {
        let mut inner = self.inner.lock();
        self.check(&inner, "pause")?;
        inner.state.is_playing = false;
        Ok(())
    }

    fn stop(&self) -> Result<(), HandleError> {
        let mut inner = self.inner.lock();
        // Stop always succeeds so emergency silence cannot be refused
        inner.state.is_playing = false;
        inner.state.position_seconds = 0.0;
        inner.stop_count += 1;
        Ok(())
    }

    fn set_volume(&self, volume: f64) -> Result<(), HandleError> {
        let mut inner = self.inner.lock();
        self.check(&inner, "set_volume")?;
        inner.output_volume = volume;
        Ok(())
    }

    fn set_tempo(&self, tempo: f64) -> Result<(), HandleError> {
        let mut inner = self.inner.lock();
        self.check(&inner, "set_tempo")?;
        inner.state.tempo = tempo;
        inner.tempo_writes.push(tempo);
        Ok(())
    }

    fn get_state(&self) -> SongInstanceState {
        self.inner.lock().state.clone()
    }

    fn restore_state(&self, state: &SongInstanceState) -> Result<(), HandleError> {
        let mut inner = self.inner.lock();
        self.check(&inner, "restore_state")?;
        inner.state = state.clone();
        Ok(())
    }
}
