// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Emergency stop fast path.
//!
//! Silencing must not wait behind the command lock, so the emergency path
//! keeps its own roster of song handles and shares the transition table
//! with the sync engine. The latch tells in-flight commands to stop
//! touching songs and tells the next holder of the command lock to force
//! the canonical state to stopped/silent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::song::SharedSong;
use crate::sync::TransitionTable;

/// Set by an emergency stop, cleared once the command path has applied it
#[derive(Debug, Default)]
pub struct EmergencyLatch {
    tripped: AtomicBool,
}

impl EmergencyLatch {
    /// Raise the latch
    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    /// Check if an emergency stop is pending
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Clear the latch, returning whether it was raised
    pub fn take(&self) -> bool {
        self.tripped.swap(false, Ordering::SeqCst)
    }
}

/// Everything an emergency stop needs, reachable without the command lock
#[derive(Debug)]
pub(crate) struct EmergencyPath {
    pub(crate) latch: Arc<EmergencyLatch>,
    pub(crate) transitions: Arc<TransitionTable>,
    roster: RwLock<Vec<SharedSong>>,
}

impl EmergencyPath {
    pub(crate) fn new() -> Self {
        Self {
            latch: Arc::new(EmergencyLatch::default()),
            transitions: Arc::new(TransitionTable::new()),
            roster: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, handle: SharedSong) {
        self.roster.write().push(handle);
    }

    pub(crate) fn unregister(&self, song_id: &str) {
        self.roster.write().retain(|handle| handle.id() != song_id);
    }

    /// Cancel every transition, then stop and mute every song.
    /// Returns the number of transitions that were still running.
    pub(crate) fn silence(&self) -> usize {
        let cancelled = self.transitions.cancel_all();
        for handle in self.roster.read().iter() {
            if let Err(e) = handle.stop() {
                warn!(song = %handle.id(), error = %e, "Song refused emergency stop");
            }
            if let Err(e) = handle.set_volume(0.0) {
                warn!(song = %handle.id(), error = %e, "Song refused emergency mute");
            }
        }
        cancelled
    }
}
