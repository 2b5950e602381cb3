// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Published transport events.
//!
//! Observers (UI, automation, logging) subscribe to a broadcast channel and
//! never touch transport state directly.

use tokio::sync::broadcast;

use crate::sync::SyncMode;
use crate::transport::TransportState;

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Something observable changed in the session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Transport moved to a new state
    TransportChanged(TransportState),
    /// Master tempo or multiplier changed
    TempoChanged {
        master_tempo: f64,
        tempo_multiplier: f64,
        effective_tempo: f64,
    },
    /// Master volume changed
    VolumeChanged(f64),
    /// Synchronization mode changed
    SyncModeChanged(SyncMode),
    /// Ratio baselines were (re)captured
    BaselinesCaptured,
    /// A song was registered
    SongAdded(String),
    /// A song was removed
    SongRemoved(String),
    /// A song was activated or deactivated
    SongActivity { song_id: String, active: bool },
    /// A song's tempo transition ended
    TransitionFinished { song_id: String, completed: bool },
    /// A single song failed to apply a command
    SongFailed { song_id: String, error: String },
    /// A snapshot was restored (directly or through undo/redo)
    StateRestored,
    /// Emergency stop fired
    EmergencyStop,
}

/// Broadcast sender shared by the transport and the sync engine
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TransportEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event
    pub fn publish(&self, event: TransportEvent) {
        // No receivers is fine
        let _ = self.tx.send(event);
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
