// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tempo transition scheduler.
//!
//! Each transition runs on its own timer thread and moves one song's tempo
//! along a [`TransitionCurve`]. A transition holds only its own lock while
//! ticking, so the command path can cancel it at any time without waiting
//! on shared state. Once [`TempoTransition::cancel`] returns, no further
//! tick of that transition can reach the song.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::easing::{TempoTransitionRecord, TransitionCurve};

/// Durations at or below this are applied immediately
pub const MIN_TRANSITION: Duration = Duration::from_millis(10);

/// Default interval between transition ticks
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Receives each intermediate tempo; returning `false` abandons the transition
pub type TickFn = Box<dyn FnMut(f64) -> bool + Send>;

/// Receives `true` when the target was reached, `false` when cancelled or abandoned
pub type CompleteFn = Box<dyn FnOnce(bool) + Send>;

/// Lifecycle of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    Running,
    Completed,
    Cancelled,
    /// A tick could not be applied
    Failed,
}

struct TransitionShared {
    phase: TransitionPhase,
    on_tick: TickFn,
    on_complete: Option<CompleteFn>,
}

impl TransitionShared {
    /// Mark finished and hand back the completion callback (at most once)
    fn finish(&mut self, phase: TransitionPhase) -> Option<CompleteFn> {
        if self.phase != TransitionPhase::Running {
            return None;
        }
        self.phase = phase;
        self.on_complete.take()
    }
}

/// A running (or finished) tempo transition for one song
pub struct TempoTransition {
    song_id: String,
    record: TempoTransitionRecord,
    shared: Arc<Mutex<TransitionShared>>,
    wake: Mutex<Option<Sender<()>>>,
}

impl TempoTransition {
    /// Song this transition drives
    pub fn song_id(&self) -> &str {
        &self.song_id
    }

    /// Start/target/timing of the transition
    pub fn record(&self) -> &TempoTransitionRecord {
        &self.record
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> TransitionPhase {
        self.shared.lock().phase
    }

    /// Check if the transition is still ticking
    pub fn is_running(&self) -> bool {
        self.phase() == TransitionPhase::Running
    }

    /// Stop the transition and report `on_complete(false)`.
    ///
    /// Idempotent; a finished transition is left untouched.
    pub fn cancel(&self) {
        let on_complete = self.shared.lock().finish(TransitionPhase::Cancelled);

        // Wake the timer so the thread exits now instead of at its next tick
        if let Some(wake) = self.wake.lock().take() {
            let _ = wake.send(());
        }

        if let Some(on_complete) = on_complete {
            debug!(song = %self.song_id, "Tempo transition cancelled");
            on_complete(false);
        }
    }
}

impl Drop for TempoTransition {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for TempoTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempoTransition")
            .field("song_id", &self.song_id)
            .field("record", &self.record)
            .field("phase", &self.phase())
            .finish()
    }
}

/// Starts tempo transitions with a fixed tick interval and curve.
///
/// Every transition gets its own OS thread, so a tempo change across N
/// songs briefly costs N threads. Threads exit on completion or cancel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoTransitionScheduler {
    tick_interval: Duration,
    curve: TransitionCurve,
}

impl TempoTransitionScheduler {
    /// Create a scheduler
    pub fn new(tick_interval: Duration, curve: TransitionCurve) -> Self {
        Self {
            tick_interval: tick_interval.max(Duration::from_millis(1)),
            curve,
        }
    }

    /// Interval between ticks
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Curve used for new transitions
    pub fn curve(&self) -> TransitionCurve {
        self.curve
    }

    /// Start moving a song from `start_tempo` to `target_tempo`.
    ///
    /// Durations up to [`MIN_TRANSITION`] apply the target immediately and
    /// report completion before returning.
    pub fn start(
        &self,
        song_id: &str,
        start_tempo: f64,
        target_tempo: f64,
        duration: Duration,
        on_tick: TickFn,
        on_complete: CompleteFn,
    ) -> TempoTransition {
        let record = TempoTransitionRecord::new(start_tempo, target_tempo, duration);
        let shared = Arc::new(Mutex::new(TransitionShared {
            phase: TransitionPhase::Running,
            on_tick,
            on_complete: Some(on_complete),
        }));

        let mut transition = TempoTransition {
            song_id: song_id.to_string(),
            record,
            shared: Arc::clone(&shared),
            wake: Mutex::new(None),
        };

        if duration <= MIN_TRANSITION {
            complete_now(&shared, target_tempo);
            return transition;
        }

        let (wake_tx, wake_rx) = mpsc::channel();
        let interval = self.tick_interval;
        let curve = self.curve;
        let timer_shared = Arc::clone(&shared);

        let spawned = thread::Builder::new()
            .name(format!("tempo-{}", song_id))
            .spawn(move || run_timer(wake_rx, timer_shared, record, interval, curve));

        match spawned {
            Ok(_) => {
                debug!(
                    song = %song_id,
                    from = start_tempo,
                    to = target_tempo,
                    duration_ms = duration.as_millis() as u64,
                    "Tempo transition started"
                );
                transition.wake = Mutex::new(Some(wake_tx));
            }
            Err(e) => {
                warn!(song = %song_id, error = %e, "Could not start transition timer; applying target directly");
                complete_now(&shared, target_tempo);
            }
        }

        transition
    }
}

impl Default for TempoTransitionScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL, TransitionCurve::default())
    }
}

fn complete_now(shared: &Mutex<TransitionShared>, target_tempo: f64) {
    let (on_complete, reached) = {
        let mut guard = shared.lock();
        let reached = (guard.on_tick)(target_tempo);
        let phase = if reached { TransitionPhase::Completed } else { TransitionPhase::Failed };
        (guard.finish(phase), reached)
    };
    if let Some(on_complete) = on_complete {
        on_complete(reached);
    }
}

fn run_timer(
    wake: Receiver<()>,
    shared: Arc<Mutex<TransitionShared>>,
    record: TempoTransitionRecord,
    interval: Duration,
    curve: TransitionCurve,
) {
    loop {
        match wake.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            // Cancelled, or the owner went away
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let progress = record.progress_at(Instant::now());
        let mut guard = shared.lock();
        if guard.phase != TransitionPhase::Running {
            break;
        }

        let tempo = record.tempo_at(progress, curve);
        if !(guard.on_tick)(tempo) {
            let on_complete = guard.finish(TransitionPhase::Failed);
            drop(guard);
            if let Some(on_complete) = on_complete {
                on_complete(false);
            }
            break;
        }

        if progress >= 1.0 {
            let on_complete = guard.finish(TransitionPhase::Completed);
            drop(guard);
            if let Some(on_complete) = on_complete {
                on_complete(true);
            }
            break;
        }
    }
}

/// The active transition per song.
///
/// Shared between the sync engine and the emergency path so that an
/// emergency stop can cancel every transition without the command lock.
#[derive(Debug, Default)]
pub struct TransitionTable {
    active: Mutex<HashMap<String, TempoTransition>>,
}

impl TransitionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the song's current transition, then install the one built by
    /// `start` (if any). Both happen under the table lock, so no tick of the
    /// old transition can land after the new one begins.
    pub fn replace_with<F>(&self, song_id: &str, start: F)
    where
        F: FnOnce() -> Option<TempoTransition>,
    {
        let mut active = self.active.lock();
        if let Some(previous) = active.remove(song_id) {
            previous.cancel();
        }
        if let Some(transition) = start() {
            if transition.is_running() {
                active.insert(song_id.to_string(), transition);
            }
        }
    }

    /// Cancel one song's transition; returns true if one was running
    pub fn cancel(&self, song_id: &str) -> bool {
        match self.active.lock().remove(song_id) {
            Some(transition) => {
                let was_running = transition.is_running();
                transition.cancel();
                was_running
            }
            None => false,
        }
    }

    /// Cancel every transition; returns how many were still running
    pub fn cancel_all(&self) -> usize {
        let mut active = self.active.lock();
        let mut cancelled = 0;
        for (_, transition) in active.drain() {
            if transition.is_running() {
                cancelled += 1;
            }
            transition.cancel();
        }
        cancelled
    }

    /// Number of transitions still ticking
    pub fn active_count(&self) -> usize {
        let mut active = self.active.lock();
        active.retain(|_, transition| transition.is_running());
        active.len()
    }

    /// Record of the song's running transition
    pub fn record(&self, song_id: &str) -> Option<TempoTransitionRecord> {
        self.active
            .lock()
            .get(song_id)
            .filter(|transition| transition.is_running())
            .map(|transition| *transition.record())
    }
}
