// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Sync mode engine.
//!
//! Decides the tempo each active song should run at for a given effective
//! master tempo, and applies it either directly or through an eased
//! transition. The engine is owned by the transport's serialized context;
//! only the transition table is shared with the emergency path.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::easing::TransitionCurve;
use super::transition::{
    CompleteFn, TempoTransitionScheduler, TickFn, TransitionTable, DEFAULT_TICK_INTERVAL,
    MIN_TRANSITION,
};
use super::{PropagationReport, SyncMode};
use crate::error::{HandleError, Result, SyncError};
use crate::events::{EventBus, TransportEvent};
use crate::song::SongEntry;
use crate::transport::EmergencyLatch;

/// Tempos closer than this are considered equal
pub(crate) const TEMPO_EPSILON: f64 = 1e-9;

/// How tempo changes reach the songs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionSettings {
    /// Ease between tempos instead of stepping
    pub smooth: bool,
    /// Length of each transition
    pub duration: Duration,
    /// Interval between transition ticks
    pub tick_interval: Duration,
    /// Transition curve
    pub curve: TransitionCurve,
}

impl TransitionSettings {
    /// True when changes should be written straight to the song
    pub fn is_immediate(&self) -> bool {
        !self.smooth || self.duration <= MIN_TRANSITION
    }
}

impl Default for TransitionSettings {
    fn default() -> Self {
        Self {
            smooth: true,
            duration: Duration::from_millis(500),
            tick_interval: DEFAULT_TICK_INTERVAL,
            curve: TransitionCurve::EaseInOutCubic,
        }
    }
}

/// Applies the active sync mode to registered songs
pub struct SyncModeEngine {
    mode: SyncMode,
    settings: TransitionSettings,
    scheduler: TempoTransitionScheduler,
    transitions: Arc<TransitionTable>,
    latch: Arc<EmergencyLatch>,
    events: EventBus,
}

impl SyncModeEngine {
    /// Create an engine in independent mode
    pub fn new(
        settings: TransitionSettings,
        transitions: Arc<TransitionTable>,
        latch: Arc<EmergencyLatch>,
        events: EventBus,
    ) -> Self {
        Self {
            mode: SyncMode::Independent,
            scheduler: TempoTransitionScheduler::new(settings.tick_interval, settings.curve),
            settings,
            transitions,
            latch,
            events,
        }
    }

    /// Active sync mode
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Current transition settings
    pub fn settings(&self) -> TransitionSettings {
        self.settings
    }

    /// Replace the transition settings (running transitions keep theirs)
    pub fn set_settings(&mut self, settings: TransitionSettings) {
        self.scheduler = TempoTransitionScheduler::new(settings.tick_interval, settings.curve);
        self.settings = settings;
    }

    /// Turn eased transitions on or off
    pub fn set_smooth_transitions(&mut self, smooth: bool) {
        self.settings.smooth = smooth;
    }

    /// Set the length of future transitions
    pub fn set_transition_duration(&mut self, duration: Duration) {
        self.settings.duration = duration;
    }

    /// Shared table of running transitions
    pub fn transitions(&self) -> &Arc<TransitionTable> {
        &self.transitions
    }

    /// Number of transitions still ticking
    pub fn active_transition_count(&self) -> usize {
        self.transitions.active_count()
    }

    /// Switch sync mode and propagate the current tempo under the new rule.
    ///
    /// Leaving ratio mode drops every baseline and ratio; entering it with
    /// no baseline captures fresh ones from the songs' settled tempos.
    pub fn set_sync_mode(
        &mut self,
        mode: SyncMode,
        songs: &mut [SongEntry],
        effective_tempo: f64,
    ) -> PropagationReport {
        if mode == self.mode {
            return PropagationReport::new();
        }

        let previous = self.mode;
        if previous == SyncMode::Ratio {
            songs.iter_mut().for_each(SongEntry::clear_ratio);
        }
        self.mode = mode;
        info!(from = %previous, to = %mode, "Sync mode changed");

        if mode == SyncMode::Ratio && !songs.iter().any(|s| s.baseline_tempo.is_some()) {
            self.capture_baseline_tempos(songs, effective_tempo);
        }

        self.apply_master_tempo(effective_tempo, songs)
    }

    /// Set the mode without capturing or clearing anything (snapshot restore)
    pub fn restore_mode(&mut self, mode: SyncMode) {
        self.mode = mode;
    }

    /// Tempo a song has settled on: the target of its running transition,
    /// otherwise whatever the song reports
    fn settled_tempo(&self, entry: &SongEntry) -> f64 {
        self.transitions
            .record(&entry.song_id)
            .map(|record| record.target_tempo)
            .unwrap_or_else(|| entry.handle.current_tempo())
    }

    /// Record each active song's settled tempo as its baseline and derive
    /// its ratio to the effective master tempo
    pub fn capture_baseline_tempos(&self, songs: &mut [SongEntry], effective_tempo: f64) {
        for entry in songs.iter_mut().filter(|entry| entry.is_active) {
            let baseline = self.settled_tempo(entry);
            entry.applied_tempo = baseline;
            entry.baseline_tempo = Some(baseline);
            entry.tempo_ratio = Some(baseline / effective_tempo);
            debug!(
                song = %entry.song_id,
                baseline,
                ratio = baseline / effective_tempo,
                "Baseline captured"
            );
        }
        self.events.publish(TransportEvent::BaselinesCaptured);
    }

    /// Override one song's ratio
    pub fn set_tempo_ratio(&self, songs: &mut [SongEntry], song_id: &str, ratio: f64) -> Result<()> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(SyncError::InvalidRatio(ratio));
        }
        let entry = songs
            .iter_mut()
            .find(|entry| entry.song_id == song_id)
            .ok_or_else(|| SyncError::SongNotFound(song_id.to_string()))?;
        entry.tempo_ratio = Some(ratio);
        debug!(song = %song_id, ratio, "Tempo ratio set");
        Ok(())
    }

    /// Set every ratio back to 1.0 (baselines untouched)
    pub fn reset_tempo_ratios(&self, songs: &mut [SongEntry]) {
        for entry in songs.iter_mut() {
            entry.tempo_ratio = Some(1.0);
        }
        debug!(count = songs.len(), "Tempo ratios reset");
    }

    /// Tempo the active mode wants for this song, `None` in independent mode
    pub fn target_tempo(&self, entry: &SongEntry, effective_tempo: f64) -> Option<f64> {
        match self.mode {
            SyncMode::Independent => None,
            SyncMode::Locked => Some(effective_tempo),
            SyncMode::Ratio => {
                let ratio = entry.tempo_ratio.unwrap_or_else(|| {
                    warn!(song = %entry.song_id, "No tempo ratio captured; using 1.0");
                    1.0
                });
                Some(effective_tempo * ratio)
            }
        }
    }

    /// Propagate an effective master tempo to every active song
    pub fn apply_master_tempo(&self, effective_tempo: f64, songs: &mut [SongEntry]) -> PropagationReport {
        let mut report = PropagationReport::new();
        if self.mode == SyncMode::Independent {
            return report;
        }

        for entry in songs.iter_mut().filter(|entry| entry.is_active) {
            if self.latch.is_tripped() {
                warn!("Tempo propagation interrupted by emergency stop");
                report.interrupted = true;
                break;
            }
            if let Some(target) = self.target_tempo(entry, effective_tempo) {
                self.apply_song_tempo(entry, target, &mut report);
            }
        }

        debug!(
            mode = %self.mode,
            effective_tempo,
            songs = report.targets.len(),
            transitions = report.transitions_started,
            failures = report.failures.len(),
            "Master tempo propagated"
        );
        report
    }

    /// Move one song to `target`, directly or through a transition
    pub fn apply_song_tempo(&self, entry: &mut SongEntry, target: f64, report: &mut PropagationReport) {
        if self.settings.is_immediate() {
            self.transitions.cancel(&entry.song_id);
            match entry.handle.set_tempo(target) {
                Ok(()) => {
                    entry.applied_tempo = target;
                    report.targets.push((entry.song_id.clone(), target));
                }
                Err(e) => self.reject(&entry.song_id, e, report),
            }
            return;
        }

        let handle = &entry.handle;
        let song_id = entry.song_id.as_str();
        let duration = self.settings.duration;
        let mut started = false;
        let mut rejected = None;

        self.transitions.replace_with(song_id, || {
            // Start from where the song really is, so the curve joins smoothly
            let current = handle.current_tempo();
            if (current - target).abs() < TEMPO_EPSILON {
                return None;
            }
            // The first write is synchronous; a refusal means no transition
            if let Err(e) = handle.set_tempo(current) {
                rejected = Some(e);
                return None;
            }
            started = true;

            let weak = Arc::downgrade(handle);
            let tick_id = song_id.to_string();
            let tick_events = self.events.clone();
            let on_tick: TickFn = Box::new(move |tempo| {
                let Some(handle) = weak.upgrade() else {
                    trace!(song = %tick_id, "Song gone; transition abandoned");
                    return false;
                };
                match handle.set_tempo(tempo) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(song = %tick_id, error = %e, "Song rejected transition tick");
                        tick_events.publish(TransportEvent::SongFailed {
                            song_id: tick_id.clone(),
                            error: e.to_string(),
                        });
                        false
                    }
                }
            });

            let events = self.events.clone();
            let done_id = song_id.to_string();
            let on_complete: CompleteFn = Box::new(move |completed| {
                events.publish(TransportEvent::TransitionFinished {
                    song_id: done_id,
                    completed,
                });
            });

            Some(self.scheduler.start(song_id, current, target, duration, on_tick, on_complete))
        });

        if let Some(e) = rejected {
            self.reject(song_id, e, report);
            return;
        }

        entry.applied_tempo = target;
        report.targets.push((entry.song_id.clone(), target));
        if started {
            report.transitions_started += 1;
        }
    }

    fn reject(&self, song_id: &str, error: HandleError, report: &mut PropagationReport) {
        warn!(song = %song_id, error = %error, "Song rejected tempo change");
        self.events.publish(TransportEvent::SongFailed {
            song_id: song_id.to_string(),
            error: error.to_string(),
        });
        report.record_failure(song_id, error);
    }

    /// Cancel one song's transition
    pub fn cancel_transition(&self, song_id: &str) -> bool {
        self.transitions.cancel(song_id)
    }

    /// Cancel every running transition
    pub fn cancel_all_transitions(&self) -> usize {
        self.transitions.cancel_all()
    }
}
