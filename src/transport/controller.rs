// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Master transport controller.
//!
//! Owns the canonical [`MasterState`] and the registered songs behind a
//! single mutex; every command runs with that lock held, so commands are
//! applied one at a time in the order they acquire it. The emergency stop
//! is the exception: it silences songs through [`EmergencyPath`] without
//! taking the command lock, then leaves a latch that forces the canonical
//! state to stopped/silent as soon as the lock is next held.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::emergency::{EmergencyLatch, EmergencyPath};
use super::history::{History, HistoryEntry, ReversibleCommand};
use super::{MasterState, SongSnapshot, StateSnapshot, TransportState};
use crate::config::SessionConfig;
use crate::error::{HandleError, Result, SyncError};
use crate::events::{EventBus, TransportEvent};
use crate::song::{SharedSong, SongEntry};
use crate::sync::engine::TEMPO_EPSILON;
use crate::sync::{PropagationReport, SyncMode, SyncModeEngine, TransitionSettings};
use crate::timing::TapTempo;

/// Which parts of a snapshot a restore applies
#[derive(Debug, Clone, Copy)]
enum RestoreScope<'a> {
    /// Everything, including transport state and song-owned state
    Full,
    /// Master parameters and sync data only; used by undo/redo.
    ///
    /// `from` is the state the history entry left behind. A song whose tempo
    /// no longer matches it was retuned since, and keeps its tempo.
    Parameters { from: &'a StateSnapshot },
}

/// State guarded by the command lock
struct ControllerInner {
    master: MasterState,
    songs: Vec<SongEntry>,
    engine: SyncModeEngine,
    history: History,
    tap: TapTempo,
    multiplier_min: f64,
    multiplier_max: f64,
    latch: Arc<EmergencyLatch>,
    events: EventBus,
}

/// Session-wide playback owner and public command surface
pub struct MasterTransportController {
    inner: Mutex<ControllerInner>,
    urgent: EmergencyPath,
    events: EventBus,
}

impl MasterTransportController {
    /// Create a controller from a session configuration
    pub fn new(config: &SessionConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SyncError::Config(format!("{:#}", e)))?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: &SessionConfig) -> Self {
        let events = EventBus::new(config.events.capacity);
        let urgent = EmergencyPath::new();

        let mut engine = SyncModeEngine::new(
            config.transition_settings(),
            Arc::clone(&urgent.transitions),
            Arc::clone(&urgent.latch),
            events.clone(),
        );
        engine.restore_mode(config.master.sync_mode);

        let master = MasterState {
            transport_state: TransportState::Stopped,
            master_tempo: config.master.tempo,
            tempo_multiplier: config.tempo.multiplier,
            master_volume: config.master.volume,
            sync_mode: config.master.sync_mode,
        };

        info!(
            tempo = master.master_tempo,
            mode = %master.sync_mode,
            smooth = config.transitions.smooth,
            "Transport created"
        );

        Self {
            inner: Mutex::new(ControllerInner {
                master,
                songs: Vec::new(),
                engine,
                history: History::new(config.history.depth),
                tap: TapTempo::default(),
                multiplier_min: config.tempo.multiplier_min,
                multiplier_max: config.tempo.multiplier_max,
                latch: Arc::clone(&urgent.latch),
                events: events.clone(),
            }),
            urgent,
            events,
        }
    }

    /// Subscribe to transport events
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    /// Run a command with the command lock held, applying any pending
    /// emergency stop before and after it
    fn run<T>(&self, command: impl FnOnce(&mut ControllerInner) -> T) -> T {
        let mut inner = self.inner.lock();
        self.settle(&mut *inner);
        let result = command(&mut *inner);
        self.settle(&mut *inner);
        result
    }

    fn settle(&self, inner: &mut ControllerInner) {
        if self.urgent.latch.take() {
            // Songs may have been started by the command that was in flight
            self.urgent.silence();
            inner.force_silent();
        }
    }

    /// Start every active song
    pub fn play(&self) -> PropagationReport {
        self.run(|inner| inner.play())
    }

    /// Pause every active song; does nothing unless playing
    pub fn pause(&self) -> PropagationReport {
        self.run(|inner| inner.pause())
    }

    /// Stop and rewind every active song
    pub fn stop(&self) -> PropagationReport {
        self.run(|inner| inner.stop())
    }

    /// Silence everything now.
    ///
    /// Cancels every transition, stops and mutes every registered song, and
    /// forces the transport to stopped with master volume 0. Never waits
    /// for a command in progress.
    pub fn emergency_stop(&self) {
        self.urgent.latch.trip();
        let cancelled = self.urgent.silence();

        if let Some(mut inner) = self.inner.try_lock() {
            self.urgent.latch.take();
            inner.force_silent();
        }

        error!(cancelled_transitions = cancelled, "Emergency stop");
        self.events.publish(TransportEvent::EmergencyStop);
    }

    /// Set the master tempo and propagate it under the active sync mode
    pub fn set_master_tempo(&self, tempo: f64, undoable: bool) -> Result<PropagationReport> {
        validate_tempo(tempo)?;
        self.run(|inner| inner.set_master_tempo(tempo, undoable))
    }

    /// Move the master tempo by `delta` BPM
    pub fn nudge_master_tempo(&self, delta: f64) -> Result<PropagationReport> {
        self.run(|inner| {
            let tempo = inner.master.master_tempo + delta;
            validate_tempo(tempo)?;
            inner.set_master_tempo(tempo, true)
        })
    }

    /// Register a tap; once enough taps have landed the averaged BPM
    /// becomes the master tempo and is returned
    pub fn tap_tempo(&self) -> Result<Option<f64>> {
        self.run(|inner| match inner.tap.tap() {
            Some(bpm) => {
                inner.set_master_tempo(bpm, true)?;
                Ok(Some(bpm))
            }
            None => Ok(None),
        })
    }

    /// Set the tempo multiplier; values outside the configured bounds are
    /// rejected, never clamped
    pub fn set_tempo_multiplier(&self, multiplier: f64, undoable: bool) -> Result<PropagationReport> {
        self.run(|inner| {
            inner.validate_multiplier(multiplier)?;
            let before = inner.snapshot(false);
            let changed = inner.master.tempo_multiplier != multiplier;

            inner.master.tempo_multiplier = multiplier;
            let report = inner.propagate();
            inner.publish_tempo();

            if undoable && changed {
                inner.record(ReversibleCommand::SetTempoMultiplier, before);
            }
            Ok(report)
        })
    }

    /// Set the master volume and rescale every active song's output
    pub fn set_master_volume(&self, volume: f64, undoable: bool) -> Result<PropagationReport> {
        validate_volume(volume)?;
        self.run(|inner| {
            let before = inner.snapshot(false);
            let changed = inner.master.master_volume != volume;

            inner.master.master_volume = volume;
            let report = inner.apply_volumes();
            inner.events.publish(TransportEvent::VolumeChanged(volume));
            debug!(volume, "Master volume set");

            if undoable && changed {
                inner.record(ReversibleCommand::SetMasterVolume, before);
            }
            Ok(report)
        })
    }

    /// Switch the sync mode and propagate the current tempo under it
    pub fn set_sync_mode(&self, mode: SyncMode, undoable: bool) -> PropagationReport {
        self.run(|inner| {
            if mode == inner.master.sync_mode {
                return PropagationReport::new();
            }
            let before = inner.snapshot(false);
            let effective = inner.master.effective_tempo();

            let report = inner.engine.set_sync_mode(mode, &mut inner.songs, effective);
            inner.master.sync_mode = mode;
            inner.events.publish(TransportEvent::SyncModeChanged(mode));

            if undoable {
                inner.record(ReversibleCommand::SetSyncMode, before);
            }
            report
        })
    }

    /// Register a song and bring it in line with the active sync mode
    pub fn add_song_instance(&self, handle: SharedSong) -> Result<PropagationReport> {
        self.run(move |inner| {
            let song_id = handle.id().to_string();
            if inner.songs.iter().any(|entry| entry.song_id == song_id) {
                return Err(SyncError::DuplicateSong(song_id));
            }

            self.urgent.register(Arc::clone(&handle));
            let mut entry = SongEntry::new(handle);
            let report = if entry.is_active {
                join_session(&inner.engine, &inner.master, &inner.events, &mut entry)
            } else {
                PropagationReport::new()
            };

            info!(song = %song_id, active = entry.is_active, mode = %inner.master.sync_mode, "Song added");
            inner.songs.push(entry);
            inner.events.publish(TransportEvent::SongAdded(song_id));
            Ok(report)
        })
    }

    /// Unregister a song, cancelling its transition first
    pub fn remove_song_instance(&self, song_id: &str) -> Result<()> {
        self.run(|inner| {
            let index = inner.index_of(song_id)?;
            inner.engine.cancel_transition(song_id);
            self.urgent.unregister(song_id);
            inner.songs.remove(index);

            info!(song = %song_id, "Song removed");
            inner.events.publish(TransportEvent::SongRemoved(song_id.to_string()));
            Ok(())
        })
    }

    /// Include or exclude a song from propagation.
    ///
    /// Baseline and ratio survive deactivation, so a reactivated song
    /// resumes its old ratio.
    pub fn set_song_active(&self, song_id: &str, active: bool) -> Result<PropagationReport> {
        self.run(|inner| {
            let index = inner.index_of(song_id)?;
            if inner.songs[index].is_active == active {
                return Ok(PropagationReport::new());
            }

            let entry = &mut inner.songs[index];
            entry.is_active = active;
            let report = if active {
                join_session(&inner.engine, &inner.master, &inner.events, entry)
            } else {
                PropagationReport::new()
            };

            debug!(song = %song_id, active, "Song activity changed");
            inner.events.publish(TransportEvent::SongActivity {
                song_id: song_id.to_string(),
                active,
            });
            Ok(report)
        })
    }

    /// Set one song's tempo directly.
    ///
    /// In ratio mode the song's ratio follows the new tempo so the next
    /// master change keeps it.
    pub fn set_song_tempo(&self, song_id: &str, tempo: f64) -> Result<PropagationReport> {
        validate_tempo(tempo)?;
        self.run(|inner| {
            let index = inner.index_of(song_id)?;
            let effective = inner.master.effective_tempo();
            let mode = inner.master.sync_mode;
            let mut report = PropagationReport::new();

            inner.engine.cancel_transition(song_id);
            let entry = &mut inner.songs[index];
            match entry.handle.set_tempo(tempo) {
                Ok(()) => {
                    entry.applied_tempo = tempo;
                    if mode == SyncMode::Ratio {
                        entry.tempo_ratio = Some(tempo / effective);
                    }
                    report.targets.push((song_id.to_string(), tempo));
                    debug!(song = %song_id, tempo, "Song tempo set");
                }
                Err(e) => report_failure(&inner.events, &mut report, song_id, "set_tempo", e),
            }
            Ok(report)
        })
    }

    /// Override one song's ratio; applied at once while in ratio mode
    pub fn set_tempo_ratio(&self, song_id: &str, ratio: f64) -> Result<PropagationReport> {
        self.run(|inner| {
            inner.engine.set_tempo_ratio(&mut inner.songs, song_id, ratio)?;

            let mut report = PropagationReport::new();
            if inner.master.sync_mode == SyncMode::Ratio {
                let effective = inner.master.effective_tempo();
                if let Some(entry) = inner
                    .songs
                    .iter_mut()
                    .find(|entry| entry.song_id == song_id && entry.is_active)
                {
                    inner.engine.apply_song_tempo(entry, effective * ratio, &mut report);
                }
            }
            Ok(report)
        })
    }

    /// Set every ratio back to 1.0 and re-propagate in ratio mode
    pub fn reset_tempo_ratios(&self) -> PropagationReport {
        self.run(|inner| {
            inner.engine.reset_tempo_ratios(&mut inner.songs);
            if inner.master.sync_mode == SyncMode::Ratio {
                inner.propagate()
            } else {
                PropagationReport::new()
            }
        })
    }

    /// Recapture every active song's baseline and ratio from its settled tempo
    pub fn capture_baseline_tempos(&self) {
        self.run(|inner| {
            let effective = inner.master.effective_tempo();
            inner.engine.capture_baseline_tempos(&mut inner.songs, effective);
        })
    }

    /// Copy of the master state plus every song's sync data and state
    pub fn get_current_state(&self) -> StateSnapshot {
        self.run(|inner| inner.snapshot(true))
    }

    /// Apply every field of a snapshot, then converge all songs once.
    ///
    /// Songs missing from the snapshot are left alone and snapshot songs
    /// that are no longer registered are ignored. Not recorded in history.
    pub fn restore_state(&self, snapshot: &StateSnapshot) -> Result<PropagationReport> {
        self.run(|inner| {
            inner.validate_snapshot(snapshot)?;
            let report = inner.restore(snapshot, RestoreScope::Full);
            info!(songs = snapshot.songs.len(), "State restored");
            inner.events.publish(TransportEvent::StateRestored);
            Ok(report)
        })
    }

    /// Revert the most recent reversible command.
    ///
    /// Transport state and song activity are left alone. In independent
    /// mode a song retuned with `set_song_tempo` after the command keeps
    /// its newer tempo.
    pub fn undo(&self) -> Result<PropagationReport> {
        self.run(|inner| {
            let entry = inner.history.last_undo().cloned().ok_or(SyncError::NothingToUndo)?;
            inner.validate_snapshot(&entry.before)?;
            inner.history.take_undo();

            info!(command = ?entry.command, "Undo");
            let report = inner.restore(&entry.before, RestoreScope::Parameters { from: &entry.after });
            inner.events.publish(TransportEvent::StateRestored);
            Ok(report)
        })
    }

    /// Re-apply the most recently undone command
    pub fn redo(&self) -> Result<PropagationReport> {
        self.run(|inner| {
            let entry = inner.history.last_redo().cloned().ok_or(SyncError::NothingToRedo)?;
            inner.validate_snapshot(&entry.after)?;
            inner.history.take_redo();

            info!(command = ?entry.command, "Redo");
            let report = inner.restore(&entry.after, RestoreScope::Parameters { from: &entry.before });
            inner.events.publish(TransportEvent::StateRestored);
            Ok(report)
        })
    }

    /// Check if there is anything to undo
    pub fn can_undo(&self) -> bool {
        self.run(|inner| inner.history.can_undo())
    }

    /// Check if there is anything to redo
    pub fn can_redo(&self) -> bool {
        self.run(|inner| inner.history.can_redo())
    }

    /// Apply a reloaded session configuration without stopping playback.
    ///
    /// Only bounds, transition settings and history depth change; the live
    /// master tempo, volume and mode are kept.
    pub fn apply_config(&self, config: &SessionConfig) -> Result<()> {
        config
            .validate()
            .map_err(|e| SyncError::Config(format!("{:#}", e)))?;

        self.run(|inner| {
            let (min, max) = (config.tempo.multiplier_min, config.tempo.multiplier_max);
            let current = inner.master.tempo_multiplier;
            if current < min || current > max {
                return Err(SyncError::Config(format!(
                    "current tempo multiplier {} outside new bounds [{}, {}]",
                    current, min, max
                )));
            }

            inner.multiplier_min = min;
            inner.multiplier_max = max;
            inner.engine.set_settings(config.transition_settings());
            inner.history.set_depth(config.history.depth);

            info!(
                multiplier_min = min,
                multiplier_max = max,
                smooth = config.transitions.smooth,
                duration_ms = config.transitions.duration_ms,
                "Session config applied"
            );
            Ok(())
        })
    }

    /// Turn eased transitions on or off
    pub fn set_smooth_transitions(&self, smooth: bool) {
        self.run(|inner| inner.engine.set_smooth_transitions(smooth));
    }

    /// Set the length of future transitions
    pub fn set_transition_duration(&self, duration: Duration) {
        self.run(|inner| inner.engine.set_transition_duration(duration));
    }

    /// Set the length of future transitions in seconds
    pub fn set_transition_seconds(&self, seconds: f64) -> Result<()> {
        let duration = Duration::try_from_secs_f64(seconds)
            .map_err(|e| SyncError::InvalidDuration(format!("{} s: {}", seconds, e)))?;
        self.set_transition_duration(duration);
        Ok(())
    }

    /// Current transition settings
    pub fn transition_settings(&self) -> TransitionSettings {
        self.run(|inner| inner.engine.settings())
    }

    /// Current master state
    pub fn master_state(&self) -> MasterState {
        self.run(|inner| inner.master)
    }

    /// Master tempo times multiplier
    pub fn effective_tempo(&self) -> f64 {
        self.run(|inner| inner.master.effective_tempo())
    }

    /// Active sync mode
    pub fn sync_mode(&self) -> SyncMode {
        self.run(|inner| inner.master.sync_mode)
    }

    /// Registered song ids, in registration order
    pub fn song_ids(&self) -> Vec<String> {
        self.run(|inner| inner.songs.iter().map(|entry| entry.song_id.clone()).collect())
    }

    /// Number of tempo transitions still running
    pub fn active_transition_count(&self) -> usize {
        self.urgent.transitions.active_count()
    }
}

impl Default for MasterTransportController {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl Drop for MasterTransportController {
    fn drop(&mut self) {
        let cancelled = self.urgent.transitions.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "Transitions cancelled on shutdown");
        }
    }
}

impl ControllerInner {
    fn index_of(&self, song_id: &str) -> Result<usize> {
        self.songs
            .iter()
            .position(|entry| entry.song_id == song_id)
            .ok_or_else(|| SyncError::SongNotFound(song_id.to_string()))
    }

    fn validate_multiplier(&self, multiplier: f64) -> Result<()> {
        if !multiplier.is_finite() || multiplier < self.multiplier_min || multiplier > self.multiplier_max {
            return Err(SyncError::MultiplierOutOfRange {
                value: multiplier,
                min: self.multiplier_min,
                max: self.multiplier_max,
            });
        }
        Ok(())
    }

    fn validate_snapshot(&self, snapshot: &StateSnapshot) -> Result<()> {
        let master = &snapshot.master;
        validate_tempo(master.master_tempo)?;
        self.validate_multiplier(master.tempo_multiplier)?;
        validate_volume(master.master_volume)?;

        for song in &snapshot.songs {
            validate_tempo(song.tempo)?;
            if let Some(baseline) = song.baseline_tempo {
                validate_tempo(baseline)?;
            }
            if let Some(ratio) = song.tempo_ratio {
                if !ratio.is_finite() || ratio <= 0.0 {
                    return Err(SyncError::InvalidRatio(ratio));
                }
            }
        }
        Ok(())
    }

    /// Call `op` on every active song, isolating failures
    fn for_each_active<F>(&self, command: &'static str, mut op: F) -> PropagationReport
    where
        F: FnMut(&SongEntry) -> std::result::Result<(), HandleError>,
    {
        let mut report = PropagationReport::new();
        for entry in self.songs.iter().filter(|entry| entry.is_active) {
            if self.latch.is_tripped() {
                report.interrupted = true;
                break;
            }
            if let Err(e) = op(entry) {
                report_failure(&self.events, &mut report, &entry.song_id, command, e);
            }
        }
        report
    }

    fn set_transport(&mut self, state: TransportState) {
        if self.master.transport_state != state {
            self.master.transport_state = state;
            info!(state = %state, "Transport changed");
            self.events.publish(TransportEvent::TransportChanged(state));
        }
    }

    fn play(&mut self) -> PropagationReport {
        let report = self.for_each_active("play", |entry| entry.handle.play());
        self.set_transport(TransportState::Playing);
        report
    }

    fn pause(&mut self) -> PropagationReport {
        if self.master.transport_state != TransportState::Playing {
            debug!(state = %self.master.transport_state, "Pause ignored");
            return PropagationReport::new();
        }
        let report = self.for_each_active("pause", |entry| entry.handle.pause());
        self.set_transport(TransportState::Paused);
        report
    }

    fn stop(&mut self) -> PropagationReport {
        let report = self.for_each_active("stop", |entry| entry.handle.stop());
        self.set_transport(TransportState::Stopped);
        report
    }

    fn force_silent(&mut self) {
        self.set_transport(TransportState::Stopped);
        if self.master.master_volume != 0.0 {
            self.master.master_volume = 0.0;
            self.events.publish(TransportEvent::VolumeChanged(0.0));
        }
        // Cancelled transitions leave songs wherever they were
        for entry in self.songs.iter_mut() {
            entry.applied_tempo = entry.handle.current_tempo();
        }
    }

    fn propagate(&mut self) -> PropagationReport {
        let effective = self.master.effective_tempo();
        self.engine.apply_master_tempo(effective, &mut self.songs)
    }

    fn apply_volumes(&self) -> PropagationReport {
        let master_volume = self.master.master_volume;
        self.for_each_active("set_volume", |entry| {
            let volume = entry.handle.get_state().volume;
            entry.handle.set_volume(volume * master_volume)
        })
    }

    fn publish_tempo(&self) {
        self.events.publish(TransportEvent::TempoChanged {
            master_tempo: self.master.master_tempo,
            tempo_multiplier: self.master.tempo_multiplier,
            effective_tempo: self.master.effective_tempo(),
        });
    }

    fn set_master_tempo(&mut self, tempo: f64, undoable: bool) -> Result<PropagationReport> {
        validate_tempo(tempo)?;
        let before = self.snapshot(false);
        let changed = self.master.master_tempo != tempo;

        self.master.master_tempo = tempo;
        let report = self.propagate();
        self.publish_tempo();
        debug!(tempo, effective = self.master.effective_tempo(), "Master tempo set");

        if undoable && changed {
            self.record(ReversibleCommand::SetMasterTempo, before);
        }
        Ok(report)
    }

    fn record(&mut self, command: ReversibleCommand, before: StateSnapshot) {
        let after = self.snapshot(false);
        self.history.record(HistoryEntry { command, before, after });
    }

    fn snapshot(&self, with_instances: bool) -> StateSnapshot {
        StateSnapshot {
            master: self.master,
            songs: self
                .songs
                .iter()
                .map(|entry| SongSnapshot {
                    song_id: entry.song_id.clone(),
                    is_active: entry.is_active,
                    baseline_tempo: entry.baseline_tempo,
                    tempo_ratio: entry.tempo_ratio,
                    tempo: entry.applied_tempo,
                    instance: with_instances.then(|| entry.handle.get_state()),
                })
                .collect(),
        }
    }

    fn restore(&mut self, snapshot: &StateSnapshot, scope: RestoreScope) -> PropagationReport {
        let mut report = PropagationReport::new();
        let target = snapshot.master;

        if matches!(scope, RestoreScope::Full) && target.transport_state != self.master.transport_state {
            report.merge(match target.transport_state {
                TransportState::Playing => self.play(),
                TransportState::Stopped => self.stop(),
                TransportState::Paused => {
                    let paused = self.for_each_active("pause", |entry| entry.handle.pause());
                    self.set_transport(TransportState::Paused);
                    paused
                }
            });
        }

        for entry in self.songs.iter_mut() {
            let Some(saved) = snapshot.song(&entry.song_id) else {
                continue;
            };
            entry.baseline_tempo = saved.baseline_tempo;
            entry.tempo_ratio = saved.tempo_ratio;

            if matches!(scope, RestoreScope::Full) {
                entry.is_active = saved.is_active;
                if let Some(instance) = &saved.instance {
                    if let Err(e) = entry.handle.restore_state(instance) {
                        report_failure(&self.events, &mut report, &entry.song_id, "restore_state", e);
                    }
                }
            }
        }

        self.master.master_tempo = target.master_tempo;
        self.master.tempo_multiplier = target.tempo_multiplier;
        self.master.master_volume = target.master_volume;
        self.master.sync_mode = target.sync_mode;
        self.engine.restore_mode(target.sync_mode);

        report.merge(self.apply_volumes());

        if target.sync_mode == SyncMode::Independent {
            // Nothing propagates; put each song back on its recorded tempo
            for entry in self.songs.iter_mut().filter(|entry| entry.is_active) {
                if self.latch.is_tripped() {
                    report.interrupted = true;
                    break;
                }
                let Some(saved) = snapshot.song(&entry.song_id) else {
                    continue;
                };
                if let RestoreScope::Parameters { from } = scope {
                    let retuned = from
                        .song(&entry.song_id)
                        .map_or(true, |left| (entry.applied_tempo - left.tempo).abs() > TEMPO_EPSILON);
                    if retuned {
                        debug!(song = %entry.song_id, "Song retuned since; tempo kept");
                        continue;
                    }
                }
                let drifted = (entry.handle.current_tempo() - saved.tempo).abs() > TEMPO_EPSILON
                    || (entry.applied_tempo - saved.tempo).abs() > TEMPO_EPSILON;
                if drifted {
                    self.engine.apply_song_tempo(entry, saved.tempo, &mut report);
                }
            }
        } else {
            report.merge(self.propagate());
        }

        self.publish_tempo();
        self.events.publish(TransportEvent::VolumeChanged(target.master_volume));
        self.events.publish(TransportEvent::SyncModeChanged(target.sync_mode));
        report
    }
}

/// Bring a newly added or reactivated song to the session's volume and tempo
fn join_session(
    engine: &SyncModeEngine,
    master: &MasterState,
    events: &EventBus,
    entry: &mut SongEntry,
) -> PropagationReport {
    let mut report = PropagationReport::new();

    let volume = entry.handle.get_state().volume * master.master_volume;
    if let Err(e) = entry.handle.set_volume(volume) {
        report_failure(events, &mut report, &entry.song_id, "set_volume", e);
    }

    if let Some(target) = engine.target_tempo(entry, master.effective_tempo()) {
        engine.apply_song_tempo(entry, target, &mut report);
    }
    report
}

fn report_failure(
    events: &EventBus,
    report: &mut PropagationReport,
    song_id: &str,
    command: &'static str,
    error: HandleError,
) {
    warn!(song = %song_id, command, error = %error, "Song command failed");
    events.publish(TransportEvent::SongFailed {
        song_id: song_id.to_string(),
        error: error.to_string(),
    });
    report.record_failure(song_id, error);
}

fn validate_tempo(tempo: f64) -> Result<()> {
    if !tempo.is_finite() || tempo <= 0.0 {
        return Err(SyncError::InvalidTempo(tempo));
    }
    Ok(())
}

fn validate_volume(volume: f64) -> Result<()> {
    if !volume.is_finite() || !(0.0..=1.0).contains(&volume) {
        return Err(SyncError::VolumeOutOfRange(volume));
    }
    Ok(())
}
