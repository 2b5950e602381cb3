// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Integration tests for syncplay
//!
//! These tests drive the transport through its public API with simulated
//! songs and check the synchronization behaviour end to end.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use syncplay::sync::{TempoTransitionScheduler, TransitionCurve};
use syncplay::{
    MasterTransportController, SessionConfig, SimulatedSong, SongControlHandle, StateSnapshot,
    SyncError, SyncMode, TransportEvent, TransportState,
};

const TOLERANCE: f64 = 1e-9;

fn immediate_config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.transitions.smooth = false;
    config
}

fn smooth_config(duration_ms: u64) -> SessionConfig {
    let mut config = SessionConfig::default();
    config.transitions.smooth = true;
    config.transitions.duration_ms = duration_ms;
    config.transitions.tick_interval_ms = 5;
    config
}

fn session(config: &SessionConfig, tempos: &[(&str, f64)]) -> (MasterTransportController, Vec<Arc<SimulatedSong>>) {
    let controller = MasterTransportController::new(config).unwrap();
    let songs: Vec<Arc<SimulatedSong>> = tempos
        .iter()
        .map(|(id, tempo)| Arc::new(SimulatedSong::new(*id, *tempo)))
        .collect();
    for song in &songs {
        controller.add_song_instance(song.clone()).unwrap();
    }
    (controller, songs)
}

/// Locked mode: every active song converges to the master tempo
#[test]
fn test_scenario_a_locked_convergence() {
    let (controller, songs) = session(&smooth_config(80), &[("s1", 100.0), ("s2", 140.0)]);

    controller.set_sync_mode(SyncMode::Locked, true);
    let report = controller.set_master_tempo(120.0, true).unwrap();
    assert_eq!(report.target_for("s1"), Some(120.0));
    assert_eq!(report.target_for("s2"), Some(120.0));

    thread::sleep(Duration::from_millis(300));
    assert_eq!(songs[0].current_tempo(), 120.0);
    assert_eq!(songs[1].current_tempo(), 120.0);
    assert_eq!(controller.active_transition_count(), 0);

    // The smooth path never jumps straight to the target
    let writes = songs[1].tempo_writes();
    assert!(writes.len() > 2);
    assert!(writes.iter().all(|t| *t >= 120.0 - TOLERANCE && *t <= 140.0 + TOLERANCE));
}

/// Ratio mode: baselines captured against the effective tempo
#[test]
fn test_scenario_b_ratio_capture() {
    let (controller, songs) = session(&immediate_config(), &[("s1", 120.0), ("s2", 90.0)]);

    controller.set_sync_mode(SyncMode::Ratio, true);
    let state = controller.get_current_state();
    assert_eq!(state.song("s1").unwrap().tempo_ratio, Some(1.0));
    assert_eq!(state.song("s2").unwrap().tempo_ratio, Some(0.75));
    assert_eq!(state.song("s2").unwrap().baseline_tempo, Some(90.0));

    controller.set_master_tempo(100.0, true).unwrap();
    assert_eq!(songs[0].current_tempo(), 100.0);
    assert_eq!(songs[1].current_tempo(), 75.0);
}

/// Ratio mode: the multiplier scales the effective tempo
#[test]
fn test_scenario_c_multiplier_in_ratio_mode() {
    let (controller, songs) = session(&immediate_config(), &[("s1", 120.0), ("s2", 90.0)]);
    controller.set_sync_mode(SyncMode::Ratio, true);
    controller.set_master_tempo(100.0, true).unwrap();

    let report = controller.set_tempo_multiplier(0.5, true).unwrap();
    assert_eq!(controller.effective_tempo(), 50.0);
    assert_eq!(report.target_for("s2"), Some(37.5));
    assert_eq!(songs[1].current_tempo(), 37.5);
    assert_eq!(songs[0].current_tempo(), 50.0);
}

/// Emergency stop mid-transition: no further ticks, song stopped
#[test]
fn test_scenario_d_emergency_stop_mid_transition() {
    let (controller, songs) = session(&smooth_config(1000), &[("s1", 100.0)]);
    controller.play();
    controller.set_sync_mode(SyncMode::Locked, true);
    controller.set_master_tempo(140.0, true).unwrap();
    assert_eq!(controller.active_transition_count(), 1);

    thread::sleep(Duration::from_millis(60));
    controller.emergency_stop();
    let writes = songs[0].tempo_write_count();
    let tempo = songs[0].current_tempo();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(songs[0].tempo_write_count(), writes);
    assert_eq!(songs[0].current_tempo(), tempo);
    assert!(tempo < 140.0);

    assert!(songs[0].stop_count() >= 1);
    assert!(!songs[0].is_playing());
    assert_eq!(controller.master_state().transport_state, TransportState::Stopped);
    assert_eq!(controller.active_transition_count(), 0);
}

/// A song added in ratio mode without a baseline runs at ratio 1.0
#[test]
fn test_scenario_e_late_song_defaults_to_unit_ratio() {
    let (controller, _songs) = session(&immediate_config(), &[("s1", 120.0)]);
    controller.set_sync_mode(SyncMode::Ratio, true);
    controller.set_master_tempo(110.0, true).unwrap();

    let late = Arc::new(SimulatedSong::new("late", 80.0));
    let report = controller.add_song_instance(late.clone()).unwrap();
    assert_eq!(report.target_for("late"), Some(110.0));
    assert_eq!(late.current_tempo(), 110.0);

    controller.set_master_tempo(90.0, true).unwrap();
    assert_eq!(late.current_tempo(), 90.0);

    // A recapture gives it a real ratio
    controller.set_song_tempo("late", 45.0).unwrap();
    controller.capture_baseline_tempos();
    let state = controller.get_current_state();
    assert_eq!(state.song("late").unwrap().baseline_tempo, Some(45.0));
    assert_eq!(state.song("late").unwrap().tempo_ratio, Some(0.5));
}

#[test]
fn test_emergency_stop_is_idempotent() {
    let (controller, songs) = session(&smooth_config(500), &[("s1", 100.0), ("s2", 120.0)]);
    controller.play();
    controller.set_sync_mode(SyncMode::Locked, true);

    controller.emergency_stop();
    let once = controller.master_state();
    let volumes: Vec<f64> = songs.iter().map(|s| s.output_volume()).collect();

    controller.emergency_stop();
    let twice = controller.master_state();

    assert_eq!(once, twice);
    assert_eq!(twice.transport_state, TransportState::Stopped);
    assert_eq!(twice.master_volume, 0.0);
    assert_eq!(controller.active_transition_count(), 0);
    assert_eq!(songs.iter().map(|s| s.output_volume()).collect::<Vec<_>>(), volumes);
}

#[test]
fn test_emergency_stop_from_another_thread() {
    let (controller, songs) = session(&immediate_config(), &[("s1", 100.0), ("s2", 100.0)]);
    let controller = Arc::new(controller);
    controller.play();

    let remote = Arc::clone(&controller);
    thread::spawn(move || remote.emergency_stop()).join().unwrap();

    assert!(songs.iter().all(|s| !s.is_playing()));
    assert_eq!(controller.master_state().master_volume, 0.0);

    // The transport keeps working afterwards
    controller.set_master_volume(0.7, true).unwrap();
    controller.play();
    assert!(songs.iter().all(|s| s.is_playing()));
    assert!((songs[0].output_volume() - 0.7).abs() < TOLERANCE);
}

#[test]
fn test_restore_round_trip() {
    let (controller, songs) = session(&immediate_config(), &[("s1", 120.0), ("s2", 90.0), ("s3", 60.0)]);
    controller.set_sync_mode(SyncMode::Ratio, true);
    controller.set_tempo_ratio("s3", 0.4).unwrap();
    controller.set_master_tempo(110.0, true).unwrap();
    controller.set_master_volume(0.6, true).unwrap();
    controller.set_song_active("s2", false).unwrap();
    controller.play();

    let snapshot = controller.get_current_state();
    controller.restore_state(&snapshot).unwrap();
    let restored = controller.get_current_state();

    assert_eq!(restored.master, snapshot.master);
    for song in &snapshot.songs {
        let after = restored.song(&song.song_id).unwrap();
        assert_eq!(after.baseline_tempo, song.baseline_tempo);
        assert_eq!(after.tempo_ratio, song.tempo_ratio);
        assert_eq!(after.is_active, song.is_active);
    }
    assert!((songs[2].current_tempo() - 44.0).abs() < TOLERANCE);
}

#[test]
fn test_restore_reproduces_effective_tempos() {
    let (controller, songs) = session(&immediate_config(), &[("s1", 120.0), ("s2", 90.0)]);
    controller.set_sync_mode(SyncMode::Ratio, true);
    controller.set_master_tempo(100.0, true).unwrap();
    let saved = controller.get_current_state();

    controller.set_sync_mode(SyncMode::Locked, true);
    controller.set_master_tempo(150.0, true).unwrap();
    controller.set_tempo_multiplier(2.0, true).unwrap();
    assert_eq!(songs[1].current_tempo(), 300.0);

    controller.restore_state(&saved).unwrap();
    assert_eq!(controller.sync_mode(), SyncMode::Ratio);
    assert_eq!(songs[0].current_tempo(), 100.0);
    assert_eq!(songs[1].current_tempo(), 75.0);
}

#[test]
fn test_restore_ignores_removed_songs() {
    let (controller, songs) = session(&immediate_config(), &[("s1", 120.0), ("s2", 90.0)]);
    let saved = controller.get_current_state();

    controller.remove_song_instance("s2").unwrap();
    controller.set_master_tempo(130.0, true).unwrap();

    let report = controller.restore_state(&saved).unwrap();
    assert!(report.is_clean());
    assert_eq!(controller.song_ids(), vec!["s1".to_string()]);
    assert_eq!(songs[0].current_tempo(), 120.0);
}

#[test]
fn test_snapshot_survives_yaml() {
    let (controller, _songs) = session(&immediate_config(), &[("s1", 120.0), ("s2", 90.0)]);
    controller.set_sync_mode(SyncMode::Ratio, true);
    controller.set_master_tempo(96.0, true).unwrap();

    let snapshot = controller.get_current_state();
    let yaml = snapshot.to_yaml().unwrap();
    let parsed = StateSnapshot::from_yaml(&yaml).unwrap();
    assert_eq!(parsed, snapshot);

    let report = controller.restore_state(&parsed).unwrap();
    assert!(report.is_clean());
}

/// Zero-length transitions leave no intermediate values behind
#[test]
fn test_zero_duration_boundary() {
    let (controller, songs) = session(&smooth_config(0), &[("s1", 100.0)]);
    controller.set_sync_mode(SyncMode::Locked, true);
    controller.set_master_tempo(140.0, true).unwrap();

    assert_eq!(songs[0].current_tempo(), 140.0);
    assert_eq!(songs[0].tempo_writes(), vec![120.0, 140.0]);
    assert_eq!(controller.active_transition_count(), 0);

    let ticks = Arc::new(Mutex::new(Vec::new()));
    let completed = Arc::new(Mutex::new(None));
    let tick_log = Arc::clone(&ticks);
    let done = Arc::clone(&completed);

    let scheduler = TempoTransitionScheduler::new(Duration::from_millis(10), TransitionCurve::EaseInOutCubic);
    let transition = scheduler.start(
        "s2",
        90.0,
        180.0,
        Duration::ZERO,
        Box::new(move |tempo: f64| {
            tick_log.lock().unwrap().push(tempo);
            true
        }),
        Box::new(move |ok: bool| *done.lock().unwrap() = Some(ok)),
    );

    assert!(!transition.is_running());
    assert_eq!(*ticks.lock().unwrap(), vec![180.0]);
    assert_eq!(*completed.lock().unwrap(), Some(true));
}

#[test]
fn test_new_transition_replaces_old() {
    let (controller, songs) = session(&smooth_config(300), &[("s1", 100.0)]);
    controller.set_sync_mode(SyncMode::Locked, true);
    thread::sleep(Duration::from_millis(40));

    controller.set_master_tempo(60.0, true).unwrap();
    assert_eq!(controller.active_transition_count(), 1);

    thread::sleep(Duration::from_millis(500));
    assert_eq!(songs[0].current_tempo(), 60.0);
    assert_eq!(controller.active_transition_count(), 0);
}

#[test]
fn test_invalid_commands_never_change_state() {
    let (controller, _songs) = session(&immediate_config(), &[("s1", 100.0)]);
    controller.set_sync_mode(SyncMode::Locked, true);
    let before = controller.get_current_state();

    let bad_tempos = [0.0, -10.0, f64::INFINITY, f64::NAN];
    for tempo in bad_tempos {
        let err = controller.set_master_tempo(tempo, true).unwrap_err();
        assert!(err.is_validation());
    }
    for multiplier in [0.0, 0.1, 4.01, 100.0] {
        assert!(matches!(
            controller.set_tempo_multiplier(multiplier, true),
            Err(SyncError::MultiplierOutOfRange { .. })
        ));
    }
    for volume in [-0.1, 1.01] {
        assert!(controller.set_master_volume(volume, true).is_err());
    }
    assert!(matches!(
        controller.set_song_tempo("nobody", 100.0),
        Err(SyncError::SongNotFound(_))
    ));

    assert_eq!(controller.get_current_state(), before);
}

/// Random tempo changes keep every song on its ratio
#[test]
fn test_randomized_ratio_holds() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let tempos: Vec<(String, f64)> = (0..6)
        .map(|i| (format!("song{}", i), rng.gen_range(40.0..220.0)))
        .collect();
    let ids: Vec<(&str, f64)> = tempos.iter().map(|(id, t)| (id.as_str(), *t)).collect();
    let (controller, songs) = session(&immediate_config(), &ids);

    controller.set_sync_mode(SyncMode::Ratio, true);
    let ratios: Vec<f64> = {
        let state = controller.get_current_state();
        songs
            .iter()
            .map(|s| state.song(s.id()).and_then(|snap| snap.tempo_ratio).unwrap())
            .collect()
    };

    for _ in 0..50 {
        if rng.gen_bool(0.5) {
            controller.set_master_tempo(rng.gen_range(30.0..240.0), true).unwrap();
        } else {
            controller.set_tempo_multiplier(rng.gen_range(0.25..=4.0), true).unwrap();
        }

        let effective = controller.effective_tempo();
        for (song, ratio) in songs.iter().zip(&ratios) {
            let actual = song.current_tempo() / effective;
            assert!((actual - ratio).abs() < 1e-9, "{} drifted: {} vs {}", song.id(), actual, ratio);
        }
        let multiplier = controller.master_state().tempo_multiplier;
        assert!((0.25..=4.0).contains(&multiplier));
    }
}

#[test]
fn test_failing_song_does_not_block_others() {
    let (controller, songs) = session(&immediate_config(), &[("s1", 100.0), ("s2", 100.0), ("s3", 100.0)]);
    songs[1].set_failing(true);
    let mut rx = controller.subscribe();

    controller.set_sync_mode(SyncMode::Locked, true);
    let report = controller.set_master_tempo(133.0, true).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].song_id, "s2");
    assert_eq!(songs[0].current_tempo(), 133.0);
    assert_eq!(songs[2].current_tempo(), 133.0);
    assert_eq!(songs[1].current_tempo(), 100.0);
    assert_eq!(controller.master_state().master_tempo, 133.0);

    let mut failures = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, TransportEvent::SongFailed { .. }) {
            failures += 1;
        }
    }
    assert_eq!(failures, 2);
}

#[test]
fn test_failing_song_reported_with_smooth_transitions() {
    let (controller, songs) = session(&smooth_config(60), &[("ok", 100.0), ("bad", 100.0)]);
    songs[1].set_failing(true);

    let switch = controller.set_sync_mode(SyncMode::Locked, true);
    assert_eq!(switch.failures.len(), 1);
    assert_eq!(switch.failures[0].song_id, "bad");

    let report = controller.set_master_tempo(140.0, true).unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].song_id, "bad");
    assert_eq!(report.target_for("ok"), Some(140.0));
    assert_eq!(report.target_for("bad"), None);
    assert_eq!(report.transitions_started, 1);

    thread::sleep(Duration::from_millis(250));
    assert_eq!(songs[0].current_tempo(), 140.0);
    assert_eq!(songs[1].current_tempo(), 100.0);

    // The snapshot keeps the tempo the song actually holds
    let snapshot = controller.get_current_state();
    assert_eq!(snapshot.song("ok").unwrap().tempo, 140.0);
    assert_eq!(snapshot.song("bad").unwrap().tempo, 100.0);
}

#[test]
fn test_song_failing_mid_transition_ends_it() {
    let (controller, songs) = session(&smooth_config(400), &[("s1", 100.0)]);
    let mut rx = controller.subscribe();

    controller.set_sync_mode(SyncMode::Locked, true);
    assert_eq!(controller.active_transition_count(), 1);
    thread::sleep(Duration::from_millis(40));
    songs[0].set_failing(true);
    thread::sleep(Duration::from_millis(60));

    assert_eq!(controller.active_transition_count(), 0);
    let stalled = songs[0].current_tempo();
    assert!(stalled > 100.0 && stalled < 120.0);

    let mut failed = false;
    let mut finished = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            TransportEvent::SongFailed { song_id, .. } => failed = song_id == "s1",
            TransportEvent::TransitionFinished { completed, .. } => finished = Some(completed),
            _ => {}
        }
    }
    assert!(failed);
    assert_eq!(finished, Some(false));
}

#[test]
fn test_config_file_drives_controller() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.toml");
    std::fs::write(
        &path,
        "[master]\ntempo = 90.0\nsync_mode = \"locked\"\n\n[transitions]\nsmooth = false\n",
    )
    .unwrap();

    let config = SessionConfig::load(&path).unwrap();
    let (controller, songs) = session(&config, &[("s1", 120.0)]);

    assert_eq!(controller.sync_mode(), SyncMode::Locked);
    assert_eq!(songs[0].current_tempo(), 90.0);
    assert!(controller.transition_settings().is_immediate());
}
