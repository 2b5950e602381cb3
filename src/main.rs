// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use syncplay::config::{validate_config, ConfigEvent, ConfigWatcher};
use syncplay::{MasterTransportController, SessionConfig, SimulatedSong, SongControlHandle, SyncMode};

fn print_usage() {
    println!("syncplay - Multi-song master transport");
    println!();
    println!("Usage: syncplay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --demo <MODE> [CONFIG]      Run a simulated session (independent, locked, ratio)");
    println!("  --validate-config <PATH>    Check a session config file (YAML or TOML)");
    println!("  --watch-config <PATH> [S]   Apply edits to a config file for S seconds (default 30)");
    println!("  --help                      Show this help message");
    println!();
    println!("Set RUST_LOG (e.g. RUST_LOG=syncplay=debug) for more detail.");
}

fn load_config(path: Option<&String>) -> Result<SessionConfig> {
    match path {
        Some(path) => {
            let config = validate_config(path)?;
            println!("Loaded session config from {}", path);
            Ok(config)
        }
        None => Ok(SessionConfig::default()),
    }
}

fn spawn_event_printer(controller: &MasterTransportController) -> JoinHandle<()> {
    let mut rx = controller.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => println!("    event: {:?}", event),
                Err(RecvError::Lagged(skipped)) => println!("    ({} events skipped)", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_songs(songs: &[Arc<SimulatedSong>]) {
    for song in songs {
        println!(
            "  {:<6} tempo {:>7.2}  volume {:.2}  {}",
            song.id(),
            song.current_tempo(),
            song.output_volume(),
            if song.is_playing() { "playing" } else { "stopped" }
        );
    }
}

async fn run_demo(mode: SyncMode, config: SessionConfig) -> Result<()> {
    let settle = Duration::from_millis(config.transitions.duration_ms + 100);
    let controller = MasterTransportController::new(&config)?;
    let printer = spawn_event_printer(&controller);

    let songs: Vec<Arc<SimulatedSong>> = vec![
        Arc::new(SimulatedSong::new("lead", 120.0)),
        Arc::new(SimulatedSong::new("bass", 90.0).with_volume(0.8)),
        Arc::new(SimulatedSong::new("pads", 140.0).with_volume(0.6)),
    ];
    for song in &songs {
        controller.add_song_instance(song.clone())?;
    }

    println!("Sync mode: {}", mode);
    controller.set_sync_mode(mode, true);
    controller.play();
    tokio::time::sleep(settle).await;
    print_songs(&songs);

    println!("Master tempo -> 100");
    let report = controller.set_master_tempo(100.0, true)?;
    info!(targets = report.targets.len(), transitions = report.transitions_started, "Tempo propagated");
    tokio::time::sleep(settle).await;
    print_songs(&songs);

    println!("Tempo multiplier -> 0.5");
    controller.set_tempo_multiplier(0.5, true)?;
    tokio::time::sleep(settle).await;
    print_songs(&songs);

    println!("Undo");
    controller.undo()?;
    tokio::time::sleep(settle).await;
    print_songs(&songs);

    println!("Snapshot:");
    print!("{}", controller.get_current_state().to_yaml()?);

    println!("Master tempo -> 160, then emergency stop mid-transition");
    controller.set_master_tempo(160.0, true)?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.emergency_stop();
    print_songs(&songs);

    let state = controller.master_state();
    println!(
        "Final: {} at {:.1} BPM (x{}), volume {}",
        state.transport_state, state.master_tempo, state.tempo_multiplier, state.master_volume
    );

    drop(controller);
    tokio::time::sleep(Duration::from_millis(20)).await;
    printer.abort();
    Ok(())
}

fn watch_config(path: PathBuf, seconds: u64) -> Result<()> {
    let controller = MasterTransportController::new(&validate_config(&path)?)?;
    let watcher = ConfigWatcher::new(&path, None)?;
    println!("Watching {:?} for {} seconds...", watcher.watched_path(), seconds);

    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        match watcher.recv_timeout(Duration::from_millis(200)) {
            Some(ConfigEvent::Reloaded(config)) => match controller.apply_config(&config) {
                Ok(()) => println!("Applied: {:?}", controller.transition_settings()),
                Err(e) => println!("Rejected: {}", e),
            },
            Some(ConfigEvent::Error(message)) => println!("Error: {}", message),
            Some(ConfigEvent::FileCreated(path)) => println!("Created: {:?}", path),
            Some(ConfigEvent::FileDeleted(path)) => println!("Deleted: {:?}", path),
            None => {}
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "syncplay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("syncplay - Multi-song master transport");
        println!("Run with --help for usage information");
        return Ok(());
    }

    match args[1].as_str() {
        "--demo" => {
            let mode: SyncMode = match args.get(2) {
                Some(name) => name.parse().map_err(|e: String| anyhow!(e))?,
                None => SyncMode::Locked,
            };
            let config = load_config(args.get(3))?;
            run_demo(mode, config).await?;
        }
        "--validate-config" => {
            if args.len() < 3 {
                eprintln!("Error: --validate-config requires a path");
                std::process::exit(1);
            }
            let config = validate_config(&args[2])?;
            println!("Config OK: {}", args[2]);
            print!("{}", config.to_yaml()?);
        }
        "--watch-config" => {
            if args.len() < 3 {
                eprintln!("Error: --watch-config requires a path");
                std::process::exit(1);
            }
            let path = PathBuf::from(&args[2]);
            let seconds: u64 = match args.get(3) {
                Some(value) => value
                    .parse()
                    .map_err(|_| anyhow!("Invalid number of seconds: {}", value))?,
                None => 30,
            };
            tokio::task::spawn_blocking(move || watch_config(path, seconds)).await??;
        }
        "--help" | "-h" => {
            print_usage();
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}
