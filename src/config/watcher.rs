// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! File watcher for hot-reload configuration.
//!
//! Watches a session file (or a directory of them) and emits parsed,
//! validated configurations so transition and history settings can change
//! without stopping playback.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::debug;

use super::SessionConfig;

/// Events emitted by the config watcher
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// Configuration file was modified and successfully reloaded
    Reloaded(Box<SessionConfig>),
    /// Configuration file was modified but failed to parse or validate
    Error(String),
    /// A new file was created in the watch directory
    FileCreated(PathBuf),
    /// A file was deleted from the watch directory
    FileDeleted(PathBuf),
}

/// Configuration file watcher with debouncing and validation
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    event_receiver: Receiver<ConfigEvent>,
    watched_path: PathBuf,
}

impl ConfigWatcher {
    /// Create a new config watcher for the specified path
    ///
    /// # Arguments
    /// * `path` - Path to watch (file or directory)
    /// * `debounce_ms` - Debounce duration in milliseconds (default: 500)
    pub fn new<P: AsRef<Path>>(path: P, debounce_ms: Option<u64>) -> Result<Self> {
        let watched_path = path.as_ref().to_path_buf();
        let debounce_duration = Duration::from_millis(debounce_ms.unwrap_or(500));

        let (event_tx, event_rx): (Sender<ConfigEvent>, Receiver<ConfigEvent>) = mpsc::channel();
        let (notify_tx, notify_rx): (Sender<Event>, Receiver<Event>) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = notify_tx.send(event);
                }
            },
            Config::default(),
        )
        .map_err(|e| anyhow!("Failed to create file watcher: {}", e))?;

        let mode = if watched_path.is_dir() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        watcher
            .watch(&watched_path, mode)
            .map_err(|e| anyhow!("Failed to watch path {:?}: {}", watched_path, e))?;

        let root = watched_path.clone();
        std::thread::spawn(move || debounce_loop(notify_rx, event_tx, root, debounce_duration));

        Ok(Self {
            _watcher: watcher,
            event_receiver: event_rx,
            watched_path,
        })
    }

    /// Try to receive the next config event (non-blocking)
    pub fn try_recv(&self) -> Option<ConfigEvent> {
        self.event_receiver.try_recv().ok()
    }

    /// Receive all pending config events
    pub fn recv_all(&self) -> Vec<ConfigEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    /// Block until the next config event is received
    pub fn recv(&self) -> Option<ConfigEvent> {
        self.event_receiver.recv().ok()
    }

    /// Block up to `timeout` for the next config event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ConfigEvent> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    /// Get the path being watched
    pub fn watched_path(&self) -> &Path {
        &self.watched_path
    }
}

fn debounce_loop(
    notify_rx: Receiver<Event>,
    event_tx: Sender<ConfigEvent>,
    root: PathBuf,
    debounce: Duration,
) {
    let mut last_event_time: Option<Instant> = None;
    let mut pending_paths: Vec<PathBuf> = Vec::new();

    loop {
        match notify_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => match event.kind {
                EventKind::Create(_) => {
                    for path in event.paths {
                        let _ = event_tx.send(ConfigEvent::FileCreated(path));
                    }
                }
                EventKind::Remove(_) => {
                    for path in event.paths {
                        let _ = event_tx.send(ConfigEvent::FileDeleted(path));
                    }
                }
                EventKind::Modify(_) => {
                    for path in event.paths {
                        if !pending_paths.contains(&path) {
                            pending_paths.push(path);
                        }
                    }
                    last_event_time = Some(Instant::now());
                }
                _ => {}
            },
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let settled = last_event_time.map_or(false, |t| t.elapsed() >= debounce);
                if !settled {
                    continue;
                }
                for path in pending_paths.drain(..) {
                    if is_config_file(&path) || path == root {
                        debug!(path = ?path, "Reloading session config");
                        let _ = event_tx.send(reload(&path));
                    }
                }
                last_event_time = None;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // Watcher was dropped, exit thread
                break;
            }
        }
    }
}

fn is_config_file(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext == "yaml" || ext == "yml" || ext == "toml")
}

fn reload(path: &Path) -> ConfigEvent {
    match validate_config(path) {
        Ok(config) => ConfigEvent::Reloaded(Box::new(config)),
        Err(e) => ConfigEvent::Error(format!("Failed to load {:?}: {:#}", path, e)),
    }
}

/// Load and validate a configuration without applying it
pub fn validate_config<P: AsRef<Path>>(path: P) -> Result<SessionConfig> {
    let config = SessionConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_validate_config() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("session.yaml");

        let yaml = r#"
master:
  tempo: 110
transitions:
  duration_ms: 200
"#;

        fs::write(&file_path, yaml).unwrap();

        let config = validate_config(&file_path).unwrap();
        assert_eq!(config.master.tempo, 110.0);
        assert_eq!(config.transitions.duration_ms, 200);
    }

    #[test]
    fn test_validate_invalid_config() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("invalid.yaml");

        fs::write(&file_path, "this is not valid yaml: [").unwrap();
        assert!(validate_config(&file_path).is_err());

        // Parses, but out of range
        fs::write(&file_path, "master:\n  volume: 3.0\n").unwrap();
        assert!(validate_config(&file_path).is_err());
    }

    #[test]
    fn test_config_event_variants() {
        let _reloaded = ConfigEvent::Reloaded(Box::new(SessionConfig::default()));
        let _error = ConfigEvent::Error("test error".to_string());
        let _created = ConfigEvent::FileCreated(PathBuf::from("/test/path"));
        let _deleted = ConfigEvent::FileDeleted(PathBuf::from("/test/path"));
    }

    #[test]
    fn test_config_file_extensions() {
        assert!(is_config_file(Path::new("a/session.yaml")));
        assert!(is_config_file(Path::new("session.yml")));
        assert!(is_config_file(Path::new("session.toml")));
        assert!(!is_config_file(Path::new("session.json")));
        assert!(!is_config_file(Path::new("README")));
    }

    #[test]
    fn test_watcher_creation() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("watch_test.yaml"), "master:\n  tempo: 100\n").unwrap();

        let watcher = ConfigWatcher::new(dir.path(), Some(100)).unwrap();
        assert_eq!(watcher.watched_path(), dir.path());
    }

    #[test]
    fn test_watcher_detects_changes() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("detect_test.yaml");
        fs::write(&file_path, "master:\n  tempo: 120\n").unwrap();

        let watcher = ConfigWatcher::new(dir.path(), Some(100)).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let mut file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&file_path)
            .unwrap();
        file.write_all(b"master:\n  tempo: 140\n").unwrap();
        file.flush().unwrap();
        drop(file);

        // Wait for debounce + processing
        std::thread::sleep(Duration::from_millis(300));

        let events = watcher.recv_all();
        let reloaded_event = events.iter().find(|e| matches!(e, ConfigEvent::Reloaded(_)));

        if let Some(ConfigEvent::Reloaded(config)) = reloaded_event {
            assert_eq!(config.master.tempo, 140.0);
        }
        // File events are not guaranteed to arrive in CI sandboxes,
        // so the absence of a reload is not treated as a failure
    }
}
