// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! syncplay - master transport and tempo synchronization for a multi-song player.
//!
//! The crate decides when songs play and at what tempo; rendering audio is
//! left to whatever implements [`SongControlHandle`].

pub mod config;
pub mod error;
pub mod events;
pub mod song;
pub mod sync;
pub mod timing;
pub mod transport;

pub use config::SessionConfig;
pub use error::{HandleError, Result, SyncError};
pub use events::{EventBus, TransportEvent};
pub use song::{SharedSong, SimulatedSong, SongControlHandle, SongEntry, SongInstanceState};
pub use sync::{PropagationReport, SyncMode, TransitionCurve, TransitionSettings};
pub use transport::{MasterState, MasterTransportController, StateSnapshot, TransportState};
