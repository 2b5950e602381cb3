// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Transition curves and tempo transition records.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Shape of a tempo transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCurve {
    /// Constant rate of change
    Linear,
    /// Cubic ease-in-ease-out (zero velocity at both ends)
    #[default]
    EaseInOutCubic,
}

impl TransitionCurve {
    /// Map linear progress (0.0 - 1.0) onto the curve
    pub fn apply(self, progress: f64) -> f64 {
        let x = progress.clamp(0.0, 1.0);
        match self {
            TransitionCurve::Linear => x,
            TransitionCurve::EaseInOutCubic => ease_in_out_cubic(x),
        }
    }
}

/// Standard cubic ease-in-ease-out
pub fn ease_in_out_cubic(x: f64) -> f64 {
    if x < 0.5 {
        4.0 * x * x * x
    } else {
        1.0 - (-2.0 * x + 2.0).powi(3) / 2.0
    }
}

/// A tempo transition from one value to another over a fixed duration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoTransitionRecord {
    /// Tempo when the transition started
    pub start_tempo: f64,
    /// Tempo the transition converges to
    pub target_tempo: f64,
    /// When the transition started
    pub start_time: Instant,
    /// Length of the transition
    pub duration: Duration,
}

impl TempoTransitionRecord {
    /// Create a record starting now
    pub fn new(start_tempo: f64, target_tempo: f64, duration: Duration) -> Self {
        Self {
            start_tempo,
            target_tempo,
            start_time: Instant::now(),
            duration,
        }
    }

    /// Linear progress at `now`, clamped to 0.0 - 1.0
    pub fn progress_at(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start_time);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Tempo at the given linear progress
    pub fn tempo_at(&self, progress: f64, curve: TransitionCurve) -> f64 {
        if progress >= 1.0 {
            // Land exactly on the target
            return self.target_tempo;
        }
        let eased = curve.apply(progress);
        self.start_tempo + (self.target_tempo - self.start_tempo) * eased
    }

    /// Tempo right now
    pub fn current_tempo(&self, curve: TransitionCurve) -> f64 {
        self.tempo_at(self.progress_at(Instant::now()), curve)
    }

    /// Check if the transition has run its full duration
    pub fn is_complete(&self) -> bool {
        self.start_time.elapsed() >= self.duration
    }
}
