// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timing utilities.
//!
//! This module provides tap tempo detection for the master transport.

pub mod tap;

pub use tap::TapTempo;
