// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Undo/redo history for reversible transport commands.

use std::collections::VecDeque;

use super::StateSnapshot;

/// Default number of undo steps kept
pub const DEFAULT_HISTORY_DEPTH: usize = 50;

/// Commands that can be undone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversibleCommand {
    SetMasterTempo,
    SetTempoMultiplier,
    SetMasterVolume,
    SetSyncMode,
}

/// One reversible step: the state before and after the command
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub command: ReversibleCommand,
    pub before: StateSnapshot,
    pub after: StateSnapshot,
}

/// Bounded undo stack with a redo stack
#[derive(Debug, Clone)]
pub struct History {
    undo: VecDeque<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    depth: usize,
}

impl History {
    /// Create a history keeping at most `depth` undo steps
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::with_capacity(depth.min(256)),
            redo: Vec::new(),
            depth,
        }
    }

    /// Record a new step; clears anything that could be redone
    pub fn record(&mut self, entry: HistoryEntry) {
        if self.depth == 0 {
            return;
        }
        self.redo.clear();
        self.undo.push_back(entry);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
    }

    /// Take the most recent step for undoing (it becomes redoable)
    pub fn take_undo(&mut self) -> Option<HistoryEntry> {
        let entry = self.undo.pop_back()?;
        self.redo.push(entry.clone());
        Some(entry)
    }

    /// Take the most recently undone step for redoing
    pub fn take_redo(&mut self) -> Option<HistoryEntry> {
        let entry = self.redo.pop()?;
        self.undo.push_back(entry.clone());
        Some(entry)
    }

    /// Most recent undo step, without taking it
    pub fn last_undo(&self) -> Option<&HistoryEntry> {
        self.undo.back()
    }

    /// Most recently undone step, without taking it
    pub fn last_redo(&self) -> Option<&HistoryEntry> {
        self.redo.last()
    }

    /// Check if there is anything to undo
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Check if there is anything to redo
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Number of undo steps
    pub fn len(&self) -> usize {
        self.undo.len()
    }

    /// Check if the undo stack is empty
    pub fn is_empty(&self) -> bool {
        self.undo.is_empty()
    }

    /// Maximum number of undo steps
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Change the depth, dropping the oldest steps if needed
    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
        while self.undo.len() > depth {
            self.undo.pop_front();
        }
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}
