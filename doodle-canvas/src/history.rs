//! Local canvas history: the operation log, a cursor into it, and a
//! periodic checkpoint of the replayed state.
//!
//! ```text
//!  log:    [op0 op1 op2 ... op9 | op10 op11 op12 | op13 op14]
//!                               ^                 ^          ^
//!                       checkpoint.cursor       cursor      len
//! ```
//!
//! Everything before `cursor` is live; everything after it is the redo
//! tail, discarded by the next `apply`. Seeking forward replays from the
//! current state; seeking backward replays from the checkpoint when it
//! lies at or before the target, otherwise from the start of the log.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::drawable::DrawableSet;
use crate::operation::Operation;
use crate::replay::{replay, ReplayEffect, ReplayState};

/// Tuning for a [`CanvasHistory`].
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Appended operations between checkpoints. Zero disables checkpoints.
    pub checkpoint_interval: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 10,
        }
    }
}

/// Replayed state cached at a cursor position.
#[derive(Debug, Clone)]
struct Checkpoint {
    cursor: usize,
    state: ReplayState,
}

/// The action moved over by an undo or redo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionRef {
    pub sequence: Uuid,
    /// Target of the action's first operation; peers receive this in the
    /// broadcast `Undo` / `Redo`.
    pub target: Uuid,
}

/// What [`CanvasHistory::apply`] did to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Appended,
    /// The operation completed an erase that hit nothing, so the whole
    /// action was dropped from the log.
    PrunedEmptyErase { removed: usize },
}

/// Full log plus cursor, as handed from a host to a joining participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasSnapshot {
    pub operations: Vec<Operation>,
    pub cursor: usize,
}

/// Linear undo/redo history over the operation log.
#[derive(Debug, Clone, Default)]
pub struct CanvasHistory {
    config: HistoryConfig,
    log: Vec<Operation>,
    cursor: usize,
    state: ReplayState,
    checkpoint: Option<Checkpoint>,
    appended_since_checkpoint: usize,
}

impl CanvasHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: HistoryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn from_snapshot(snapshot: CanvasSnapshot, config: HistoryConfig) -> Self {
        let mut history = Self::with_config(config);
        history.seed(snapshot);
        history
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Append an operation at the cursor and replay it.
    ///
    /// Any redo tail is discarded first.
    pub fn apply(&mut self, op: Operation) -> ApplyOutcome {
        if self.cursor < self.log.len() {
            log::debug!(
                "Truncating {} operation(s) past cursor {}",
                self.log.len() - self.cursor,
                self.cursor
            );
            self.log.truncate(self.cursor);
            self.invalidate_checkpoint_after(self.cursor);
        }

        let sequence = op.sequence;
        self.log.push(op);
        self.cursor = self.log.len();
        self.appended_since_checkpoint += 1;

        let effect = self.state.apply(&self.log[self.cursor - 1]);
        if effect == ReplayEffect::EmptyErase {
            return self.prune_sequence(sequence);
        }

        self.maybe_checkpoint();
        ApplyOutcome::Appended
    }

    /// Drop every operation of `sequence` from the log.
    ///
    /// An empty erase leaves nothing behind in the replayed state, so only
    /// the log and the checkpoint need fixing up.
    fn prune_sequence(&mut self, sequence: Uuid) -> ApplyOutcome {
        let first = self
            .log
            .iter()
            .position(|op| op.sequence == sequence)
            .unwrap_or(self.log.len());
        let before = self.log.len();
        self.log.retain(|op| op.sequence != sequence);
        let removed = before - self.log.len();

        self.cursor = self.log.len();
        self.appended_since_checkpoint = self.appended_since_checkpoint.saturating_sub(removed);
        self.invalidate_checkpoint_after(first);

        log::debug!("Pruned empty erase {} ({} operations)", sequence, removed);
        ApplyOutcome::PrunedEmptyErase { removed }
    }

    /// First and last index of the action `undo` would step over.
    fn undo_span(&self) -> Option<(usize, usize)> {
        let end = self.log[..self.cursor]
            .iter()
            .rposition(|op| op.kind.is_terminal())?;
        let sequence = self.log[end].sequence;
        let start = self.log[..=end]
            .iter()
            .position(|op| op.sequence == sequence)
            .unwrap_or(end);
        Some((start, end))
    }

    /// The record completing the action `undo` would step over.
    pub fn peek_undo(&self) -> Option<&Operation> {
        self.undo_span().map(|(_, end)| &self.log[end])
    }

    /// The record opening the action `redo` would step over.
    pub fn peek_redo(&self) -> Option<&Operation> {
        self.log.get(self.cursor)
    }

    /// Step back over the most recent completed action.
    pub fn undo(&mut self) -> Option<ActionRef> {
        let (start, _) = self.undo_span()?;
        let action = ActionRef {
            sequence: self.log[start].sequence,
            target: self.log[start].target(),
        };

        self.seek(start);
        Some(action)
    }

    /// Step forward over the action starting at the cursor.
    pub fn redo(&mut self) -> Option<ActionRef> {
        let next = self.log.get(self.cursor)?;
        let action = ActionRef {
            sequence: next.sequence,
            target: next.target(),
        };
        let end = self.log[self.cursor..]
            .iter()
            .rposition(|op| op.sequence == action.sequence)
            .map_or(self.cursor + 1, |i| self.cursor + i + 1);

        self.seek(end);
        Some(action)
    }

    pub fn can_undo(&self) -> bool {
        self.log[..self.cursor].iter().any(|op| op.kind.is_terminal())
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.log.len()
    }

    /// Move the cursor and bring the replayed state in line with it.
    pub fn seek(&mut self, target: usize) {
        let target = target.min(self.log.len());
        if target >= self.cursor {
            for op in &self.log[self.cursor..target] {
                self.state.apply(op);
            }
        } else {
            self.state = self.rebuild(target);
        }
        self.cursor = target;
    }

    /// Replay up to `target`, from the checkpoint when it is usable.
    fn rebuild(&mut self, target: usize) -> ReplayState {
        if let Some(cp) = self.checkpoint.as_ref().filter(|cp| cp.cursor <= target) {
            let mut state = cp.state.clone();
            for op in &self.log[cp.cursor..target] {
                state.apply(op);
            }
            return state;
        }
        if let Some(cp) = self.checkpoint.take() {
            log::debug!("Checkpoint at {} invalidated by seek to {}", cp.cursor, target);
        }
        replay(&self.log[..target])
    }

    fn invalidate_checkpoint_after(&mut self, index: usize) {
        if self.checkpoint.as_ref().is_some_and(|cp| cp.cursor > index) {
            self.checkpoint = None;
            self.appended_since_checkpoint = self.cursor;
        }
    }

    fn maybe_checkpoint(&mut self) {
        let interval = self.config.checkpoint_interval;
        if interval == 0 || self.appended_since_checkpoint < interval {
            return;
        }
        self.checkpoint = Some(Checkpoint {
            cursor: self.cursor,
            state: self.state.clone(),
        });
        self.appended_since_checkpoint = 0;
    }

    /// Export the whole log, redo tail included.
    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot {
            operations: self.log.clone(),
            cursor: self.cursor,
        }
    }

    /// Replace the history with a snapshot received from a peer.
    pub fn seed(&mut self, snapshot: CanvasSnapshot) {
        self.log = snapshot.operations;
        self.cursor = snapshot.cursor.min(self.log.len());
        self.checkpoint = None;
        self.state = replay(&self.log[..self.cursor]);
        self.appended_since_checkpoint = self.cursor;
        self.maybe_checkpoint();
    }

    /// Whether an operation with this record id is already in the log.
    pub fn contains(&self, op_id: Uuid) -> bool {
        self.log.iter().any(|op| op.id == op_id)
    }

    pub fn drawables(&self) -> &DrawableSet {
        self.state.drawables()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.log
    }

    /// Operations up to the cursor.
    pub fn live_operations(&self) -> &[Operation] {
        &self.log[..self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn checkpoint_cursor(&self) -> Option<usize> {
        self.checkpoint.as_ref().map(|cp| cp.cursor)
    }
}
