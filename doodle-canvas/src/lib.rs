//! # doodle-canvas - Operation log and replay engine for a shared canvas
//!
//! Every edit is an immutable [`Operation`] appended to a log. The visible
//! canvas is never stored; it is derived by replaying the log up to a
//! cursor. Undo and redo only move the cursor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  apply   ┌───────────────┐  fold   ┌──────────────┐
//! │ Operation   │ ───────► │ CanvasHistory │ ──────► │ ReplayState  │
//! │ (Gesture)   │          │ log + cursor  │         │ DrawableSet  │
//! └─────────────┘          └───────┬───────┘         └──────────────┘
//!                                  │ every N ops            ▲
//!                                  ▼                        │
//!                          ┌───────────────┐   delta replay │
//!                          │  Checkpoint   │ ───────────────┘
//!                          └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`geometry`]: Points, path commands and the compact path string codec
//! - [`drawable`]: Strokes, erasers, selections and the ordered drawable set
//! - [`operation`]: The operation record and its closed set of kinds
//! - [`replay`]: Deterministic reconstruction of drawables from the log
//! - [`history`]: Cursor, linear undo/redo, checkpoints and snapshots
//! - [`document`]: Save and open canvas documents

pub mod geometry;
pub mod drawable;
pub mod operation;
pub mod replay;
pub mod history;
pub mod document;

pub use geometry::{Aabb, Path, PathCommand, PathParseError, Point};
pub use drawable::{
    Color, Drawable, DrawableSet, DrawnStroke, EraserStroke, Paint, SelectionBound, ToolKind,
};
pub use operation::{Gesture, Operation, OperationKind, Phase};
pub use replay::{reconstruct, replay, ReplayEffect, ReplayState};
pub use history::{ActionRef, ApplyOutcome, CanvasHistory, CanvasSnapshot, HistoryConfig};
pub use document::{CanvasDocument, DocumentError};
