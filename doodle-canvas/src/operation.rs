//! Operation log records.
//!
//! Every canvas mutation is an [`Operation`]: an immutable, timestamped
//! record tagged with the logical action (`sequence`) it belongs to. One
//! gesture decomposes into a start/continue*/end run of operations that
//! share a sequence id:
//!
//! ```text
//! StartStroke ── Continue ── Continue ── EndStroke      (one action)
//! StartErase  ── Continue ── TriggerErase               (one action)
//! CreateSelection ── IncreaseSelection ── EndSelection  (one action)
//! MoveSelection                                          (one action)
//! ```
//!
//! On the wire each record is a flat JSON object with a `type`
//! discriminator, e.g. `{"id":…,"sequence":…,"timestamp":…,
//! "type":"continue","target":…,"point":{"x":1.0,"y":2.0}}`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::drawable::{DrawableSet, Paint, ToolKind};
use crate::geometry::Point;

/// Where an operation sits inside its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Continue,
    /// Completes the action. Undo and redo stop on these.
    Terminal,
}

/// The closed set of canvas mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    StartStroke {
        target: Uuid,
        point: Point,
        paint: Paint,
        tool: ToolKind,
    },
    /// Extend whatever `target` names: a stroke, a shape drag or an eraser.
    Continue {
        target: Uuid,
        point: Point,
    },
    EndStroke {
        target: Uuid,
    },
    StartErase {
        target: Uuid,
        point: Point,
    },
    TriggerErase {
        target: Uuid,
    },
    AddText {
        target: Uuid,
        point: Point,
        text: String,
        paint: Paint,
    },
    CreateSelection {
        target: Uuid,
        point: Point,
    },
    IncreaseSelection {
        target: Uuid,
        point: Point,
    },
    EndSelection {
        target: Uuid,
        point: Point,
    },
    MoveSelection {
        target: Uuid,
        delta: Point,
    },
    /// `angle` in degrees.
    RotateSelection {
        target: Uuid,
        angle: f32,
        center: Point,
    },
    ScaleSelection {
        target: Uuid,
        scale: Point,
        center: Point,
    },
    /// A remote participant undid the action that targeted `target`.
    Undo {
        target: Uuid,
    },
    Redo {
        target: Uuid,
    },
    /// Replace the whole canvas. `target` names the restore itself so peers
    /// can undo it.
    RestoreCanvas {
        target: Uuid,
        drawables: DrawableSet,
    },
}

impl OperationKind {
    /// The stroke, selection or restore this operation affects.
    pub fn target(&self) -> Uuid {
        match self {
            OperationKind::StartStroke { target, .. }
            | OperationKind::Continue { target, .. }
            | OperationKind::EndStroke { target }
            | OperationKind::StartErase { target, .. }
            | OperationKind::TriggerErase { target }
            | OperationKind::AddText { target, .. }
            | OperationKind::CreateSelection { target, .. }
            | OperationKind::IncreaseSelection { target, .. }
            | OperationKind::EndSelection { target, .. }
            | OperationKind::MoveSelection { target, .. }
            | OperationKind::RotateSelection { target, .. }
            | OperationKind::ScaleSelection { target, .. }
            | OperationKind::Undo { target }
            | OperationKind::Redo { target }
            | OperationKind::RestoreCanvas { target, .. } => *target,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            OperationKind::StartStroke { .. }
            | OperationKind::StartErase { .. }
            | OperationKind::CreateSelection { .. } => Phase::Start,
            OperationKind::Continue { .. } | OperationKind::IncreaseSelection { .. } => {
                Phase::Continue
            }
            OperationKind::EndStroke { .. }
            | OperationKind::TriggerErase { .. }
            | OperationKind::AddText { .. }
            | OperationKind::EndSelection { .. }
            | OperationKind::MoveSelection { .. }
            | OperationKind::RotateSelection { .. }
            | OperationKind::ScaleSelection { .. }
            | OperationKind::Undo { .. }
            | OperationKind::Redo { .. }
            | OperationKind::RestoreCanvas { .. } => Phase::Terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase() == Phase::Terminal
    }

    /// Wire name of the variant, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::StartStroke { .. } => "start_stroke",
            OperationKind::Continue { .. } => "continue",
            OperationKind::EndStroke { .. } => "end_stroke",
            OperationKind::StartErase { .. } => "start_erase",
            OperationKind::TriggerErase { .. } => "trigger_erase",
            OperationKind::AddText { .. } => "add_text",
            OperationKind::CreateSelection { .. } => "create_selection",
            OperationKind::IncreaseSelection { .. } => "increase_selection",
            OperationKind::EndSelection { .. } => "end_selection",
            OperationKind::MoveSelection { .. } => "move_selection",
            OperationKind::RotateSelection { .. } => "rotate_selection",
            OperationKind::ScaleSelection { .. } => "scale_selection",
            OperationKind::Undo { .. } => "undo",
            OperationKind::Redo { .. } => "redo",
            OperationKind::RestoreCanvas { .. } => "restore_canvas",
        }
    }
}

/// One immutable entry of the operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique per record.
    pub id: Uuid,
    /// The logical action this record belongs to.
    pub sequence: Uuid,
    /// Milliseconds since Unix epoch.
    pub timestamp: i64,
    #[serde(flatten)]
    pub kind: OperationKind,
}

impl Operation {
    /// Stamp a new record with a fresh id and the current time.
    pub fn new(sequence: Uuid, kind: OperationKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            timestamp: now_ms(),
            kind,
        }
    }

    /// Standalone undo notice for peers. Forms its own action.
    pub fn undo(target: Uuid) -> Self {
        Self::new(Uuid::new_v4(), OperationKind::Undo { target })
    }

    pub fn redo(target: Uuid) -> Self {
        Self::new(Uuid::new_v4(), OperationKind::Redo { target })
    }

    pub fn restore_canvas(drawables: DrawableSet) -> Self {
        Self::new(
            Uuid::new_v4(),
            OperationKind::RestoreCanvas {
                target: Uuid::new_v4(),
                drawables,
            },
        )
    }

    pub fn target(&self) -> Uuid {
        self.kind.target()
    }
}

/// Current time as milliseconds since Unix epoch.
fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

/// Builds the operations of one user action.
///
/// All records share one sequence id and, unless stated otherwise, one
/// target id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gesture {
    sequence: Uuid,
    target: Uuid,
}

impl Default for Gesture {
    fn default() -> Self {
        Self::new()
    }
}

impl Gesture {
    /// New action creating a new object.
    pub fn new() -> Self {
        Self {
            sequence: Uuid::new_v4(),
            target: Uuid::new_v4(),
        }
    }

    /// New action on an existing object, e.g. moving a selection.
    pub fn on(target: Uuid) -> Self {
        Self {
            sequence: Uuid::new_v4(),
            target,
        }
    }

    pub fn sequence(&self) -> Uuid {
        self.sequence
    }

    pub fn target(&self) -> Uuid {
        self.target
    }

    pub fn op(&self, kind: OperationKind) -> Operation {
        Operation::new(self.sequence, kind)
    }

    pub fn start_stroke(&self, point: Point, paint: Paint, tool: ToolKind) -> Operation {
        self.op(OperationKind::StartStroke { target: self.target, point, paint, tool })
    }

    pub fn continue_to(&self, point: Point) -> Operation {
        self.op(OperationKind::Continue { target: self.target, point })
    }

    pub fn end_stroke(&self) -> Operation {
        self.op(OperationKind::EndStroke { target: self.target })
    }

    pub fn start_erase(&self, point: Point) -> Operation {
        self.op(OperationKind::StartErase { target: self.target, point })
    }

    pub fn trigger_erase(&self) -> Operation {
        self.op(OperationKind::TriggerErase { target: self.target })
    }

    pub fn add_text(&self, point: Point, text: impl Into<String>, paint: Paint) -> Operation {
        self.op(OperationKind::AddText {
            target: self.target,
            point,
            text: text.into(),
            paint,
        })
    }

    pub fn create_selection(&self, point: Point) -> Operation {
        self.op(OperationKind::CreateSelection { target: self.target, point })
    }

    pub fn increase_selection(&self, point: Point) -> Operation {
        self.op(OperationKind::IncreaseSelection { target: self.target, point })
    }

    pub fn end_selection(&self, point: Point) -> Operation {
        self.op(OperationKind::EndSelection { target: self.target, point })
    }

    pub fn move_selection(&self, delta: Point) -> Operation {
        self.op(OperationKind::MoveSelection { target: self.target, delta })
    }

    pub fn rotate_selection(&self, angle: f32, center: Point) -> Operation {
        self.op(OperationKind::RotateSelection { target: self.target, angle, center })
    }

    pub fn scale_selection(&self, scale: Point, center: Point) -> Operation {
        self.op(OperationKind::ScaleSelection { target: self.target, scale, center })
    }
}
