//! Replay engine: folds an operation log into drawable state.
//!
//! Replay is a pure left fold. [`ReplayState::apply`] consumes one
//! operation at a time, and [`reconstruct`] is the same fold started from
//! an empty state. Incremental replay from a checkpoint is therefore
//! identical to full replay of the same prefix.
//!
//! Operations that reference an unknown target (orphans left behind by a
//! disconnect or reordering) are ignored and reported as
//! [`ReplayEffect::Ignored`].

use std::collections::{BTreeSet, HashMap, HashSet};

use uuid::Uuid;

use crate::drawable::{
    Drawable, DrawableSet, DrawnStroke, EraserStroke, Paint, SelectionBound, ToolKind,
};
use crate::geometry::{Path, Point};
use crate::operation::{Operation, OperationKind};

/// Length of each arrow-head stroke, in canvas units.
pub const ARROW_HEAD_LENGTH: f32 = 12.0;

/// Text box width per character, relative to the font size.
pub const TEXT_ADVANCE: f32 = 0.6;

/// What applying one operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayEffect {
    Applied,
    /// Orphan or inapplicable operation; state unchanged.
    Ignored,
    /// An erase fired with nothing under it. The whole action is a no-op
    /// and the history prunes it.
    EmptyErase,
}

/// A transform applied through a selection.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Transform {
    Translate(Point),
    Rotate { degrees: f32, center: Point },
    Scale { scale: Point, center: Point },
}

impl Transform {
    fn apply(&self, path: &mut Path) {
        match *self {
            Transform::Translate(delta) => path.translate(delta),
            Transform::Rotate { degrees, center } => path.rotate_about(center, degrees),
            Transform::Scale { scale, center } => path.scale_about(center, scale),
        }
    }

    fn inverse(&self) -> Transform {
        match *self {
            Transform::Translate(d) => Transform::Translate(Point::new(-d.x, -d.y)),
            Transform::Rotate { degrees, center } => Transform::Rotate { degrees: -degrees, center },
            Transform::Scale { scale, center } => Transform::Scale {
                scale: Point::new(recip(scale.x), recip(scale.y)),
                center,
            },
        }
    }
}

fn recip(v: f32) -> f32 {
    if v.abs() <= f32::EPSILON {
        1.0
    } else {
        1.0 / v
    }
}

/// What a remote `Undo` took away, so the matching `Redo` can put it back.
#[derive(Debug, Clone, PartialEq)]
enum Undone {
    /// A drawable that was hidden.
    Hidden(Drawable),
    /// Strokes an erase had removed, now restored.
    Unerased(Vec<Uuid>),
    /// A selection transform that was reverted.
    Transform(Transform),
    /// The canvas a restore produced, set aside while the restore is undone.
    Restored(Box<ReplayState>),
}

/// Drawable state plus the bookkeeping replay needs to keep folding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayState {
    drawables: DrawableSet,
    /// Strokes and erasers still accepting `Continue`.
    open: HashSet<Uuid>,
    /// Strokes removed by each fired eraser.
    erased: HashMap<Uuid, Vec<Drawable>>,
    /// Transforms applied through each selection, oldest first.
    transforms: HashMap<Uuid, Vec<Transform>>,
    /// Per-target stack of remote undos awaiting a redo.
    undone: HashMap<Uuid, Vec<Undone>>,
    /// State each restore replaced, keyed by the restore's target.
    replaced: HashMap<Uuid, Box<ReplayState>>,
}

impl ReplayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drawables(&self) -> &DrawableSet {
        &self.drawables
    }

    pub fn into_drawables(self) -> DrawableSet {
        self.drawables
    }

    /// Fold one operation into the state.
    pub fn apply(&mut self, op: &Operation) -> ReplayEffect {
        let effect = match &op.kind {
            OperationKind::StartStroke { target, point, paint, tool } => {
                self.start_stroke(*target, *point, *paint, *tool)
            }
            OperationKind::Continue { target, point } => self.continue_to(*target, *point),
            OperationKind::EndStroke { target } => {
                if self.open.remove(target) {
                    ReplayEffect::Applied
                } else {
                    ReplayEffect::Ignored
                }
            }
            OperationKind::StartErase { target, point } => self.start_erase(*target, *point),
            OperationKind::TriggerErase { target } => self.trigger_erase(*target),
            OperationKind::AddText { target, point, text, paint } => {
                self.add_text(*target, *point, text, *paint)
            }
            OperationKind::CreateSelection { target, point } => {
                self.create_selection(*target, *point)
            }
            OperationKind::IncreaseSelection { target, point } => {
                self.extend_selection(*target, *point, false)
            }
            OperationKind::EndSelection { target, point } => {
                self.extend_selection(*target, *point, true)
            }
            OperationKind::MoveSelection { target, delta } => {
                self.transform_selection(*target, Transform::Translate(*delta))
            }
            OperationKind::RotateSelection { target, angle, center } => self.transform_selection(
                *target,
                Transform::Rotate { degrees: *angle, center: *center },
            ),
            OperationKind::ScaleSelection { target, scale, center } => self.transform_selection(
                *target,
                Transform::Scale { scale: *scale, center: *center },
            ),
            OperationKind::Undo { target } => self.undo(*target),
            OperationKind::Redo { target } => self.redo(*target),
            OperationKind::RestoreCanvas { target, drawables } => {
                self.restore(*target, drawables)
            }
        };

        if effect == ReplayEffect::Ignored {
            log::debug!(
                "Ignoring orphan {} operation {} (target {})",
                op.kind.name(),
                op.id,
                op.target()
            );
        }
        effect
    }

    // ── Strokes ────────────────────────────────────────────────────

    fn start_stroke(&mut self, id: Uuid, point: Point, paint: Paint, tool: ToolKind) -> ReplayEffect {
        if self.drawables.contains(&id) {
            return ReplayEffect::Ignored;
        }
        self.drawables.insert(Drawable::Stroke(DrawnStroke {
            id,
            path: Path::starting_at(point),
            paint,
            tool,
            erased: false,
            text: None,
        }));
        self.open.insert(id);
        ReplayEffect::Applied
    }

    fn continue_to(&mut self, id: Uuid, point: Point) -> ReplayEffect {
        if !self.open.contains(&id) {
            return ReplayEffect::Ignored;
        }
        if matches!(self.drawables.get(&id), Some(Drawable::Eraser(_))) {
            return self.erase_at(id, point, true);
        }
        let Some(Drawable::Stroke(stroke)) = self.drawables.get_mut(&id) else {
            return ReplayEffect::Ignored;
        };
        let Some(anchor) = stroke.path.first_point() else {
            return ReplayEffect::Ignored;
        };
        match stroke.tool {
            ToolKind::Pencil => stroke.path.line_to(point),
            ToolKind::Line => stroke.path = Path::line(anchor, point),
            ToolKind::Arrow => stroke.path = Path::arrow(anchor, point, ARROW_HEAD_LENGTH),
            ToolKind::Rectangle => stroke.path = Path::rectangle(anchor, point),
            ToolKind::Text => return ReplayEffect::Ignored,
        }
        ReplayEffect::Applied
    }

    fn add_text(&mut self, id: Uuid, point: Point, text: &str, paint: Paint) -> ReplayEffect {
        if self.drawables.contains(&id) {
            return ReplayEffect::Ignored;
        }
        let size = paint.width;
        let width = text.chars().count() as f32 * size * TEXT_ADVANCE;
        let corner = Point::new(point.x + width, point.y + size);
        self.drawables.insert(Drawable::Stroke(DrawnStroke {
            id,
            path: Path::rectangle(point, corner),
            paint,
            tool: ToolKind::Text,
            erased: false,
            text: Some(text.to_string()),
        }));
        ReplayEffect::Applied
    }

    // ── Erase ──────────────────────────────────────────────────────

    fn start_erase(&mut self, id: Uuid, point: Point) -> ReplayEffect {
        if self.drawables.contains(&id) {
            return ReplayEffect::Ignored;
        }
        self.drawables.insert(Drawable::Eraser(EraserStroke {
            id,
            path: Path::new(),
            targets: BTreeSet::new(),
        }));
        self.open.insert(id);
        self.erase_at(id, point, false)
    }

    /// Extend the eraser trail to `point` and flag every stroke under it.
    fn erase_at(&mut self, eraser: Uuid, point: Point, line: bool) -> ReplayEffect {
        let hits: Vec<Uuid> = self
            .drawables
            .strokes()
            .filter(|s| s.hit_test(point))
            .map(|s| s.id)
            .collect();

        for id in &hits {
            if let Some(Drawable::Stroke(s)) = self.drawables.get_mut(id) {
                s.erased = true;
            }
        }

        match self.drawables.get_mut(&eraser) {
            Some(Drawable::Eraser(e)) => {
                if line {
                    e.path.line_to(point);
                } else {
                    e.path.move_to(point);
                }
                e.targets.extend(hits);
                ReplayEffect::Applied
            }
            _ => ReplayEffect::Ignored,
        }
    }

    fn trigger_erase(&mut self, eraser: Uuid) -> ReplayEffect {
        let targets = match self.drawables.get(&eraser) {
            Some(Drawable::Eraser(e)) => e.targets.clone(),
            _ => return ReplayEffect::Ignored,
        };
        self.drawables.remove(&eraser);
        self.open.remove(&eraser);

        if targets.is_empty() {
            return ReplayEffect::EmptyErase;
        }

        let removed: Vec<Drawable> = targets
            .iter()
            .filter_map(|id| self.drawables.remove(id))
            .map(|mut d| {
                if let Drawable::Stroke(s) = &mut d {
                    s.erased = false;
                }
                d
            })
            .collect();
        self.erased.insert(eraser, removed);
        ReplayEffect::Applied
    }

    // ── Selection ──────────────────────────────────────────────────

    fn create_selection(&mut self, id: Uuid, point: Point) -> ReplayEffect {
        if self.drawables.contains(&id) {
            return ReplayEffect::Ignored;
        }
        // One lasso at a time: a new selection replaces the previous one.
        self.drawables.retain(|d| !matches!(d, Drawable::Selection(_)));
        self.drawables.insert(Drawable::Selection(SelectionBound {
            id,
            path: Path::starting_at(point),
            targets: BTreeSet::new(),
        }));
        self.open.insert(id);
        ReplayEffect::Applied
    }

    fn extend_selection(&mut self, id: Uuid, point: Point, finish: bool) -> ReplayEffect {
        if !self.open.contains(&id) {
            return ReplayEffect::Ignored;
        }
        let lasso = match self.drawables.get_mut(&id) {
            Some(Drawable::Selection(sel)) => {
                sel.path.line_to(point);
                if !finish {
                    return ReplayEffect::Applied;
                }
                sel.path.close();
                sel.path.clone()
            }
            _ => return ReplayEffect::Ignored,
        };

        self.open.remove(&id);
        let captured: BTreeSet<Uuid> = self
            .drawables
            .strokes()
            .filter(|s| s.path.points().iter().any(|p| lasso.contains(*p)))
            .map(|s| s.id)
            .collect();
        if let Some(Drawable::Selection(sel)) = self.drawables.get_mut(&id) {
            sel.targets = captured;
        }
        ReplayEffect::Applied
    }

    fn transform_selection(&mut self, id: Uuid, transform: Transform) -> ReplayEffect {
        if !self.apply_transform(id, transform) {
            return ReplayEffect::Ignored;
        }
        self.transforms.entry(id).or_default().push(transform);
        ReplayEffect::Applied
    }

    /// Transform a finished selection and everything it captured.
    fn apply_transform(&mut self, id: Uuid, transform: Transform) -> bool {
        if self.open.contains(&id) {
            return false;
        }
        let targets = match self.drawables.get_mut(&id) {
            Some(Drawable::Selection(sel)) => {
                transform.apply(&mut sel.path);
                sel.targets.clone()
            }
            _ => return false,
        };
        for target in &targets {
            if let Some(Drawable::Stroke(s)) = self.drawables.get_mut(target) {
                transform.apply(&mut s.path);
            }
        }
        true
    }

    // ── Restore ────────────────────────────────────────────────────

    fn restore(&mut self, id: Uuid, drawables: &DrawableSet) -> ReplayEffect {
        let fresh = ReplayState {
            drawables: drawables.clone(),
            ..ReplayState::default()
        };
        let previous = std::mem::replace(self, fresh);
        self.replaced.insert(id, Box::new(previous));
        ReplayEffect::Applied
    }

    // ── Remote undo / redo ─────────────────────────────────────────

    fn undo(&mut self, target: Uuid) -> ReplayEffect {
        // Transforms first: undoing a move on a selection reverts the move
        // rather than hiding the lasso.
        if let Some(last) = self.transforms.get(&target).and_then(|t| t.last()).copied() {
            if self.apply_transform(target, last.inverse()) {
                if let Some(stack) = self.transforms.get_mut(&target) {
                    stack.pop();
                }
                self.push_undone(target, Undone::Transform(last));
                return ReplayEffect::Applied;
            }
        }

        if let Some(drawable) = self.drawables.remove(&target) {
            self.open.remove(&target);
            self.push_undone(target, Undone::Hidden(drawable));
            return ReplayEffect::Applied;
        }

        if let Some(strokes) = self.erased.remove(&target) {
            let ids = strokes.iter().map(Drawable::id).collect();
            for d in strokes {
                self.drawables.insert(d);
            }
            self.push_undone(target, Undone::Unerased(ids));
            return ReplayEffect::Applied;
        }

        if let Some(previous) = self.replaced.remove(&target) {
            let restored = std::mem::replace(self, *previous);
            self.push_undone(target, Undone::Restored(Box::new(restored)));
            return ReplayEffect::Applied;
        }

        ReplayEffect::Ignored
    }

    fn redo(&mut self, target: Uuid) -> ReplayEffect {
        let Some(undone) = self.undone.get_mut(&target).and_then(Vec::pop) else {
            return ReplayEffect::Ignored;
        };
        match undone {
            Undone::Hidden(drawable) => self.drawables.insert(drawable),
            Undone::Unerased(ids) => {
                let removed = ids.iter().filter_map(|id| self.drawables.remove(id)).collect();
                self.erased.insert(target, removed);
            }
            Undone::Transform(transform) => {
                if self.apply_transform(target, transform) {
                    self.transforms.entry(target).or_default().push(transform);
                }
            }
            Undone::Restored(restored) => {
                let previous = std::mem::replace(self, *restored);
                self.replaced.insert(target, Box::new(previous));
            }
        }
        ReplayEffect::Applied
    }

    fn push_undone(&mut self, target: Uuid, undone: Undone) {
        self.undone.entry(target).or_default().push(undone);
    }
}

/// Replay a log prefix from an empty canvas.
pub fn replay(ops: &[Operation]) -> ReplayState {
    let mut state = ReplayState::new();
    for op in ops {
        state.apply(op);
    }
    state
}

/// Derive the drawable set for a log prefix.
pub fn reconstruct(ops: &[Operation]) -> DrawableSet {
    replay(ops).into_drawables()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawable::Color;
    use crate::operation::Gesture;

    fn pencil(points: &[(f32, f32)]) -> (Gesture, Vec<Operation>) {
        let g = Gesture::new();
        let mut ops = Vec::new();
        let (x, y) = points[0];
        ops.push(g.start_stroke(Point::new(x, y), Paint::default(), ToolKind::Pencil));
        for &(x, y) in &points[1..] {
            ops.push(g.continue_to(Point::new(x, y)));
        }
        ops.push(g.end_stroke());
        (g, ops)
    }

    fn stroke(set: &DrawableSet, id: Uuid) -> &DrawnStroke {
        set.get(&id).and_then(Drawable::as_stroke).expect("stroke present")
    }

    #[test]
    fn test_pencil_stroke_points() {
        let (g, ops) = pencil(&[(0.0, 0.0), (10.0, 0.0), (20.0, 5.0)]);
        let set = reconstruct(&ops);
        assert_eq!(set.len(), 1);
        assert_eq!(stroke(&set, g.target()).path.points().len(), 3);
    }

    #[test]
    fn test_reconstruct_is_deterministic() {
        let (_, mut ops) = pencil(&[(0.0, 0.0), (10.0, 0.0)]);
        let (_, more) = pencil(&[(5.0, 5.0), (5.0, 50.0)]);
        ops.extend(more);
        let eraser = Gesture::new();
        ops.push(eraser.start_erase(Point::new(5.0, 20.0)));
        ops.push(eraser.trigger_erase());

        assert_eq!(reconstruct(&ops), reconstruct(&ops));
        for cut in 0..=ops.len() {
            assert_eq!(reconstruct(&ops[..cut]), reconstruct(&ops[..cut]));
        }
    }

    #[test]
    fn test_incremental_matches_full() {
        let (_, mut ops) = pencil(&[(0.0, 0.0), (10.0, 0.0)]);
        let (_, more) = pencil(&[(0.0, 10.0), (10.0, 10.0)]);
        ops.extend(more);

        let mut state = replay(&ops[..2]);
        for op in &ops[2..] {
            state.apply(op);
        }
        assert_eq!(state, replay(&ops));
    }

    #[test]
    fn test_shape_tools_rebuild_geometry() {
        let g = Gesture::new();
        let ops = vec![
            g.start_stroke(Point::new(0.0, 0.0), Paint::default(), ToolKind::Rectangle),
            g.continue_to(Point::new(5.0, 5.0)),
            g.continue_to(Point::new(10.0, 20.0)),
            g.end_stroke(),
        ];
        let set = reconstruct(&ops);
        let rect = stroke(&set, g.target());
        assert_eq!(
            rect.path,
            Path::rectangle(Point::new(0.0, 0.0), Point::new(10.0, 20.0))
        );

        let line = Gesture::new();
        let ops = vec![
            line.start_stroke(Point::new(1.0, 1.0), Paint::default(), ToolKind::Line),
            line.continue_to(Point::new(2.0, 2.0)),
            line.continue_to(Point::new(3.0, 3.0)),
        ];
        let set = reconstruct(&ops);
        assert_eq!(
            stroke(&set, line.target()).path,
            Path::line(Point::new(1.0, 1.0), Point::new(3.0, 3.0))
        );
    }

    #[test]
    fn test_orphan_operations_are_ignored() {
        let g = Gesture::new();
        let mut state = ReplayState::new();
        assert_eq!(state.apply(&g.continue_to(Point::ORIGIN)), ReplayEffect::Ignored);
        assert_eq!(state.apply(&g.end_stroke()), ReplayEffect::Ignored);
        assert_eq!(state.apply(&g.trigger_erase()), ReplayEffect::Ignored);
        assert_eq!(state.apply(&Operation::undo(g.target())), ReplayEffect::Ignored);
        assert_eq!(state.apply(&Operation::redo(g.target())), ReplayEffect::Ignored);
        assert!(state.drawables().is_empty());
    }

    #[test]
    fn test_continue_after_end_is_ignored() {
        let (g, ops) = pencil(&[(0.0, 0.0), (10.0, 0.0)]);
        let mut state = replay(&ops);
        assert_eq!(state.apply(&g.continue_to(Point::new(99.0, 99.0))), ReplayEffect::Ignored);
        assert_eq!(stroke(state.drawables(), g.target()).path.points().len(), 2);
    }

    #[test]
    fn test_dangling_action_is_visible_but_harmless() {
        let g = Gesture::new();
        let ops = vec![
            g.start_stroke(Point::ORIGIN, Paint::default(), ToolKind::Pencil),
            g.continue_to(Point::new(3.0, 3.0)),
        ];
        let set = reconstruct(&ops);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_erase_flags_then_removes() {
        let (a, mut ops) = pencil(&[(0.0, 0.0), (100.0, 0.0)]);
        let (b, more) = pencil(&[(0.0, 50.0), (100.0, 50.0)]);
        ops.extend(more);

        let eraser = Gesture::new();
        ops.push(eraser.start_erase(Point::new(50.0, 1.0)));
        let set = reconstruct(&ops);
        assert!(stroke(&set, a.target()).erased);
        assert!(!stroke(&set, b.target()).erased);
        match set.get(&eraser.target()) {
            Some(Drawable::Eraser(e)) => assert!(e.targets.contains(&a.target())),
            other => panic!("expected eraser, got {other:?}"),
        }

        ops.push(eraser.trigger_erase());
        let set = reconstruct(&ops);
        assert!(!set.contains(&a.target()));
        assert!(!set.contains(&eraser.target()));
        assert!(set.contains(&b.target()));
    }

    #[test]
    fn test_erase_drag_collects_multiple_targets() {
        let (a, mut ops) = pencil(&[(0.0, 0.0), (100.0, 0.0)]);
        let (b, more) = pencil(&[(0.0, 50.0), (100.0, 50.0)]);
        ops.extend(more);

        let eraser = Gesture::new();
        ops.push(eraser.start_erase(Point::new(10.0, 0.0)));
        ops.push(eraser.continue_to(Point::new(10.0, 25.0)));
        ops.push(eraser.continue_to(Point::new(10.0, 50.0)));
        ops.push(eraser.trigger_erase());

        let set = reconstruct(&ops);
        assert!(!set.contains(&a.target()));
        assert!(!set.contains(&b.target()));
        assert!(set.is_empty());
    }

    #[test]
    fn test_empty_erase_effect() {
        let (_, ops) = pencil(&[(0.0, 0.0), (10.0, 0.0)]);
        let mut state = replay(&ops);
        let eraser = Gesture::new();
        assert_eq!(
            state.apply(&eraser.start_erase(Point::new(500.0, 500.0))),
            ReplayEffect::Applied
        );
        assert_eq!(state.apply(&eraser.trigger_erase()), ReplayEffect::EmptyErase);
        assert_eq!(state.drawables().len(), 1);
    }

    #[test]
    fn test_text_box_and_erase() {
        let t = Gesture::new();
        let paint = Paint { color: Color::rgba(10, 20, 30, 255), width: 10.0, fill: false };
        let mut ops = vec![t.add_text(Point::new(0.0, 0.0), "hello", paint)];
        let set = reconstruct(&ops);
        let text = stroke(&set, t.target());
        assert_eq!(text.text.as_deref(), Some("hello"));
        let bounds = text.path.bounds().unwrap();
        assert!((bounds.width() - 30.0).abs() < 1e-4);
        assert!((bounds.height() - 10.0).abs() < 1e-4);

        // Text boxes are hit anywhere inside.
        let eraser = Gesture::new();
        ops.push(eraser.start_erase(Point::new(15.0, 5.0)));
        ops.push(eraser.trigger_erase());
        assert!(reconstruct(&ops).is_empty());
    }

    fn selected_square() -> (Gesture, Gesture, Vec<Operation>) {
        let (stroke_g, mut ops) = pencil(&[(10.0, 10.0), (20.0, 20.0)]);
        let sel = Gesture::new();
        ops.push(sel.create_selection(Point::new(0.0, 0.0)));
        ops.push(sel.increase_selection(Point::new(50.0, 0.0)));
        ops.push(sel.increase_selection(Point::new(50.0, 50.0)));
        ops.push(sel.end_selection(Point::new(0.0, 50.0)));
        (stroke_g, sel, ops)
    }

    #[test]
    fn test_selection_captures_strokes() {
        let (stroke_g, sel, ops) = selected_square();
        let set = reconstruct(&ops);
        match set.get(&sel.target()) {
            Some(Drawable::Selection(bound)) => {
                assert!(bound.path.is_closed());
                assert!(bound.targets.contains(&stroke_g.target()));
            }
            other => panic!("expected selection, got {other:?}"),
        }
    }

    #[test]
    fn test_new_selection_replaces_old() {
        let (_, sel, mut ops) = selected_square();
        let next = Gesture::new();
        ops.push(next.create_selection(Point::new(100.0, 100.0)));
        let set = reconstruct(&ops);
        assert!(!set.contains(&sel.target()));
        assert!(set.contains(&next.target()));
    }

    #[test]
    fn test_move_rotate_scale_selection() {
        let (stroke_g, sel, mut ops) = selected_square();
        let mover = Gesture::on(sel.target());
        ops.push(mover.move_selection(Point::new(5.0, 0.0)));
        let set = reconstruct(&ops);
        assert_eq!(
            stroke(&set, stroke_g.target()).path.points(),
            vec![Point::new(15.0, 10.0), Point::new(25.0, 20.0)]
        );

        ops.push(Gesture::on(sel.target()).scale_selection(Point::new(2.0, 2.0), Point::new(15.0, 10.0)));
        let set = reconstruct(&ops);
        assert_eq!(stroke(&set, stroke_g.target()).path.points()[1], Point::new(35.0, 30.0));

        ops.push(Gesture::on(sel.target()).rotate_selection(180.0, Point::new(15.0, 10.0)));
        let set = reconstruct(&ops);
        let end = stroke(&set, stroke_g.target()).path.points()[1];
        assert!((end.x + 5.0).abs() < 1e-3);
        assert!((end.y + 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_move_unknown_selection_ignored() {
        let mut state = ReplayState::new();
        let op = Gesture::new().move_selection(Point::new(1.0, 1.0));
        assert_eq!(state.apply(&op), ReplayEffect::Ignored);
    }

    #[test]
    fn test_remote_undo_redo_of_stroke() {
        let (g, mut ops) = pencil(&[(0.0, 0.0), (10.0, 0.0)]);
        ops.push(Operation::undo(g.target()));
        assert!(reconstruct(&ops).is_empty());
        ops.push(Operation::redo(g.target()));
        let set = reconstruct(&ops);
        assert!(set.contains(&g.target()));
        // A second redo has nothing left to restore.
        ops.push(Operation::redo(g.target()));
        assert_eq!(reconstruct(&ops), set);
    }

    #[test]
    fn test_remote_undo_of_erase_restores_strokes() {
        let (a, mut ops) = pencil(&[(0.0, 0.0), (100.0, 0.0)]);
        let eraser = Gesture::new();
        ops.push(eraser.start_erase(Point::new(50.0, 0.0)));
        ops.push(eraser.trigger_erase());
        assert!(reconstruct(&ops).is_empty());

        ops.push(Operation::undo(eraser.target()));
        let set = reconstruct(&ops);
        assert!(set.contains(&a.target()));
        assert!(!stroke(&set, a.target()).erased);

        ops.push(Operation::redo(eraser.target()));
        assert!(reconstruct(&ops).is_empty());
    }

    #[test]
    fn test_remote_undo_of_move_reverts_transform() {
        let (stroke_g, sel, mut ops) = selected_square();
        let before = reconstruct(&ops);
        ops.push(Gesture::on(sel.target()).move_selection(Point::new(7.0, 3.0)));
        ops.push(Operation::undo(sel.target()));
        let after = reconstruct(&ops);
        assert_eq!(
            stroke(&after, stroke_g.target()).path,
            stroke(&before, stroke_g.target()).path
        );
        // The selection itself is still there.
        assert!(after.contains(&sel.target()));
    }

    #[test]
    fn test_restore_canvas_replaces_everything() {
        let (_, ops) = pencil(&[(0.0, 0.0), (10.0, 0.0)]);
        let snapshot = reconstruct(&ops);

        let (_, mut other) = pencil(&[(5.0, 5.0), (6.0, 6.0)]);
        other.push(Operation::restore_canvas(snapshot.clone()));
        assert_eq!(reconstruct(&other), snapshot);
    }

    #[test]
    fn test_remote_undo_redo_of_restore() {
        let (_, opened) = pencil(&[(0.0, 0.0), (10.0, 0.0)]);
        let document = reconstruct(&opened);

        let (_, mut ops) = pencil(&[(5.0, 5.0), (6.0, 6.0)]);
        let before = reconstruct(&ops);
        let restore = Operation::restore_canvas(document.clone());
        let target = restore.target();
        ops.push(restore);
        assert_eq!(reconstruct(&ops), document);

        ops.push(Operation::undo(target));
        assert_eq!(reconstruct(&ops), before);

        ops.push(Operation::redo(target));
        assert_eq!(reconstruct(&ops), document);

        // Undo works again after the redo.
        ops.push(Operation::undo(target));
        assert_eq!(reconstruct(&ops), before);
    }
}
