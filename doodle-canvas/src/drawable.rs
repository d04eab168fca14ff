//! Drawable objects derived from the operation log.
//!
//! Drawables are never stored in the log; they are what replay produces.
//! The set keeps insertion order, which doubles as z-order, so two
//! replays of the same prefix compare equal item by item.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Path, Point};

/// Extra tolerance (canvas units) added around a stroke when hit testing.
pub const HIT_SLOP: f32 = 2.0;

/// RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };

    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// How a stroke is painted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Paint {
    pub color: Color,
    /// Stroke width, also the font size for text.
    pub width: f32,
    /// Closed shapes are filled instead of outlined.
    pub fill: bool,
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            width: 2.0,
            fill: false,
        }
    }
}

/// The tool that produced a stroke. Decides how `Continue` reshapes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Pencil,
    Line,
    Arrow,
    Rectangle,
    Text,
}

/// A visible stroke, shape or text box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawnStroke {
    pub id: Uuid,
    pub path: Path,
    pub paint: Paint,
    pub tool: ToolKind,
    /// Set while an eraser passes over the stroke, before the erase fires.
    #[serde(default)]
    pub erased: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl DrawnStroke {
    /// Whether `point` touches the stroke's outline or, for filled
    /// shapes and text boxes, its interior.
    pub fn hit_test(&self, point: Point) -> bool {
        let reach = self.paint.width / 2.0 + HIT_SLOP;
        if let Some(bounds) = self.path.bounds() {
            if !bounds.inflate(reach).contains(point.x, point.y) {
                return false;
            }
        }
        let filled = self.paint.fill || self.text.is_some();
        if filled && self.path.contains(point) {
            return true;
        }
        self.path.distance_to(point) <= reach
    }
}

/// The trail of an eraser drag and the strokes it has touched so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EraserStroke {
    pub id: Uuid,
    pub path: Path,
    pub targets: BTreeSet<Uuid>,
}

/// A lasso selection and the strokes it captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionBound {
    pub id: Uuid,
    pub path: Path,
    pub targets: BTreeSet<Uuid>,
}

/// Anything replay can put on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Drawable {
    Stroke(DrawnStroke),
    Eraser(EraserStroke),
    Selection(SelectionBound),
}

impl Drawable {
    pub fn id(&self) -> Uuid {
        match self {
            Drawable::Stroke(s) => s.id,
            Drawable::Eraser(e) => e.id,
            Drawable::Selection(s) => s.id,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Drawable::Stroke(s) => &s.path,
            Drawable::Eraser(e) => &e.path,
            Drawable::Selection(s) => &s.path,
        }
    }

    pub fn as_stroke(&self) -> Option<&DrawnStroke> {
        match self {
            Drawable::Stroke(s) => Some(s),
            _ => None,
        }
    }
}

/// Ordered set of drawables keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Drawable>", into = "Vec<Drawable>")]
pub struct DrawableSet {
    items: IndexMap<Uuid, Drawable>,
}

impl DrawableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the top, replacing any drawable with the same id in place.
    pub fn insert(&mut self, drawable: Drawable) {
        self.items.insert(drawable.id(), drawable);
    }

    /// Remove while keeping the order of the remaining drawables.
    pub fn remove(&mut self, id: &Uuid) -> Option<Drawable> {
        self.items.shift_remove(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<&Drawable> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Drawable> {
        self.items.get_mut(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Drawable> {
        self.items.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Drawable> {
        self.items.values_mut()
    }

    /// Visible strokes only, in z-order.
    pub fn strokes(&self) -> impl Iterator<Item = &DrawnStroke> {
        self.items.values().filter_map(Drawable::as_stroke)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&Drawable) -> bool) {
        self.items.retain(|_, d| keep(d));
    }
}

/// Equal only when the same drawables appear in the same z-order.
impl PartialEq for DrawableSet {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len() && self.items.iter().eq(other.items.iter())
    }
}

impl From<Vec<Drawable>> for DrawableSet {
    fn from(drawables: Vec<Drawable>) -> Self {
        let mut set = DrawableSet::new();
        for d in drawables {
            set.insert(d);
        }
        set
    }
}

impl From<DrawableSet> for Vec<Drawable> {
    fn from(set: DrawableSet) -> Self {
        set.items.into_values().collect()
    }
}
