//! Canvas geometry: points, path commands and hit testing.
//!
//! Paths travel over the wire and into document files as compact
//! path-command strings rather than point arrays:
//!
//! ```text
//! M 10 20 L 30 40 Q 35 45 50 60 C 1 2 3 4 5 6 Z
//! │       │       │             │             └ close
//! │       │       │             └ cubic: ctrl1, ctrl2, end
//! │       │       └ quadratic: ctrl, end
//! │       └ line-to
//! └ move-to
//! ```
//!
//! Curves are flattened into fixed-size polylines for hit testing so the
//! result depends only on the path itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of line segments used to approximate one curve segment.
pub const CURVE_SEGMENTS: usize = 8;

// ───────────────────────────────────────────────────────────────────
// Point
// ───────────────────────────────────────────────────────────────────

/// 2D position in canvas coordinates. Also used for deltas and
/// per-axis scale factors.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(self, delta: Point) -> Point {
        Point::new(self.x + delta.x, self.y + delta.y)
    }

    /// Rotate around `center` by `degrees` (clockwise in screen space).
    pub fn rotate_about(self, center: Point, degrees: f32) -> Point {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let dx = self.x - center.x;
        let dy = self.y - center.y;
        Point::new(
            center.x + dx * cos - dy * sin,
            center.y + dx * sin + dy * cos,
        )
    }

    /// Scale away from `center` by the per-axis factors in `scale`.
    pub fn scale_about(self, center: Point, scale: Point) -> Point {
        Point::new(
            center.x + (self.x - center.x) * scale.x,
            center.y + (self.y - center.y) * scale.y,
        )
    }
}

// ───────────────────────────────────────────────────────────────────
// Aabb
// ───────────────────────────────────────────────────────────────────

/// Axis-aligned bounding box stored as min/max corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Aabb {
    /// Smallest box containing every point. `None` for an empty iterator.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut aabb = Aabb {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in iter {
            aabb.min_x = aabb.min_x.min(p.x);
            aabb.min_y = aabb.min_y.min(p.y);
            aabb.max_x = aabb.max_x.max(p.x);
            aabb.max_y = aabb.max_y.max(p.y);
        }
        Some(aabb)
    }

    #[inline(always)]
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.min_x && px <= self.max_x && py >= self.min_y && py <= self.max_y
    }

    /// Grow the box by `margin` on every side.
    pub fn inflate(&self, margin: f32) -> Aabb {
        Aabb {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}

// ───────────────────────────────────────────────────────────────────
// Path
// ───────────────────────────────────────────────────────────────────

/// One drawing command of a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    QuadTo { ctrl: Point, to: Point },
    CubicTo { ctrl1: Point, ctrl2: Point, to: Point },
    Close,
}

impl PathCommand {
    /// The on-curve end point of this command. `None` for `Close`.
    pub fn end_point(&self) -> Option<Point> {
        match *self {
            PathCommand::MoveTo(p) | PathCommand::LineTo(p) => Some(p),
            PathCommand::QuadTo { to, .. } | PathCommand::CubicTo { to, .. } => Some(to),
            PathCommand::Close => None,
        }
    }

    fn map_points(self, f: &impl Fn(Point) -> Point) -> PathCommand {
        match self {
            PathCommand::MoveTo(p) => PathCommand::MoveTo(f(p)),
            PathCommand::LineTo(p) => PathCommand::LineTo(f(p)),
            PathCommand::QuadTo { ctrl, to } => PathCommand::QuadTo { ctrl: f(ctrl), to: f(to) },
            PathCommand::CubicTo { ctrl1, ctrl2, to } => PathCommand::CubicTo {
                ctrl1: f(ctrl1),
                ctrl2: f(ctrl2),
                to: f(to),
            },
            PathCommand::Close => PathCommand::Close,
        }
    }
}

/// A flattened sub-path.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub points: Vec<Point>,
    pub closed: bool,
}

/// Vector path made of move/line/curve/close commands.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    commands: Vec<PathCommand>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    /// A path consisting of a single `M point`.
    pub fn starting_at(point: Point) -> Self {
        Self {
            commands: vec![PathCommand::MoveTo(point)],
        }
    }

    pub fn from_commands(commands: Vec<PathCommand>) -> Self {
        Self { commands }
    }

    /// Straight segment from `from` to `to`.
    pub fn line(from: Point, to: Point) -> Self {
        Self::from_commands(vec![PathCommand::MoveTo(from), PathCommand::LineTo(to)])
    }

    /// Closed rectangle spanned by two opposite corners.
    pub fn rectangle(corner: Point, opposite: Point) -> Self {
        Self::from_commands(vec![
            PathCommand::MoveTo(corner),
            PathCommand::LineTo(Point::new(opposite.x, corner.y)),
            PathCommand::LineTo(opposite),
            PathCommand::LineTo(Point::new(corner.x, opposite.y)),
            PathCommand::Close,
        ])
    }

    /// Line with a two-stroke head at `to`, each stroke `head_length` long
    /// and 30° off the shaft.
    pub fn arrow(from: Point, to: Point, head_length: f32) -> Self {
        let mut path = Self::line(from, to);
        if from.distance(&to) <= f32::EPSILON {
            return path;
        }
        let dx = from.x - to.x;
        let dy = from.y - to.y;
        let len = (dx * dx + dy * dy).sqrt();
        let back = Point::new(to.x + dx / len * head_length, to.y + dy / len * head_length);
        let left = back.rotate_about(to, 30.0);
        let right = back.rotate_about(to, -30.0);
        path.move_to(left);
        path.line_to(to);
        path.line_to(right);
        path
    }

    pub fn move_to(&mut self, p: Point) {
        self.commands.push(PathCommand::MoveTo(p));
    }

    pub fn line_to(&mut self, p: Point) {
        self.commands.push(PathCommand::LineTo(p));
    }

    pub fn quad_to(&mut self, ctrl: Point, to: Point) {
        self.commands.push(PathCommand::QuadTo { ctrl, to });
    }

    pub fn cubic_to(&mut self, ctrl1: Point, ctrl2: Point, to: Point) {
        self.commands.push(PathCommand::CubicTo { ctrl1, ctrl2, to });
    }

    pub fn close(&mut self) {
        self.commands.push(PathCommand::Close);
    }

    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// First on-curve point, i.e. where the path starts.
    pub fn first_point(&self) -> Option<Point> {
        self.commands.iter().find_map(PathCommand::end_point)
    }

    /// On-curve points in command order (control points excluded).
    pub fn points(&self) -> Vec<Point> {
        self.commands.iter().filter_map(PathCommand::end_point).collect()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.commands.last(), Some(PathCommand::Close))
    }

    /// Flatten curves into polylines, one per sub-path.
    pub fn flatten(&self) -> Vec<Polyline> {
        let mut out: Vec<Polyline> = Vec::new();
        let mut current: Option<Polyline> = None;

        for cmd in &self.commands {
            match *cmd {
                PathCommand::MoveTo(p) => {
                    if let Some(done) = current.take() {
                        out.push(done);
                    }
                    current = Some(Polyline { points: vec![p], closed: false });
                }
                PathCommand::LineTo(p) => {
                    current
                        .get_or_insert_with(|| Polyline { points: Vec::new(), closed: false })
                        .points
                        .push(p);
                }
                PathCommand::QuadTo { ctrl, to } => {
                    let poly = current
                        .get_or_insert_with(|| Polyline { points: vec![ctrl], closed: false });
                    let start = *poly.points.last().unwrap_or(&ctrl);
                    for i in 1..=CURVE_SEGMENTS {
                        let t = i as f32 / CURVE_SEGMENTS as f32;
                        let mt = 1.0 - t;
                        poly.points.push(Point::new(
                            mt * mt * start.x + 2.0 * mt * t * ctrl.x + t * t * to.x,
                            mt * mt * start.y + 2.0 * mt * t * ctrl.y + t * t * to.y,
                        ));
                    }
                }
                PathCommand::CubicTo { ctrl1, ctrl2, to } => {
                    let poly = current
                        .get_or_insert_with(|| Polyline { points: vec![ctrl1], closed: false });
                    let start = *poly.points.last().unwrap_or(&ctrl1);
                    for i in 1..=CURVE_SEGMENTS {
                        let t = i as f32 / CURVE_SEGMENTS as f32;
                        let mt = 1.0 - t;
                        let a = mt * mt * mt;
                        let b = 3.0 * mt * mt * t;
                        let c = 3.0 * mt * t * t;
                        let d = t * t * t;
                        poly.points.push(Point::new(
                            a * start.x + b * ctrl1.x + c * ctrl2.x + d * to.x,
                            a * start.y + b * ctrl1.y + c * ctrl2.y + d * to.y,
                        ));
                    }
                }
                PathCommand::Close => {
                    if let Some(mut done) = current.take() {
                        done.closed = true;
                        let restart = done.points.first().copied();
                        out.push(done);
                        // A command after Close continues from the sub-path start.
                        current = restart.map(|p| Polyline { points: vec![p], closed: false });
                    }
                }
            }
        }

        if let Some(done) = current {
            // Drop the dangling restart point left behind by a trailing Close.
            if !(done.points.len() == 1 && self.is_closed()) {
                out.push(done);
            }
        }
        out
    }

    /// Bounding box of the flattened path.
    pub fn bounds(&self) -> Option<Aabb> {
        let flat = self.flatten();
        Aabb::from_points(flat.iter().flat_map(|poly| poly.points.iter()))
    }

    /// Shortest distance from `p` to the outline. Infinite for an empty path.
    pub fn distance_to(&self, p: Point) -> f32 {
        let mut best = f32::INFINITY;
        for poly in self.flatten() {
            let pts = &poly.points;
            if pts.len() == 1 {
                best = best.min(p.distance(&pts[0]));
                continue;
            }
            for pair in pts.windows(2) {
                best = best.min(segment_distance(p, pair[0], pair[1]));
            }
            if poly.closed && pts.len() > 2 {
                best = best.min(segment_distance(p, pts[pts.len() - 1], pts[0]));
            }
        }
        best
    }

    /// Even-odd fill containment. Every sub-path is treated as closed.
    pub fn contains(&self, p: Point) -> bool {
        let mut inside = false;
        for poly in self.flatten() {
            let pts = &poly.points;
            if pts.len() < 3 {
                continue;
            }
            let mut j = pts.len() - 1;
            for i in 0..pts.len() {
                let (a, b) = (pts[i], pts[j]);
                if (a.y > p.y) != (b.y > p.y)
                    && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x
                {
                    inside = !inside;
                }
                j = i;
            }
        }
        inside
    }

    /// Apply `f` to every point, control points included.
    pub fn map_points(&mut self, f: impl Fn(Point) -> Point) {
        for cmd in &mut self.commands {
            *cmd = cmd.map_points(&f);
        }
    }

    pub fn translate(&mut self, delta: Point) {
        self.map_points(|p| p.offset(delta));
    }

    pub fn rotate_about(&mut self, center: Point, degrees: f32) {
        self.map_points(|p| p.rotate_about(center, degrees));
    }

    pub fn scale_about(&mut self, center: Point, scale: Point) {
        self.map_points(|p| p.scale_about(center, scale));
    }
}

/// Distance from `p` to the segment `a`–`b`.
fn segment_distance(p: Point, a: Point, b: Point) -> f32 {
    let abx = b.x - a.x;
    let aby = b.y - a.y;
    let len2 = abx * abx + aby * aby;
    if len2 <= f32::EPSILON {
        return p.distance(&a);
    }
    let t = (((p.x - a.x) * abx + (p.y - a.y) * aby) / len2).clamp(0.0, 1.0);
    p.distance(&Point::new(a.x + abx * t, a.y + aby * t))
}

// ───────────────────────────────────────────────────────────────────
// Path string codec
// ───────────────────────────────────────────────────────────────────

/// Errors from parsing a path-command string.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathParseError {
    #[error("Unknown path command '{0}'")]
    UnknownCommand(String),
    #[error("Path command '{0}' is missing coordinates")]
    MissingCoordinate(char),
    #[error("Invalid number '{0}' in path")]
    InvalidNumber(String),
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for cmd in &self.commands {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match cmd {
                PathCommand::MoveTo(p) => write!(f, "M {} {}", p.x, p.y)?,
                PathCommand::LineTo(p) => write!(f, "L {} {}", p.x, p.y)?,
                PathCommand::QuadTo { ctrl, to } => {
                    write!(f, "Q {} {} {} {}", ctrl.x, ctrl.y, to.x, to.y)?
                }
                PathCommand::CubicTo { ctrl1, ctrl2, to } => write!(
                    f,
                    "C {} {} {} {} {} {}",
                    ctrl1.x, ctrl1.y, ctrl2.x, ctrl2.y, to.x, to.y
                )?,
                PathCommand::Close => f.write_str("Z")?,
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .peekable();
        let mut path = Path::new();

        while let Some(token) = tokens.next() {
            let mut chars = token.chars();
            let letter = match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => c.to_ascii_uppercase(),
                _ => return Err(PathParseError::UnknownCommand(token.to_string())),
            };

            let arity = match letter {
                'M' | 'L' => 2,
                'Q' => 4,
                'C' => 6,
                'Z' => 0,
                _ => return Err(PathParseError::UnknownCommand(token.to_string())),
            };

            let mut coords = [0.0f32; 6];
            for slot in coords.iter_mut().take(arity) {
                let raw = tokens.next().ok_or(PathParseError::MissingCoordinate(letter))?;
                *slot = raw
                    .parse::<f32>()
                    .map_err(|_| PathParseError::InvalidNumber(raw.to_string()))?;
            }

            let cmd = match letter {
                'M' => PathCommand::MoveTo(Point::new(coords[0], coords[1])),
                'L' => PathCommand::LineTo(Point::new(coords[0], coords[1])),
                'Q' => PathCommand::QuadTo {
                    ctrl: Point::new(coords[0], coords[1]),
                    to: Point::new(coords[2], coords[3]),
                },
                'C' => PathCommand::CubicTo {
                    ctrl1: Point::new(coords[0], coords[1]),
                    ctrl2: Point::new(coords[2], coords[3]),
                    to: Point::new(coords[4], coords[5]),
                },
                _ => PathCommand::Close,
            };
            path.commands.push(cmd);
        }

        Ok(path)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
