//! Canvas document files.
//!
//! A document is the drawable set plus a background color, stored as
//! pretty-printed JSON:
//!
//! ```text
//! {
//!   "background": { "r": 255, "g": 255, "b": 255, "a": 255 },
//!   "drawables": [ { "kind": "stroke", "id": "…", "path": "M 0 0 L 10 0", … } ]
//! }
//! ```
//!
//! Opening a document does not replace the log. It yields a
//! `RestoreCanvas` operation that is applied and broadcast like any other
//! edit, so peers and undo see it as one action.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drawable::{Color, DrawableSet};
use crate::operation::Operation;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed document: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasDocument {
    #[serde(default = "default_background")]
    pub background: Color,
    #[serde(default)]
    pub drawables: DrawableSet,
}

fn default_background() -> Color {
    Color::WHITE
}

impl Default for CanvasDocument {
    fn default() -> Self {
        Self {
            background: default_background(),
            drawables: DrawableSet::new(),
        }
    }
}

impl CanvasDocument {
    pub fn new(background: Color, drawables: DrawableSet) -> Self {
        Self { background, drawables }
    }

    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?)?;
        log::info!(
            "Saved canvas ({} drawables) to {}",
            self.drawables.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let doc = Self::from_json(&fs::read_to_string(path)?)?;
        log::info!(
            "Loaded canvas ({} drawables) from {}",
            doc.drawables.len(),
            path.display()
        );
        Ok(doc)
    }

    /// The operation that puts this document's drawables on a canvas.
    pub fn restore_operation(&self) -> Operation {
        Operation::restore_canvas(self.drawables.clone())
    }
}
