//! Block data model.

use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Default width/height for new blocks, in canvas units.
pub const DEFAULT_BLOCK_SIZE: f64 = 200.0;

/// Minimum width/height a block may be resized to, in canvas units.
pub const MIN_BLOCK_SIZE: f64 = 40.0;

/// Unique identifier for a block.
///
/// Ids are globally unique across all pages and allocated monotonically
/// (current global max + 1) by [`crate::board::Board`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BlockId(pub u64);

impl BlockId {
    /// Sentinel id used to tag the clipboard snapshot; never a real block.
    pub const CLIPBOARD: BlockId = BlockId(u64::MAX);
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The program bound to a block: its registry name and an opaque,
/// independently serializable state snapshot owned by that program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramCell {
    /// Registry name of the program.
    pub name: String,
    /// Last mirrored program state.
    pub state: serde_json::Value,
}

impl ProgramCell {
    /// Create a cell for the named program with a null initial state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: serde_json::Value::Null,
        }
    }

    /// Create a cell with an explicit initial state.
    pub fn with_state(name: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }
}

/// A positioned, sized, z-ordered canvas element hosting one program instance.
///
/// Geometry is stored in canvas coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Globally unique identifier.
    pub id: BlockId,
    /// Left edge in canvas units.
    pub x: f64,
    /// Top edge in canvas units.
    pub y: f64,
    /// Width in canvas units.
    pub width: f64,
    /// Height in canvas units.
    pub height: f64,
    /// Stacking order; higher values render in front. Values are extended
    /// by front/back operations and never renumbered.
    pub z_order: i64,
    /// The hosted program.
    pub program: ProgramCell,
}

impl Block {
    /// Create a block at the given position with default size.
    pub fn new(id: BlockId, program: ProgramCell, position: Point, z_order: i64) -> Self {
        Self {
            id,
            x: position.x,
            y: position.y,
            width: DEFAULT_BLOCK_SIZE,
            height: DEFAULT_BLOCK_SIZE,
            z_order,
            program,
        }
    }

    /// Bounding rectangle in canvas coordinates.
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    /// Set geometry from a rectangle.
    pub fn set_rect(&mut self, rect: Rect) {
        self.x = rect.x0;
        self.y = rect.y0;
        self.width = rect.width();
        self.height = rect.height();
    }

    /// Hit test a canvas point against the block body.
    pub fn contains(&self, point: Point) -> bool {
        self.rect().contains(point)
    }

    /// Translate the block by a canvas-space delta.
    pub fn translate(&mut self, delta: kurbo::Vec2) {
        self.x += delta.x;
        self.y += delta.y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(x: f64, y: f64, w: f64, h: f64) -> Block {
        Block {
            id: BlockId(1),
            x,
            y,
            width: w,
            height: h,
            z_order: 0,
            program: ProgramCell::new("note"),
        }
    }

    #[test]
    fn test_rect_roundtrip() {
        let mut b = block(10.0, 20.0, 100.0, 50.0);
        let r = b.rect();
        assert_eq!(r, Rect::new(10.0, 20.0, 110.0, 70.0));
        b.set_rect(Rect::new(0.0, 0.0, 30.0, 40.0));
        assert!((b.width - 30.0).abs() < f64::EPSILON);
        assert!((b.height - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_contains() {
        let b = block(0.0, 0.0, 100.0, 100.0);
        assert!(b.contains(Point::new(50.0, 50.0)));
        assert!(!b.contains(Point::new(150.0, 50.0)));
    }

    #[test]
    fn test_translate() {
        let mut b = block(10.0, 10.0, 50.0, 50.0);
        b.translate(kurbo::Vec2::new(5.0, -2.0));
        assert!((b.x - 15.0).abs() < f64::EPSILON);
        assert!((b.y - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clipboard_sentinel_is_reserved() {
        assert_eq!(BlockId::CLIPBOARD, BlockId(u64::MAX));
    }
}
