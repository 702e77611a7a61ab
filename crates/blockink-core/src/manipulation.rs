//! Drag, resize, multi-select and connect gesture handling.
//!
//! All geometry here is in canvas coordinates; callers convert pointer
//! positions through [`crate::camera::Camera`] first. Resize handles are
//! pure functions of the current geometry and the pointer position, so the
//! same math serves live preview and final commit.

use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

use crate::block::{BlockId, MIN_BLOCK_SIZE};
use crate::page::Page;

/// The eight resize handles: four corners and four edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResizeHandle {
    Nw,
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
}

impl ResizeHandle {
    /// All handles, corners first.
    pub const ALL: [ResizeHandle; 8] = [
        ResizeHandle::Nw,
        ResizeHandle::Ne,
        ResizeHandle::Sw,
        ResizeHandle::Se,
        ResizeHandle::N,
        ResizeHandle::S,
        ResizeHandle::E,
        ResizeHandle::W,
    ];

    /// Whether this is a corner handle (adjusts both axes).
    pub fn is_corner(self) -> bool {
        matches!(
            self,
            ResizeHandle::Nw | ResizeHandle::Ne | ResizeHandle::Sw | ResizeHandle::Se
        )
    }

    /// Whether this handle moves the west edge.
    fn moves_west(self) -> bool {
        matches!(self, ResizeHandle::Nw | ResizeHandle::W | ResizeHandle::Sw)
    }

    /// Whether this handle moves the east edge.
    fn moves_east(self) -> bool {
        matches!(self, ResizeHandle::Ne | ResizeHandle::E | ResizeHandle::Se)
    }

    /// Whether this handle moves the north edge.
    fn moves_north(self) -> bool {
        matches!(self, ResizeHandle::Nw | ResizeHandle::N | ResizeHandle::Ne)
    }

    /// Whether this handle moves the south edge.
    fn moves_south(self) -> bool {
        matches!(self, ResizeHandle::Sw | ResizeHandle::S | ResizeHandle::Se)
    }

    /// Handle position on a rectangle, in canvas coordinates.
    pub fn position(self, rect: Rect) -> Point {
        let cx = (rect.x0 + rect.x1) / 2.0;
        let cy = (rect.y0 + rect.y1) / 2.0;
        match self {
            ResizeHandle::Nw => Point::new(rect.x0, rect.y0),
            ResizeHandle::N => Point::new(cx, rect.y0),
            ResizeHandle::Ne => Point::new(rect.x1, rect.y0),
            ResizeHandle::E => Point::new(rect.x1, cy),
            ResizeHandle::Se => Point::new(rect.x1, rect.y1),
            ResizeHandle::S => Point::new(cx, rect.y1),
            ResizeHandle::Sw => Point::new(rect.x0, rect.y1),
            ResizeHandle::W => Point::new(rect.x0, cy),
        }
    }
}

/// Resize a rectangle by dragging a handle to a pointer position.
///
/// The edge/corner opposite the handle stays fixed. Width and height never
/// fall below [`MIN_BLOCK_SIZE`]; when the clamp engages, the moving edge
/// is pinned with `min()`/`max()` against the anchored edge so the block
/// does not jump.
pub fn resize(rect: Rect, handle: ResizeHandle, pointer: Point) -> Rect {
    let mut x0 = rect.x0;
    let mut y0 = rect.y0;
    let mut x1 = rect.x1;
    let mut y1 = rect.y1;

    if handle.moves_west() {
        x0 = pointer.x.min(rect.x1 - MIN_BLOCK_SIZE);
    }
    if handle.moves_east() {
        x1 = pointer.x.max(rect.x0 + MIN_BLOCK_SIZE);
    }
    if handle.moves_north() {
        y0 = pointer.y.min(rect.y1 - MIN_BLOCK_SIZE);
    }
    if handle.moves_south() {
        y1 = pointer.y.max(rect.y0 + MIN_BLOCK_SIZE);
    }

    Rect::new(x0, y0, x1, y1)
}

/// Resize with the aspect ratio locked to `ratio` (width / height, captured
/// at resize-start).
///
/// The unconstrained result is computed first, then one dimension is
/// re-derived from the other using the ratio. For corner handles both
/// candidate derivations are compared and the one with the smaller area
/// wins, which keeps a diagonal drag from running away; the anchored
/// corner stays fixed. Edge handles derive the cross dimension and
/// re-center on the axis the handle does not move.
pub fn resize_locked(rect: Rect, handle: ResizeHandle, pointer: Point, ratio: f64) -> Rect {
    let ratio = if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    };
    let free = resize(rect, handle, pointer);

    let (width, height) = if handle.is_corner() {
        // Candidate A keeps the dragged width, candidate B the height.
        let from_width = (free.width(), free.width() / ratio);
        let from_height = (free.height() * ratio, free.height());
        if from_width.0 * from_width.1 <= from_height.0 * from_height.1 {
            from_width
        } else {
            from_height
        }
    } else if handle.moves_east() || handle.moves_west() {
        (free.width(), free.width() / ratio)
    } else {
        (free.height() * ratio, free.height())
    };
    // Clamp both dimensions by a common scale so the lock survives the
    // minimum-size floor.
    let scale = (MIN_BLOCK_SIZE / width)
        .max(MIN_BLOCK_SIZE / height)
        .max(1.0);
    let width = width * scale;
    let height = height * scale;

    match handle {
        // Corner handles anchor the opposite corner.
        ResizeHandle::Se => Rect::new(rect.x0, rect.y0, rect.x0 + width, rect.y0 + height),
        ResizeHandle::Sw => Rect::new(rect.x1 - width, rect.y0, rect.x1, rect.y0 + height),
        ResizeHandle::Ne => Rect::new(rect.x0, rect.y1 - height, rect.x0 + width, rect.y1),
        ResizeHandle::Nw => Rect::new(rect.x1 - width, rect.y1 - height, rect.x1, rect.y1),
        // Edge handles re-center on the unchanging axis.
        ResizeHandle::E => {
            let cy = (rect.y0 + rect.y1) / 2.0;
            Rect::new(rect.x0, cy - height / 2.0, rect.x0 + width, cy + height / 2.0)
        }
        ResizeHandle::W => {
            let cy = (rect.y0 + rect.y1) / 2.0;
            Rect::new(rect.x1 - width, cy - height / 2.0, rect.x1, cy + height / 2.0)
        }
        ResizeHandle::S => {
            let cx = (rect.x0 + rect.x1) / 2.0;
            Rect::new(cx - width / 2.0, rect.y0, cx + width / 2.0, rect.y0 + height)
        }
        ResizeHandle::N => {
            let cx = (rect.x0 + rect.x1) / 2.0;
            Rect::new(cx - width / 2.0, rect.y1 - height, cx + width / 2.0, rect.y1)
        }
    }
}

/// Hit test the handles of a rectangle against a canvas point.
///
/// `tolerance` is in canvas units; callers divide a screen-pixel tolerance
/// by the camera zoom.
pub fn hit_test_handles(rect: Rect, point: Point, tolerance: f64) -> Option<ResizeHandle> {
    for handle in ResizeHandle::ALL {
        let pos = handle.position(rect);
        let dx = point.x - pos.x;
        let dy = point.y - pos.y;
        if dx * dx + dy * dy <= tolerance * tolerance {
            return Some(handle);
        }
    }
    None
}

/// Bookkeeping for an in-progress drag of the current selection.
///
/// One reference block carries the start state; deltas are per pointer
/// move, not total-since-start, and the accumulated canvas-space total is
/// what the history commit subtracts at gesture end.
#[derive(Debug, Clone)]
pub struct DragGesture {
    /// Block used for start bookkeeping.
    pub reference: BlockId,
    /// Pointer position at gesture start, in screen coordinates.
    pub start_screen: Point,
    /// Pointer position at the previous move, in screen coordinates.
    pub last_screen: Point,
    /// Net canvas-space translation applied so far.
    pub total: Vec2,
}

impl DragGesture {
    /// Begin a drag at a screen position.
    pub fn begin(reference: BlockId, screen: Point) -> Self {
        Self {
            reference,
            start_screen: screen,
            last_screen: screen,
            total: Vec2::ZERO,
        }
    }

    /// Advance to a new pointer position, returning the canvas-space delta
    /// to apply to every selected block (screen delta divided by zoom).
    pub fn step(&mut self, screen: Point, zoom: f64) -> Vec2 {
        let delta = Vec2::new(
            (screen.x - self.last_screen.x) / zoom,
            (screen.y - self.last_screen.y) / zoom,
        );
        self.last_screen = screen;
        self.total += delta;
        delta
    }
}

/// Bookkeeping for an in-progress resize.
#[derive(Debug, Clone)]
pub struct ResizeGesture {
    /// Block being resized.
    pub block: BlockId,
    /// Handle being dragged.
    pub handle: ResizeHandle,
    /// Geometry at gesture start.
    pub start_rect: Rect,
    /// Aspect ratio (width / height) at gesture start, for ratio lock.
    pub start_ratio: f64,
}

impl ResizeGesture {
    /// Begin a resize of a block from its current geometry.
    pub fn begin(block: BlockId, handle: ResizeHandle, start_rect: Rect) -> Self {
        let start_ratio = if start_rect.height() > 0.0 {
            start_rect.width() / start_rect.height()
        } else {
            1.0
        };
        Self {
            block,
            handle,
            start_rect,
            start_ratio,
        }
    }

    /// Geometry for the current pointer position.
    pub fn apply(&self, current: Rect, pointer: Point, aspect_locked: bool) -> Rect {
        if aspect_locked {
            resize_locked(current, self.handle, pointer, self.start_ratio)
        } else {
            resize(current, self.handle, pointer)
        }
    }
}

/// A mutation the gesture layer asks its host to apply.
///
/// Connections need the composition engine's allow-list check, so the
/// gesture resolves to a request instead of writing the store directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureAction {
    /// Nothing to do.
    None,
    /// Create a connection from `source` to `target`, subject to the
    /// source program's peer allow-list.
    ConnectRequested { source: BlockId, target: BlockId },
}

/// Resolve a click while the page is in connect mode.
///
/// Clicking any block other than the originator requests a connection,
/// exits connect mode and selects the clicked block. Clicking the
/// originator (a self-loop) just exits connect mode.
pub fn resolve_connect_click(page: &mut Page, clicked: BlockId) -> GestureAction {
    let Some(source) = page.interaction.connecting else {
        return GestureAction::None;
    };
    page.exit_connect();
    if clicked == source || page.block(clicked).is_none() {
        return GestureAction::None;
    }
    page.select(clicked);
    GestureAction::ConnectRequested {
        source,
        target: clicked,
    }
}

/// Axis-aligned bounding box of the current multi-selection.
///
/// Recomputed on every read; a pointer-down anywhere inside it may start a
/// multi-block drag without changing the selection.
pub fn selection_bounds(page: &Page) -> Option<Rect> {
    let mut bounds: Option<Rect> = None;
    for &id in &page.interaction.selected {
        if let Some(block) = page.block(id) {
            let r = block.rect();
            bounds = Some(match bounds {
                Some(b) => b.union(r),
                None => r,
            });
        }
    }
    bounds
}

/// Whether a pointer-down at a canvas point should begin dragging the
/// current multi-selection.
pub fn hits_selection(page: &Page, point: Point) -> bool {
    match selection_bounds(page) {
        Some(bounds) if page.interaction.selected.len() > 1 => bounds.contains(point),
        _ => page
            .interaction
            .selected
            .first()
            .and_then(|&id| page.block(id))
            .is_some_and(|b| b.contains(point)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, ProgramCell};

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Rect {
        Rect::new(x, y, x + w, y + h)
    }

    #[test]
    fn test_se_resize_example() {
        // Block {100,100,50,50} resized via "se" to (200,200) -> 100x100.
        let r = resize(rect(100.0, 100.0, 50.0, 50.0), ResizeHandle::Se, Point::new(200.0, 200.0));
        assert_eq!(r, rect(100.0, 100.0, 100.0, 100.0));
    }

    #[test]
    fn test_opposite_corner_fixed() {
        let start = rect(10.0, 20.0, 100.0, 80.0);
        let r = resize(start, ResizeHandle::Nw, Point::new(0.0, 0.0));
        assert!((r.x1 - start.x1).abs() < f64::EPSILON);
        assert!((r.y1 - start.y1).abs() < f64::EPSILON);
        assert!((r.x0 - 0.0).abs() < f64::EPSILON);
        assert!((r.y0 - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_edge_resize_keeps_other_axis() {
        let start = rect(0.0, 0.0, 100.0, 100.0);
        let r = resize(start, ResizeHandle::E, Point::new(150.0, 999.0));
        assert_eq!(r, rect(0.0, 0.0, 150.0, 100.0));
    }

    #[test]
    fn test_min_size_clamp_everywhere() {
        // For any handle and any pointer position, the result never drops
        // below the minimum size.
        let start = rect(0.0, 0.0, 100.0, 100.0);
        let pointers = [
            Point::new(-500.0, -500.0),
            Point::new(500.0, 500.0),
            Point::new(50.0, 50.0),
            Point::new(99.0, 1.0),
            Point::new(10_000.0, -10_000.0),
        ];
        for handle in ResizeHandle::ALL {
            for p in pointers {
                let r = resize(start, handle, p);
                assert!(r.width() >= MIN_BLOCK_SIZE - 1e-9, "{handle:?} {p:?}");
                assert!(r.height() >= MIN_BLOCK_SIZE - 1e-9, "{handle:?} {p:?}");
            }
        }
    }

    #[test]
    fn test_clamp_does_not_jump() {
        // Dragging the west edge past the east edge pins the block at the
        // minimum width against the anchored east edge.
        let start = rect(0.0, 0.0, 100.0, 100.0);
        let r = resize(start, ResizeHandle::W, Point::new(300.0, 50.0));
        assert!((r.x1 - 100.0).abs() < f64::EPSILON);
        assert!((r.width() - MIN_BLOCK_SIZE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aspect_lock_preserves_ratio_on_corners() {
        let start = rect(0.0, 0.0, 200.0, 100.0);
        let ratio = 2.0;
        for handle in [
            ResizeHandle::Nw,
            ResizeHandle::Ne,
            ResizeHandle::Sw,
            ResizeHandle::Se,
        ] {
            let r = resize_locked(start, handle, Point::new(321.0, 177.0), ratio);
            assert!(
                ((r.width() / r.height()) - ratio).abs() < 1e-6,
                "{handle:?}: {} x {}",
                r.width(),
                r.height()
            );
        }
    }

    #[test]
    fn test_aspect_lock_survives_min_size_clamp() {
        // A collapsing drag pushes the derived dimensions below the
        // minimum; the floor must scale both, not clamp each on its own.
        let start = rect(0.0, 0.0, 200.0, 100.0);
        let r = resize_locked(start, ResizeHandle::Nw, Point::new(321.0, 177.0), 2.0);
        assert!(((r.width() / r.height()) - 2.0).abs() < 1e-6);
        assert!((r.height() - MIN_BLOCK_SIZE).abs() < 1e-9);
        assert!((r.width() - 2.0 * MIN_BLOCK_SIZE).abs() < 1e-9);
        // The anchored corner stays put.
        assert!((r.x1 - start.x1).abs() < f64::EPSILON);
        assert!((r.y1 - start.y1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aspect_lock_picks_smaller_area() {
        let start = rect(0.0, 0.0, 100.0, 100.0);
        // Dragging far on x but little on y: deriving from the height
        // (smaller area) must win over runaway width-driven growth.
        let r = resize_locked(start, ResizeHandle::Se, Point::new(500.0, 120.0), 1.0);
        assert!((r.width() - 120.0).abs() < 1e-9);
        assert!((r.height() - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_aspect_lock_edge_recenters() {
        let start = rect(0.0, 0.0, 100.0, 100.0);
        let r = resize_locked(start, ResizeHandle::E, Point::new(200.0, 50.0), 1.0);
        assert!((r.width() - 200.0).abs() < 1e-9);
        assert!((r.height() - 200.0).abs() < 1e-9);
        // Re-centered on the vertical axis around the original center.
        assert!(((r.y0 + r.y1) / 2.0 - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_drag_step_divides_by_zoom() {
        let mut drag = DragGesture::begin(BlockId(1), Point::new(100.0, 100.0));
        let d1 = drag.step(Point::new(110.0, 100.0), 2.0);
        assert!((d1.x - 5.0).abs() < f64::EPSILON);
        let d2 = drag.step(Point::new(120.0, 120.0), 2.0);
        assert!((d2.x - 5.0).abs() < f64::EPSILON);
        assert!((d2.y - 10.0).abs() < f64::EPSILON);
        assert!((drag.total.x - 10.0).abs() < f64::EPSILON);
        assert!((drag.total.y - 10.0).abs() < f64::EPSILON);
    }

    fn page_with_two_blocks() -> Page {
        let mut page = Page::new("test");
        for (i, x) in [(1u64, 0.0), (2u64, 200.0)] {
            page.blocks.push(Block {
                id: BlockId(i),
                x,
                y: 0.0,
                width: 50.0,
                height: 50.0,
                z_order: i as i64,
                program: ProgramCell::new("note"),
            });
        }
        page
    }

    #[test]
    fn test_connect_click_creates_request_and_selects_target() {
        let mut page = page_with_two_blocks();
        page.enter_connect(BlockId(1));
        let action = resolve_connect_click(&mut page, BlockId(2));
        assert_eq!(
            action,
            GestureAction::ConnectRequested {
                source: BlockId(1),
                target: BlockId(2),
            }
        );
        assert_eq!(page.interaction.connecting, None);
        assert!(page.is_selected(BlockId(2)));
    }

    #[test]
    fn test_connect_click_self_loop_forbidden() {
        let mut page = page_with_two_blocks();
        page.enter_connect(BlockId(1));
        let action = resolve_connect_click(&mut page, BlockId(1));
        assert_eq!(action, GestureAction::None);
        assert_eq!(page.interaction.connecting, None);
    }

    #[test]
    fn test_selection_bounds_and_multi_drag_hit() {
        let mut page = page_with_two_blocks();
        page.add_to_selection(BlockId(1));
        page.add_to_selection(BlockId(2));
        let bounds = selection_bounds(&page).unwrap();
        assert_eq!(bounds, Rect::new(0.0, 0.0, 250.0, 50.0));
        // A point in the gap between the blocks still starts a multi-drag.
        assert!(hits_selection(&page, Point::new(125.0, 25.0)));
        // Single selection requires hitting the block itself.
        page.select(BlockId(1));
        assert!(!hits_selection(&page, Point::new(125.0, 25.0)));
        assert!(hits_selection(&page, Point::new(25.0, 25.0)));
    }
}
