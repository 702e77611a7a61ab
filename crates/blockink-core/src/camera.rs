//! Camera module for pan/zoom transforms.

use kurbo::{Affine, Point, Vec2};
use serde::{Deserialize, Serialize};

use crate::input::Modifiers;

/// Minimum allowed zoom level.
pub const MIN_ZOOM: f64 = 0.1;
/// Maximum allowed zoom level.
pub const MAX_ZOOM: f64 = 5.0;

/// Scroll deltas at or above this magnitude are treated as zoom gestures
/// even without a modifier key (pinch gestures report large deltas).
const ZOOM_DELTA_THRESHOLD: f64 = 40.0;

/// Camera manages the view transform for a page.
///
/// It handles panning (translation) and zooming (scaling) operations,
/// converting between screen coordinates and canvas coordinates. Block
/// geometry is always stored in canvas space; every pointer comparison
/// must go through [`Camera::screen_to_canvas`] first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    /// Current translation offset (pan), in screen pixels.
    pub offset: Vec2,
    /// Current zoom level (1.0 = 100%).
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

/// How a scroll gesture should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollIntent {
    Pan,
    Zoom,
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the affine transform for rendering.
    ///
    /// This transform converts canvas coordinates to screen coordinates:
    /// `screen = canvas * zoom + offset`.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.zoom)
    }

    /// Get the inverse transform for input handling.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.zoom) * Affine::translate(-self.offset)
    }

    /// Convert a screen point to canvas coordinates.
    pub fn screen_to_canvas(&self, screen_point: Point) -> Point {
        self.inverse_transform() * screen_point
    }

    /// Convert a canvas point to screen coordinates.
    pub fn canvas_to_screen(&self, canvas_point: Point) -> Point {
        self.transform() * canvas_point
    }

    /// Pan the camera by a delta in screen coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Zoom the camera, keeping the given screen point fixed.
    ///
    /// Solves `offset' = pointer - (pointer - offset) * (z' / z)` so the
    /// canvas point under the pointer is invariant across the zoom change.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        let new_zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        if (new_zoom - self.zoom).abs() < f64::EPSILON {
            return;
        }

        let ratio = new_zoom / self.zoom;
        self.offset = Vec2::new(
            screen_point.x - (screen_point.x - self.offset.x) * ratio,
            screen_point.y - (screen_point.y - self.offset.y) * ratio,
        );
        self.zoom = new_zoom;
    }

    /// Reset camera to default position and zoom.
    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
        self.zoom = 1.0;
    }

    /// Decide whether a scroll gesture pans or zooms.
    ///
    /// Ctrl/meta scrolls always zoom; otherwise large deltas (trackpad
    /// pinch) zoom and small ones pan.
    pub fn scroll_intent(delta: Vec2, modifiers: Modifiers) -> ScrollIntent {
        if modifiers.ctrl || modifiers.meta {
            ScrollIntent::Zoom
        } else if delta.hypot() >= ZOOM_DELTA_THRESHOLD {
            ScrollIntent::Zoom
        } else {
            ScrollIntent::Pan
        }
    }

    /// Center the camera on a canvas point for a viewport of the given size.
    pub fn center_on(&mut self, canvas_point: Point, viewport: kurbo::Size) {
        self.offset = Vec2::new(
            viewport.width / 2.0 - canvas_point.x * self.zoom,
            viewport.height / 2.0 - canvas_point.y * self.zoom,
        );
    }

    /// The canvas point currently at the center of a viewport of the given size.
    pub fn viewport_center(&self, viewport: kurbo::Size) -> Point {
        self.screen_to_canvas(Point::new(viewport.width / 2.0, viewport.height / 2.0))
    }
}
