//! Mapping from a sender's viewport into the program's stage.
//!
//! The program draws onto a fixed 480×360 logical canvas whose origin is the
//! centre and whose Y axis points up. A sender sees the stream scaled into a
//! viewport of arbitrary size with the origin at the top-left and Y pointing
//! down, so every pointer sample is converted before it goes on the wire:
//!
//! ```text
//! X = (x / W) * 480 - 240
//! Y = 180 - (y / H) * 360
//! ```

use serde::{Deserialize, Serialize};

use crate::protocol::control::Coords;

/// Logical stage width.
pub const STAGE_WIDTH: f64 = 480.0;

/// Logical stage height.
pub const STAGE_HEIGHT: f64 = 360.0;

const HALF_WIDTH: f64 = STAGE_WIDTH / 2.0;
const HALF_HEIGHT: f64 = STAGE_HEIGHT / 2.0;

/// A point in stage space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StagePoint {
    pub x: f64,
    pub y: f64,
}

impl StagePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The nearest point inside `[-240, 240] × [-180, 180]`.
    pub fn clamped(self) -> Self {
        Self {
            x: self.x.clamp(-HALF_WIDTH, HALF_WIDTH),
            y: self.y.clamp(-HALF_HEIGHT, HALF_HEIGHT),
        }
    }

    pub fn is_on_stage(self) -> bool {
        (-HALF_WIDTH..=HALF_WIDTH).contains(&self.x) && (-HALF_HEIGHT..=HALF_HEIGHT).contains(&self.y)
    }
}

impl From<Coords> for StagePoint {
    fn from(c: Coords) -> Self {
        Self { x: c.x, y: c.y }
    }
}

impl From<StagePoint> for Coords {
    fn from(p: StagePoint) -> Self {
        Self { x: p.x, y: p.y }
    }
}

/// Logical size of the surface the sender renders the stream into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    width: f64,
    height: f64,
}

impl Viewport {
    /// Returns `None` unless both sides are finite and strictly positive.
    pub fn new(width: f64, height: f64) -> Option<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        (valid(width) && valid(height)).then_some(Self { width, height })
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Maps a viewport-relative point to stage space. Points outside the
    /// viewport map outside the stage; callers clamp if they need to.
    pub fn to_stage(&self, x: f64, y: f64) -> StagePoint {
        StagePoint {
            x: (x / self.width) * STAGE_WIDTH - HALF_WIDTH,
            y: HALF_HEIGHT - (y / self.height) * STAGE_HEIGHT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_rejects_degenerate_sizes() {
        assert!(Viewport::new(0.0, 100.0).is_none());
        assert!(Viewport::new(100.0, -1.0).is_none());
        assert!(Viewport::new(f64::NAN, 100.0).is_none());
        assert!(Viewport::new(f64::INFINITY, 100.0).is_none());
        assert!(Viewport::new(1.0, 1.0).is_some());
    }

    #[test]
    fn test_center_maps_to_origin() {
        let viewport = Viewport::new(390.0, 292.5).unwrap();
        assert_eq!(viewport.to_stage(195.0, 146.25), StagePoint::new(0.0, 0.0));
    }

    #[test]
    fn test_corners_map_to_stage_corners() {
        let viewport = Viewport::new(800.0, 600.0).unwrap();
        assert_eq!(viewport.to_stage(0.0, 0.0), StagePoint::new(-240.0, 180.0));
        assert_eq!(viewport.to_stage(800.0, 600.0), StagePoint::new(240.0, -180.0));
        assert_eq!(viewport.to_stage(800.0, 0.0), StagePoint::new(240.0, 180.0));
    }

    #[test]
    fn test_points_inside_viewport_stay_on_stage() {
        let sizes = [(1.0, 1.0), (320.0, 240.0), (1920.0, 1080.0), (37.5, 911.0)];
        for (w, h) in sizes {
            let viewport = Viewport::new(w, h).unwrap();
            for i in 0..=20 {
                for j in 0..=20 {
                    let x = w * f64::from(i) / 20.0;
                    let y = h * f64::from(j) / 20.0;
                    let p = viewport.to_stage(x, y);
                    assert!(p.is_on_stage(), "({x}, {y}) in {w}x{h} mapped to {p:?}");
                }
            }
        }
    }

    #[test]
    fn test_clamped_pulls_outside_points_in() {
        let p = StagePoint::new(300.0, -500.0).clamped();
        assert_eq!(p, StagePoint::new(240.0, -180.0));
        assert!(p.is_on_stage());
    }
}
