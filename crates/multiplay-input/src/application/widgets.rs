//! Sender-side control widgets.
//!
//! # Edge triggering (for beginners)
//!
//! A widget never says "W is still held" over and over. It says "W went
//! down" once and "W went up" once. Every widget owns a [`HeldKeys`] set and
//! only emits an event when a key enters or leaves that set, so for any
//! gesture sequence the key-downs and key-ups of a key alternate and balance
//! out once the gesture ends.
//!
//! Widgets return the events they want sent; they never send anything
//! themselves. Pass the result to [`forward_all`](crate::forward_all).

use std::collections::BTreeSet;

use multiplay_core::{ControlEvent, Coords, MouseAction, ProgramKey, StagePoint, Viewport};

// ── Held keys ─────────────────────────────────────────────────────────────────

/// The keys one widget currently holds down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeldKeys {
    held: BTreeSet<String>,
}

impl HeldKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// `keydown` if `key` was not held.
    pub fn press(&mut self, key: &str) -> Option<ControlEvent> {
        self.held
            .insert(key.to_string())
            .then(|| ControlEvent::keydown(key))
    }

    /// `keyup` if `key` was held.
    pub fn release(&mut self, key: &str) -> Option<ControlEvent> {
        self.held.remove(key).then(|| ControlEvent::keyup(key))
    }

    /// Makes the held set equal to `wanted`: key-ups for keys no longer
    /// wanted, then key-downs for newly wanted ones.
    pub fn sync<'a>(&mut self, wanted: impl IntoIterator<Item = &'a str>) -> Vec<ControlEvent> {
        let wanted: BTreeSet<&str> = wanted.into_iter().collect();
        let stale: Vec<String> = self
            .held
            .iter()
            .filter(|k| !wanted.contains(k.as_str()))
            .cloned()
            .collect();

        let mut events: Vec<ControlEvent> =
            stale.iter().filter_map(|k| self.release(k)).collect();
        events.extend(wanted.into_iter().filter_map(|k| self.press(k)));
        events
    }

    /// Releases everything, e.g. when the gesture ends or is cancelled.
    pub fn release_all(&mut self) -> Vec<ControlEvent> {
        std::mem::take(&mut self.held)
            .into_iter()
            .map(ControlEvent::keyup)
            .collect()
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains(key)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

// ── Directions ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];
}

/// Which key each direction sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionKeys {
    pub up: String,
    pub down: String,
    pub left: String,
    pub right: String,
}

impl DirectionKeys {
    /// Arrow keys, spelled the way browsers report them.
    pub fn arrows() -> Self {
        Self {
            up: ProgramKey::UpArrow.wire_name(),
            down: ProgramKey::DownArrow.wire_name(),
            left: ProgramKey::LeftArrow.wire_name(),
            right: ProgramKey::RightArrow.wire_name(),
        }
    }

    pub fn wasd() -> Self {
        Self {
            up: "w".to_string(),
            down: "s".to_string(),
            left: "a".to_string(),
            right: "d".to_string(),
        }
    }

    pub fn key(&self, direction: Direction) -> &str {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
            Direction::Left => &self.left,
            Direction::Right => &self.right,
        }
    }
}

impl Default for DirectionKeys {
    fn default() -> Self {
        Self::arrows()
    }
}

/// Four buttons, one per direction; several may be held at once.
#[derive(Debug, Clone, Default)]
pub struct DPad {
    keys: DirectionKeys,
    held: HeldKeys,
}

impl DPad {
    pub fn new(keys: DirectionKeys) -> Self {
        Self {
            keys,
            held: HeldKeys::new(),
        }
    }

    pub fn press(&mut self, direction: Direction) -> Option<ControlEvent> {
        self.held.press(self.keys.key(direction))
    }

    pub fn release(&mut self, direction: Direction) -> Option<ControlEvent> {
        self.held.release(self.keys.key(direction))
    }

    /// Gesture ended or was cancelled.
    pub fn end(&mut self) -> Vec<ControlEvent> {
        self.held.release_all()
    }

    pub fn held(&self) -> &HeldKeys {
        &self.held
    }
}

/// A fixed set of action buttons (`space`, `enter`, letters).
#[derive(Debug, Clone, Default)]
pub struct ButtonPad {
    buttons: Vec<String>,
    held: HeldKeys,
}

impl ButtonPad {
    pub fn new<I, S>(buttons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            buttons: buttons.into_iter().map(Into::into).collect(),
            held: HeldKeys::new(),
        }
    }

    pub fn buttons(&self) -> &[String] {
        &self.buttons
    }

    /// Ignores keys that are not on this pad.
    pub fn press(&mut self, key: &str) -> Option<ControlEvent> {
        if self.buttons.iter().any(|b| b == key) {
            self.held.press(key)
        } else {
            None
        }
    }

    pub fn release(&mut self, key: &str) -> Option<ControlEvent> {
        self.held.release(key)
    }

    pub fn end(&mut self) -> Vec<ControlEvent> {
        self.held.release_all()
    }

    pub fn held(&self) -> &HeldKeys {
        &self.held
    }
}

// ── Joystick ──────────────────────────────────────────────────────────────────

/// Fraction of the radius a drag must cross before a direction counts.
pub const DEFAULT_DEAD_ZONE: f64 = 0.3;

/// A pan-driven joystick mapped onto four direction keys.
#[derive(Debug, Clone)]
pub struct Joystick {
    radius: f64,
    dead_zone: f64,
    keys: DirectionKeys,
    held: HeldKeys,
}

impl Joystick {
    /// Returns `None` unless `radius` is finite and positive.
    pub fn new(radius: f64, keys: DirectionKeys) -> Option<Self> {
        (radius.is_finite() && radius > 0.0).then(|| Self {
            radius,
            dead_zone: DEFAULT_DEAD_ZONE,
            keys,
            held: HeldKeys::new(),
        })
    }

    /// Sets the dead zone as a fraction of the radius, clamped to `[0, 1]`.
    pub fn with_dead_zone(mut self, fraction: f64) -> Self {
        self.dead_zone = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            DEFAULT_DEAD_ZONE
        };
        self
    }

    /// Directions whose axis offset is beyond the dead zone. `dy` grows
    /// downwards, as in screen space.
    pub fn directions_at(&self, dx: f64, dy: f64) -> Vec<Direction> {
        let threshold = self.radius * self.dead_zone;
        Direction::ALL
            .into_iter()
            .filter(|d| match d {
                Direction::Up => dy < -threshold,
                Direction::Down => dy > threshold,
                Direction::Left => dx < -threshold,
                Direction::Right => dx > threshold,
            })
            .collect()
    }

    /// One movement sample relative to the joystick centre.
    pub fn move_to(&mut self, dx: f64, dy: f64) -> Vec<ControlEvent> {
        let directions = self.directions_at(dx, dy);
        let wanted: Vec<&str> = directions.iter().map(|d| self.keys.key(*d)).collect();
        self.held.sync(wanted)
    }

    /// Gesture ended or was cancelled: release every held direction.
    pub fn release(&mut self) -> Vec<ControlEvent> {
        self.held.release_all()
    }

    pub fn held(&self) -> &HeldKeys {
        &self.held
    }
}

// ── Pointer ───────────────────────────────────────────────────────────────────

/// Touch or mouse surface that drives the program's pointer.
///
/// Positions are converted to stage coordinates before they go on the wire.
#[derive(Debug, Clone)]
pub struct PointerPad {
    viewport: Viewport,
    last: Option<StagePoint>,
}

impl PointerPad {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            last: None,
        }
    }

    /// The rendered stream changed size.
    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn down(&mut self, x: f64, y: f64) -> ControlEvent {
        ControlEvent::mouse(MouseAction::Down, Some(self.locate(x, y)))
    }

    /// `None` when the pointer did not move.
    pub fn move_to(&mut self, x: f64, y: f64) -> Option<ControlEvent> {
        let point = self.viewport.to_stage(x, y);
        if self.last == Some(point) {
            return None;
        }
        Some(ControlEvent::mouse(MouseAction::Move, Some(self.locate(x, y))))
    }

    pub fn up(&mut self, x: f64, y: f64) -> ControlEvent {
        ControlEvent::mouse(MouseAction::Up, Some(self.locate(x, y)))
    }

    fn locate(&mut self, x: f64, y: f64) -> Coords {
        let point = self.viewport.to_stage(x, y);
        self.last = Some(point);
        point.into()
    }
}
