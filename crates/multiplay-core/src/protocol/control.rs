//! Control messages carried over the peer data channel.
//!
//! The channel is unordered and unreliable, so every message stands alone:
//! a key press, a pointer sample, a metadata push or a metadata request.
//! None of them is acknowledged.
//!
//! ```text
//! {"key":"ArrowUp","type":"keydown"}
//! {"key":"move","type":"mouse","coords":{"x":12.5,"y":-40.0}}
//! {"type":"PROJECT_METADATA","payload":{...}}
//! {"type":"request-metadata"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `type` value of a metadata push.
pub const PROJECT_METADATA_TYPE: &str = "PROJECT_METADATA";

/// `type` value of a metadata pull.
pub const REQUEST_METADATA_TYPE: &str = "request-metadata";

/// Kind of a [`ControlEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlEventType {
    Keydown,
    Keyup,
    Mouse,
}

impl ControlEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlEventType::Keydown => "keydown",
            ControlEventType::Keyup => "keyup",
            ControlEventType::Mouse => "mouse",
        }
    }
}

impl fmt::Display for ControlEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pointer position attached to mouse events, already in stage space.
///
/// Senders map their viewport pixels through
/// [`Viewport::to_stage`](crate::Viewport::to_stage) before sending:
/// centre origin, Y up, x in `-240..=240` and y in `-180..=180`. Receivers
/// only clamp; they never rescale. A client that puts raw viewport pixels
/// here will land on the wrong stage position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub x: f64,
    pub y: f64,
}

/// What a mouse-type event does. Travels in the `key` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseAction {
    Down,
    Up,
    Move,
}

impl MouseAction {
    pub fn as_str(self) -> &'static str {
        match self {
            MouseAction::Down => "down",
            MouseAction::Up => "up",
            MouseAction::Move => "move",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "down" => Some(MouseAction::Down),
            "up" => Some(MouseAction::Up),
            "move" => Some(MouseAction::Move),
            _ => None,
        }
    }
}

/// One remote input event.
///
/// Key identity and type must survive the round trip unchanged: the receiver
/// decides whether a simulated key is pressed or released from these two
/// fields alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlEvent {
    pub key: String,
    #[serde(rename = "type")]
    pub event_type: ControlEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<Coords>,
}

impl ControlEvent {
    pub fn keydown(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            event_type: ControlEventType::Keydown,
            coords: None,
        }
    }

    pub fn keyup(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            event_type: ControlEventType::Keyup,
            coords: None,
        }
    }

    /// A pointer event. `coords` must already be in stage space.
    ///
    /// ```rust
    /// use multiplay_core::{ControlEvent, Coords, MouseAction, Viewport};
    ///
    /// // Top-right corner of a 960×720 view.
    /// let view = Viewport::new(960.0, 720.0).unwrap();
    /// let at = Coords::from(view.to_stage(960.0, 0.0));
    /// let event = ControlEvent::mouse(MouseAction::Down, Some(at));
    /// assert_eq!(event.coords, Some(Coords { x: 240.0, y: 180.0 }));
    /// ```
    pub fn mouse(action: MouseAction, coords: Option<Coords>) -> Self {
        Self {
            key: action.as_str().to_string(),
            event_type: ControlEventType::Mouse,
            coords,
        }
    }

    /// The pointer action for mouse-type events, `None` otherwise.
    pub fn mouse_action(&self) -> Option<MouseAction> {
        match self.event_type {
            ControlEventType::Mouse => MouseAction::parse(&self.key),
            _ => None,
        }
    }

    /// Checks the shape rules serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the key is empty, a mouse event
    /// names an unknown action, or a move carries no coordinates.
    pub fn validate(&self) -> Result<(), String> {
        if self.key.is_empty() {
            return Err("empty key".to_string());
        }
        if self.event_type == ControlEventType::Mouse {
            match MouseAction::parse(&self.key) {
                None => return Err(format!("unknown mouse action {:?}", self.key)),
                Some(MouseAction::Move) if self.coords.is_none() => {
                    return Err("mouse move without coords".to_string())
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Every message that can arrive on the data channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Input(ControlEvent),
    /// Opaque program description pushed by the host. Never interpreted here.
    ProjectMetadata(Value),
    RequestMetadata,
    Unrecognized { raw: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_event_omits_coords() {
        let json = serde_json::to_value(ControlEvent::keydown("ArrowUp")).unwrap();
        assert_eq!(json, serde_json::json!({ "key": "ArrowUp", "type": "keydown" }));
    }

    #[test]
    fn test_mouse_event_carries_action_in_key() {
        let event = ControlEvent::mouse(MouseAction::Down, Some(Coords { x: 1.0, y: 2.0 }));
        assert_eq!(event.key, "down");
        assert_eq!(event.mouse_action(), Some(MouseAction::Down));
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_mouse_coords_travel_in_stage_space() {
        let view = crate::Viewport::new(200.0, 100.0).unwrap();
        let event = ControlEvent::mouse(MouseAction::Move, Some(view.to_stage(50.0, 75.0).into()));
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "key": "move", "type": "mouse", "coords": { "x": -120.0, "y": -90.0 } })
        );
    }

    #[test]
    fn test_mouse_action_is_none_for_key_events() {
        assert_eq!(ControlEvent::keyup("up").mouse_action(), None);
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        assert!(ControlEvent::keydown("").validate().is_err());
        let wheel = ControlEvent {
            key: "wheel".to_string(),
            event_type: ControlEventType::Mouse,
            coords: None,
        };
        assert!(wheel.validate().is_err());
        assert!(ControlEvent::mouse(MouseAction::Move, None).validate().is_err());
        assert!(ControlEvent::mouse(MouseAction::Up, None).validate().is_ok());
    }
}
