//! Host-side receiver: applies remote control events to the running program.
//!
//! The context mirrors the keys the remote user currently holds. After every
//! change it hands the program the *whole* set rather than a single press or
//! release, so a lost key-up is corrected by the next change instead of
//! leaving a key stuck forever.

use std::collections::BTreeSet;
use std::sync::Arc;

use multiplay_core::{ControlEvent, ControlEventType, KeyMapper, MouseAction, StagePoint};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("key {0:?} has no program equivalent")]
    UnmappedKey(String),

    #[error("malformed control event: {0}")]
    InvalidEvent(String),

    #[error("program input failed: {0}")]
    Program(String),

    #[error("program input not ready after {0} ms")]
    NotReady(u64),

    #[error("program input surface was dropped")]
    ProgramGone,
}

/// The running program's simulated keyboard and mouse.
///
/// Implemented by whatever hosts the program.
#[cfg_attr(test, mockall::automock)]
pub trait ProgramInput: Send + Sync {
    /// Replaces the program's pressed-key list with `keys`.
    fn replace_pressed_keys(&self, keys: Vec<String>) -> Result<(), InputError>;

    /// Moves the pointer to `position` (stage space). `button_down` is
    /// `None` for a plain move.
    fn set_pointer(&self, position: StagePoint, button_down: Option<bool>)
        -> Result<(), InputError>;
}

/// Per-session receiver state.
pub struct ReceiverContext {
    program: Arc<dyn ProgramInput>,
    active: BTreeSet<String>,
    pointer: StagePoint,
    button_down: bool,
}

impl ReceiverContext {
    pub fn new(program: Arc<dyn ProgramInput>) -> Self {
        Self {
            program,
            active: BTreeSet::new(),
            pointer: StagePoint::default(),
            button_down: false,
        }
    }

    /// Applies one remote event.
    ///
    /// Key-downs of held keys and key-ups of keys not held change nothing
    /// and do not reach the program.
    ///
    /// # Errors
    ///
    /// - [`InputError::InvalidEvent`] when the event fails validation.
    /// - [`InputError::UnmappedKey`] for keys the program cannot express.
    /// - Whatever the program reports.
    pub fn apply(&mut self, event: &ControlEvent) -> Result<(), InputError> {
        event.validate().map_err(InputError::InvalidEvent)?;
        match event.event_type {
            ControlEventType::Keydown => {
                let name = program_key(&event.key)?;
                if self.active.insert(name) {
                    self.push_keys()?;
                }
                Ok(())
            }
            ControlEventType::Keyup => {
                let name = program_key(&event.key)?;
                if self.active.remove(&name) {
                    self.push_keys()
                } else {
                    debug!(key = %name, "key-up for a key not held; ignoring");
                    Ok(())
                }
            }
            ControlEventType::Mouse => self.apply_mouse(event),
        }
    }

    fn apply_mouse(&mut self, event: &ControlEvent) -> Result<(), InputError> {
        let action = event
            .mouse_action()
            .ok_or_else(|| InputError::InvalidEvent(format!("mouse action {:?}", event.key)))?;
        // Presses without coordinates stay where the pointer already is.
        if let Some(coords) = event.coords {
            self.pointer = StagePoint::from(coords).clamped();
        }
        let button = match action {
            MouseAction::Down => Some(true),
            MouseAction::Up => Some(false),
            MouseAction::Move => None,
        };
        if let Some(down) = button {
            self.button_down = down;
        }
        trace!(x = self.pointer.x, y = self.pointer.y, ?button, "pointer");
        self.program.set_pointer(self.pointer, button)
    }

    /// Lifts every key and the mouse button. Used when the session ends.
    pub fn release_all(&mut self) -> Result<(), InputError> {
        if !self.active.is_empty() {
            self.active.clear();
            self.push_keys()?;
        }
        if self.button_down {
            self.button_down = false;
            self.program.set_pointer(self.pointer, Some(false))?;
        }
        Ok(())
    }

    /// Program names of the held keys, sorted.
    pub fn active_keys(&self) -> Vec<String> {
        self.active.iter().cloned().collect()
    }

    pub fn is_pressed(&self, program_name: &str) -> bool {
        self.active.contains(program_name)
    }

    pub fn pointer(&self) -> StagePoint {
        self.pointer
    }

    pub fn button_down(&self) -> bool {
        self.button_down
    }

    fn push_keys(&self) -> Result<(), InputError> {
        self.program.replace_pressed_keys(self.active_keys())
    }
}

fn program_key(wire: &str) -> Result<String, InputError> {
    KeyMapper::program_name(wire).ok_or_else(|| InputError::UnmappedKey(wire.to_string()))
}
