//! Recording adapters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use multiplay_core::{ControlEvent, StagePoint};

use crate::application::forward::ControlSink;
use crate::application::receiver::{InputError, ProgramInput};

#[derive(Default)]
struct ProgramLog {
    key_snapshots: Vec<Vec<String>>,
    pointer_calls: Vec<(StagePoint, Option<bool>)>,
}

/// Program input surface that records every call.
#[derive(Default)]
pub struct RecordingProgramInput {
    log: Mutex<ProgramLog>,
    fail: bool,
}

impl RecordingProgramInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with [`InputError::Program`].
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn key_snapshots(&self) -> Vec<Vec<String>> {
        self.lock().key_snapshots.clone()
    }

    /// The pressed-key list the program currently holds.
    pub fn pressed_keys(&self) -> Vec<String> {
        self.lock().key_snapshots.last().cloned().unwrap_or_default()
    }

    pub fn pointer_calls(&self) -> Vec<(StagePoint, Option<bool>)> {
        self.lock().pointer_calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgramLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProgramInput for RecordingProgramInput {
    fn replace_pressed_keys(&self, keys: Vec<String>) -> Result<(), InputError> {
        if self.fail {
            return Err(InputError::Program("keyboard unavailable".to_string()));
        }
        self.lock().key_snapshots.push(keys);
        Ok(())
    }

    fn set_pointer(&self, position: StagePoint, button_down: Option<bool>) -> Result<(), InputError> {
        if self.fail {
            return Err(InputError::Program("mouse unavailable".to_string()));
        }
        self.lock().pointer_calls.push((position, button_down));
        Ok(())
    }
}

/// Control sink that records what it accepts.
pub struct RecordingControlSink {
    sent: Mutex<Vec<ControlEvent>>,
    open: AtomicBool,
}

impl RecordingControlSink {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
        }
    }

    /// A sink whose channel is not open; everything is dropped.
    pub fn closed() -> Self {
        let sink = Self::new();
        sink.set_open(false);
        sink
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<ControlEvent> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for RecordingControlSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlSink for RecordingControlSink {
    async fn send_control_event(&self, event: ControlEvent) -> bool {
        if !self.open.load(Ordering::SeqCst) {
            return false;
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
        true
    }
}
