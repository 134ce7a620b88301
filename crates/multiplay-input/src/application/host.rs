//! Host input router.
//!
//! Lives next to the session kernel on the hosting device. When the session
//! reaches `connected` it waits for the running program to expose its input
//! surface, then builds a fresh [`ReceiverContext`]; every
//! `ControlReceived` event is applied to that context. When the session
//! ends the context releases whatever the remote user was holding and is
//! dropped, so nothing carries over into the next session.

use std::sync::Arc;
use std::time::Duration;

use multiplay_core::ConnectionState;
use multiplay_session::SessionEvent;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::application::receiver::{InputError, ProgramInput, ReceiverContext};

/// How long activation waits for the program's input surface.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Published by the program host; `None` until the program can take input.
pub type ProgramSlot = watch::Receiver<Option<Arc<dyn ProgramInput>>>;

pub struct HostInputRouter {
    program: ProgramSlot,
    ready_timeout: Duration,
    context: Option<ReceiverContext>,
}

impl HostInputRouter {
    pub fn new(program: ProgramSlot) -> Self {
        Self {
            program,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            context: None,
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// True while a receiver context exists.
    pub fn is_active(&self) -> bool {
        self.context.is_some()
    }

    pub fn context(&self) -> Option<&ReceiverContext> {
        self.context.as_ref()
    }

    /// Reacts to one session event.
    ///
    /// # Errors
    ///
    /// Activation and apply failures. None of them are fatal to the
    /// router; [`run`](Self::run) logs them and carries on.
    pub async fn handle(&mut self, event: &SessionEvent) -> Result<(), InputError> {
        match event {
            SessionEvent::ConnectionStateChanged(ConnectionState::Connected) => {
                self.activate().await
            }
            SessionEvent::ConnectionStateChanged(state)
                if state.is_terminal() || *state == ConnectionState::Idle =>
            {
                self.deactivate()
            }
            SessionEvent::ControlReceived(control) => match self.context.as_mut() {
                Some(context) => context.apply(control),
                None => {
                    debug!(key = %control.key, "input before receiver is ready; dropping");
                    Ok(())
                }
            },
            _ => Ok(()),
        }
    }

    async fn activate(&mut self) -> Result<(), InputError> {
        if self.context.is_some() {
            return Ok(());
        }
        let limit = self.ready_timeout;
        let program = match tokio::time::timeout(limit, self.program.wait_for(Option::is_some))
            .await
        {
            Ok(Ok(slot)) => slot.clone(),
            Ok(Err(_)) => return Err(InputError::ProgramGone),
            Err(_) => {
                return Err(InputError::NotReady(
                    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                ))
            }
        };
        let Some(program) = program else {
            return Err(InputError::ProgramGone);
        };
        info!("remote input receiver active");
        self.context = Some(ReceiverContext::new(program));
        Ok(())
    }

    /// Releases held input and drops the context. Safe to call repeatedly.
    pub fn deactivate(&mut self) -> Result<(), InputError> {
        match self.context.take() {
            Some(mut context) => {
                info!("remote input receiver released");
                context.release_all()
            }
            None => Ok(()),
        }
    }

    /// Consumes session events until the stream ends.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle(&event).await {
                warn!("remote input: {e}");
            }
        }
        if let Err(e) = self.deactivate() {
            warn!("remote input release failed: {e}");
        }
    }
}
