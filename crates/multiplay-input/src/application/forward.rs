//! The single outbound path for control events.

use async_trait::async_trait;
use multiplay_core::ControlEvent;
use multiplay_session::SessionKernel;
use tracing::debug;

/// Something that can carry control events to the remote peer.
#[async_trait]
pub trait ControlSink: Send + Sync {
    /// Returns `false` when the event was dropped.
    async fn send_control_event(&self, event: ControlEvent) -> bool;
}

#[async_trait]
impl ControlSink for SessionKernel {
    async fn send_control_event(&self, event: ControlEvent) -> bool {
        SessionKernel::send_control_event(self, event).await
    }
}

/// Sends widget output in order. Returns how many events were accepted.
pub async fn forward_all<S, I>(sink: &S, events: I) -> usize
where
    S: ControlSink + ?Sized,
    I: IntoIterator<Item = ControlEvent>,
{
    let mut accepted = 0;
    for event in events {
        if sink.send_control_event(event).await {
            accepted += 1;
        }
    }
    if accepted > 0 {
        debug!(accepted, "forwarded control events");
    }
    accepted
}
