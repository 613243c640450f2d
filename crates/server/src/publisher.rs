use shared::{domain::FocusRequest, protocol::ServerEvent};
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::MAX_EVENT_BUFFER;

/// Fans panel notifications out to every open event stream.
#[derive(Clone)]
pub(crate) struct FocusPublisher {
    events: broadcast::Sender<ServerEvent>,
}

impl FocusPublisher {
    pub(crate) fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.clamp(1, MAX_EVENT_BUFFER));
        Self { events }
    }

    /// Never blocks. Returns how many subscribers the event was queued for.
    pub(crate) fn publish(&self, request: FocusRequest) -> usize {
        let request_id = request.request_id();
        let preserve_focus = request.preserve_focus();
        self.send(ServerEvent::FocusInputRequested { request })
            .inspect(|receivers| {
                debug!(%request_id, preserve_focus, receivers, "published focus request");
            })
            .unwrap_or_else(|| {
                debug!(%request_id, preserve_focus, "no subscribers; focus request dropped");
                0
            })
    }

    pub(crate) fn publish_hidden(&self) -> usize {
        self.send(ServerEvent::PanelHidden).unwrap_or(0)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn send(&self, event: ServerEvent) -> Option<usize> {
        self.events.send(event).ok()
    }
}
