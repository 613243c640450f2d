use std::sync::Arc;

use shared::domain::{Command, FocusMode, FocusRequest, PanelStatus};
use tokio::sync::Mutex;
use tracing::info;

use crate::publisher::FocusPublisher;

/// Decides whether a panel reveal also takes input focus and forwards that decision.
#[derive(Clone)]
pub(crate) struct CommandDispatcher {
    publisher: FocusPublisher,
    panel: Arc<Mutex<PanelStatus>>,
}

impl CommandDispatcher {
    pub(crate) fn new(publisher: FocusPublisher) -> Self {
        Self {
            publisher,
            panel: Arc::new(Mutex::new(PanelStatus::default())),
        }
    }

    /// Reveals the panel. An absent flag takes focus, matching the legacy behavior.
    pub(crate) async fn dispatch(&self, preserve_focus: Option<bool>) -> FocusRequest {
        self.reveal(FocusMode::from_flag(preserve_focus), None).await
    }

    /// Reveals the panel on behalf of `command`, falling back to the command's own default.
    pub(crate) async fn dispatch_command(
        &self,
        command: Command,
        preserve_focus: Option<bool>,
    ) -> FocusRequest {
        let mode = preserve_focus
            .map(FocusMode::from)
            .unwrap_or_else(|| command.default_focus_mode());
        self.reveal(mode, Some(command)).await
    }

    pub(crate) async fn hide(&self) {
        let mut panel = self.panel.lock().await;
        panel.visible = false;
        let receivers = self.publisher.publish_hidden();
        info!(receivers, "panel hidden");
    }

    pub(crate) async fn status(&self) -> PanelStatus {
        self.panel.lock().await.clone()
    }

    pub(crate) fn publisher(&self) -> &FocusPublisher {
        &self.publisher
    }

    async fn reveal(&self, mode: FocusMode, command: Option<Command>) -> FocusRequest {
        let request = FocusRequest::new(mode, command);
        info!(
            request_id = %request.request_id(),
            command = command.map(Command::as_str).unwrap_or("direct"),
            preserve_focus = mode.preserves_focus(),
            "revealing panel"
        );

        // Status and publish order must agree, so the send happens under the lock.
        let mut panel = self.panel.lock().await;
        panel.visible = true;
        panel.dispatched += 1;
        panel.last_request = Some(request.clone());
        self.publisher.publish(request.clone());
        request
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
