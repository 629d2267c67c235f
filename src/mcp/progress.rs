//! Progress notifications for a single `tools/call` invocation.

use async_trait::async_trait;
use rmcp::model::{ProgressNotificationParam, ProgressToken};
use rmcp::{Peer, RoleServer};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::executor::ProgressSink;

/// Forwards coalesced command output to the client as
/// `notifications/progress`, tagged with the caller's progress token.
///
/// Without a token there is nothing to correlate against, so messages are
/// dropped.
pub struct ProgressReporter {
    token: Option<ProgressToken>,
    peer: Peer<RoleServer>,
    sent: AtomicU32,
}

impl ProgressReporter {
    pub fn new(token: Option<ProgressToken>, peer: Peer<RoleServer>) -> Self {
        Self {
            token,
            peer,
            sent: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ProgressSink for ProgressReporter {
    async fn notify(&self, message: String) {
        let Some(token) = &self.token else {
            tracing::trace!("No progress token, dropping {} bytes of output", message.len());
            return;
        };

        let progress = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        let params = ProgressNotificationParam {
            progress_token: token.clone(),
            progress: progress.into(),
            total: None,
            message: Some(message),
        };

        if let Err(e) = self.peer.notify_progress(params).await {
            tracing::debug!("Failed to send progress notification: {}", e);
        }
    }
}
