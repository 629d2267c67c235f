//! Streaming command execution.
//!
//! Output from a running command is accumulated in full for the final result
//! and, in parallel, coalesced into progress messages: small chunks are held
//! back until the pending text contains a newline or grows past
//! [`FLUSH_THRESHOLD`] characters.

use async_trait::async_trait;

use crate::transport::OutputStream;

/// Pending text longer than this many characters is flushed even without a newline.
pub const FLUSH_THRESHOLD: usize = 100;

/// Result text for a command that produced no output at all.
pub const EMPTY_OUTPUT_FALLBACK: &str = "Command completed";

/// Receives coalesced output while a command is still running.
///
/// Delivery is best-effort. Messages are awaited one by one, so they reach
/// the sink in emission order.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn notify(&self, message: String);
}

/// Buffer between raw output chunks and progress messages.
#[derive(Debug, Default)]
pub struct ProgressCoalescer {
    pending: String,
}

impl ProgressCoalescer {
    /// Append a chunk. Returns the whole pending text when it is due for a flush.
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        self.pending.push_str(chunk);
        if self.flush_due() {
            Some(std::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    /// Whatever is left once the stream has closed.
    pub fn finish(self) -> Option<String> {
        (!self.pending.is_empty()).then_some(self.pending)
    }

    fn flush_due(&self) -> bool {
        self.pending.contains('\n') || self.pending.chars().count() > FLUSH_THRESHOLD
    }
}

/// Drain `stream` to completion, reporting coalesced output to `progress`.
///
/// Returns everything the command wrote, or [`EMPTY_OUTPUT_FALLBACK`] if it
/// wrote nothing. Exit status plays no part in the result.
pub async fn run_command(stream: &mut dyn OutputStream, progress: &dyn ProgressSink) -> String {
    let mut output = String::new();
    let mut coalescer = ProgressCoalescer::default();

    while let Some(chunk) = stream.next_chunk().await {
        output.push_str(&chunk);
        if let Some(batch) = coalescer.push(&chunk) {
            progress.notify(batch).await;
        }
    }

    if let Some(rest) = coalescer.finish() {
        progress.notify(rest).await;
    }

    if output.is_empty() {
        EMPTY_OUTPUT_FALLBACK.to_string()
    } else {
        output
    }
}
