//! The reporting channel: fire-and-forget messages and progress fractions
//! pushed from the worker task to whatever embeds the pipeline.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// An event republished to the embedding context (CLI, GUI, test harness).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Message(String),
    /// `total == 1` with `done == 0` signals an indeterminate/reset state.
    Progress { done: u64, total: u64 },
}

/// Sender half of the reporting channel.
///
/// Cloneable and cheap; every send is fire-and-forget with no back-pressure.
/// A disconnected receiver is ignored, so suppliers and consumers can
/// report unconditionally.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    tx: Option<UnboundedSender<ReportEvent>>,
}

impl Reporter {
    /// A connected reporter plus the receiver the embedder drains.
    pub fn channel() -> (Self, UnboundedReceiver<ReportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A reporter that drops every event. Useful in tests.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn message(&self, text: impl Into<String>) {
        self.send(ReportEvent::Message(text.into()));
    }

    pub fn progress(&self, done: u64, total: u64) {
        self.send(ReportEvent::Progress { done, total });
    }

    /// Emit the `0 of 1` indeterminate reset.
    pub fn reset(&self) {
        self.progress(0, 1);
    }

    /// Throttled per-record progress: emits only when `done` lands on a
    /// 1% boundary of `total`, to avoid flooding the channel on large
    /// datasets. A non-positive total reports a reset instead.
    pub fn record_progress(&self, done: u64, total: u64) {
        if total == 0 {
            self.reset();
            return;
        }
        let interval = (total / 100).max(1);
        if done % interval == 0 {
            self.progress(done, total);
        }
    }

    fn send(&self, event: ReportEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                debug!("report receiver dropped; event discarded");
            }
        }
    }
}
