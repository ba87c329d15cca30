//! Best-effort notification delivery and message formatting.

use async_trait::async_trait;

use conveyor_types::{RepoRef, Result, ReviewComment, ReviewerError};

/// Delivers a message to a destination (a chat channel, a log, ...).
/// Delivery failures are the sink's problem to report; callers that want
/// fire-and-forget semantics go through [`notify_best_effort`].
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, destination: &str, message: &str) -> Result<()>;
}

/// Send, logging failure instead of escalating it. A notification failure
/// never alters the outcome of the goal that produced it.
pub async fn notify_best_effort(sink: &dyn NotificationSink, destination: &str, message: &str) {
    if let Err(e) = sink.send(destination, message).await {
        tracing::warn!(destination, error = %e, "Notification delivery failed");
    }
}

/// One message aggregating all review comments, in their given order.
pub fn format_review_comments(repo: &RepoRef, comments: &[ReviewComment]) -> String {
    let mut out = format!("Review comments on {}:\n", repo.slug());
    for c in comments {
        let loc = c
            .location
            .as_ref()
            .map(|l| match l.line {
                Some(line) => format!(" ({}:{line})", l.path),
                None => format!(" ({})", l.path),
            })
            .unwrap_or_default();
        let fix = c
            .fix
            .as_ref()
            .map(|f| format!(" [fix: {}]", f.command))
            .unwrap_or_default();
        out.push_str(&format!("- [{}] {}{loc}{fix}\n", c.category, c.detail));
    }
    out
}

/// One message aggregating all reviewer errors.
pub fn format_reviewer_errors(errors: &[ReviewerError]) -> String {
    let mut out = String::from("Reviewers failed:\n");
    for e in errors {
        out.push_str(&format!("- {}: {}\n", e.reviewer, e.message));
    }
    out
}

/// Sink that records every message, for assertions in tests.
#[derive(Default)]
pub struct RecordingSink {
    messages: tokio::sync::Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, destination: &str, message: &str) -> Result<()> {
        self.messages
            .lock()
            .await
            .push((destination.to_string(), message.to_string()));
        Ok(())
    }
}
