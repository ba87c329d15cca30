//! Commit status publication with sanitization and bounded retry.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use conveyor_types::{CommitStatus, ConveyorError, RepoRef, Result};

use crate::backoff::{retry_with_backoff, BackoffPolicy};

/// Writes commit statuses to the hosting provider.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish(&self, repo: &RepoRef, status: &CommitStatus) -> Result<()>;
}

/// Publish a commit status, sanitizing it first and retrying transient
/// failures up to `max_retries` extra attempts.
///
/// Sanitization happens exactly once, before the first attempt, so every
/// attempt sends the identical payload. When the attempt budget runs out on a
/// retryable error the result is [`ConveyorError::ExternalWriteFailed`]
/// carrying the attempt count; a non-retryable error propagates as-is from
/// the attempt that produced it.
pub async fn publish_with_retry(
    sink: &dyn StatusSink,
    repo: &RepoRef,
    status: &CommitStatus,
    max_retries: usize,
    policy: &BackoffPolicy,
) -> Result<()> {
    let status = status.clone().sanitized();
    let attempts = AtomicUsize::new(0);

    let result = retry_with_backoff(
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            let status = status.clone();
            async move { sink.publish(repo, &status).await }
        },
        max_retries,
        policy,
        "commit_status",
    )
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_retryable() => Err(ConveyorError::ExternalWriteFailed {
            target: format!("commit status {} on {}", status.context, repo),
            attempts: attempts.load(Ordering::SeqCst),
            message: e.to_string(),
        }),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_types::StatusState;
    use tokio::sync::Mutex;

    struct RecordingStatusSink {
        published: Mutex<Vec<CommitStatus>>,
        failures_before_success: AtomicUsize,
    }

    impl RecordingStatusSink {
        fn new(failures_before_success: usize) -> Self {
            Self {
                published: Mutex::new(Vec::new()),
                failures_before_success: AtomicUsize::new(failures_before_success),
            }
        }
    }

    #[async_trait]
    impl StatusSink for RecordingStatusSink {
        async fn publish(&self, _repo: &RepoRef, status: &CommitStatus) -> Result<()> {
            if self
                .failures_before_success
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ConveyorError::Transient {
                    target: "statuses".into(),
                    message: "502".into(),
                });
            }
            self.published.lock().await.push(status.clone());
            Ok(())
        }
    }

    fn repo() -> RepoRef {
        RepoRef::new("octo", "widgets", "gh", "main", "abc1234def")
    }

    fn status(target_url: Option<&str>) -> CommitStatus {
        CommitStatus {
            state: StatusState::Pending,
            context: "delivery/1-build/0-build".into(),
            description: "Building".into(),
            target_url: target_url.map(String::from),
        }
    }

    #[tokio::test]
    async fn publishes_sanitized_payload() {
        let sink = RecordingStatusSink::new(0);
        publish_with_retry(
            &sink,
            &repo(),
            &status(Some("not a url")),
            2,
            &BackoffPolicy::None,
        )
        .await
        .unwrap();

        let published = sink.published.lock().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].target_url, None);
        assert_eq!(published[0].description, "Building at not a url");
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let sink = RecordingStatusSink::new(2);
        publish_with_retry(&sink, &repo(), &status(None), 3, &BackoffPolicy::None)
            .await
            .unwrap();
        assert_eq!(sink.published.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count() {
        let sink = RecordingStatusSink::new(usize::MAX);
        let err = publish_with_retry(&sink, &repo(), &status(None), 2, &BackoffPolicy::None)
            .await
            .unwrap_err();
        match err {
            ConveyorError::ExternalWriteFailed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    struct ForbiddenSink;

    #[async_trait]
    impl StatusSink for ForbiddenSink {
        async fn publish(&self, _repo: &RepoRef, _status: &CommitStatus) -> Result<()> {
            Err(ConveyorError::Other("403 forbidden".into()))
        }
    }

    #[tokio::test]
    async fn non_retryable_error_propagates() {
        let err = publish_with_retry(
            &ForbiddenSink,
            &repo(),
            &status(None),
            5,
            &BackoffPolicy::None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConveyorError::Other(_)));
    }
}
