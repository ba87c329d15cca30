//! Review fan-out: run every relevant reviewer concurrently over one
//! project snapshot and consolidate the results.

use std::sync::Arc;

use async_trait::async_trait;

use conveyor_types::{
    well_known, ConveyorError, ExecutionOutcome, Goal, Push, Result, ReviewOutcome, ReviewerError,
};

use crate::dispatch::{CommitStatusEvent, GoalExecutor};
use crate::notify::{format_review_comments, format_reviewer_errors, notify_best_effort};
use crate::project::{Credentials, Project, ProjectLoader};
use crate::registration::ReviewerRegistration;
use crate::NotificationSink;

/// Run all reviewers relevant to `push` against one snapshot of the pushed
/// commit.
///
/// Reviewers run concurrently; each failure is captured as a
/// [`ReviewerError`] without disturbing its siblings, and comments are
/// concatenated in registration order. A reviewer reporting against a
/// different commit than it was handed is a bug, not a review finding, and
/// fails the whole call. With no registrations (or none relevant) the goal
/// succeeds without checking anything out.
pub async fn execute_review(
    loader: &dyn ProjectLoader,
    registrations: &[ReviewerRegistration],
    push: &Push,
    credentials: &Credentials,
    notifications: &dyn NotificationSink,
    channel: &str,
) -> Result<(ExecutionOutcome, ReviewOutcome)> {
    if registrations.is_empty() {
        return Ok((
            ExecutionOutcome::success("No reviewers registered"),
            ReviewOutcome::default(),
        ));
    }

    let mut relevant = Vec::new();
    for reg in registrations {
        if reg.is_relevant(push).await? {
            relevant.push(reg);
        }
    }
    if relevant.is_empty() {
        tracing::debug!(repo = %push.repo, "No reviewer relevant to this push");
        return Ok((
            ExecutionOutcome::success("No relevant reviewers"),
            ReviewOutcome::default(),
        ));
    }

    let project = Arc::new(
        loader
            .load(credentials, &push.repo, push.before.as_deref())
            .await?,
    );
    let changed: Arc<Project> = Arc::new(project.changed_view());

    let mut handles = Vec::with_capacity(relevant.len());
    for reg in &relevant {
        let name = reg.name.clone();
        let reviewer = Arc::clone(&reg.reviewer);
        let snapshot = if reg.options.review_only_changed_files {
            Arc::clone(&changed)
        } else {
            Arc::clone(&project)
        };
        handles.push((
            name.clone(),
            tokio::spawn(async move {
                tracing::debug!(reviewer = %name, "Running reviewer");
                reviewer.review(snapshot.as_ref()).await
            }),
        ));
    }

    // Join in registration order so consolidation is deterministic.
    let mut outcome = ReviewOutcome::default();
    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(review)) => {
                if !review.repo.same_commit(&push.repo) {
                    return Err(ConveyorError::ReviewIdentityMismatch {
                        expected: push.repo.to_string(),
                        found: review.repo.to_string(),
                    });
                }
                outcome.comments.extend(review.comments);
            }
            Ok(Err(e)) => {
                tracing::warn!(reviewer = %name, error = %e, "Reviewer failed");
                outcome.errors.push(ReviewerError {
                    reviewer: name,
                    message: e.to_string(),
                });
            }
            Err(join_err) => {
                outcome.errors.push(ReviewerError {
                    reviewer: name,
                    message: format!("reviewer task failed: {join_err}"),
                });
            }
        }
    }

    if outcome.is_clean() {
        return Ok((ExecutionOutcome::success("Code review passed"), outcome));
    }

    if !outcome.comments.is_empty() {
        let msg = format_review_comments(&push.repo, &outcome.comments);
        notify_best_effort(notifications, channel, &msg).await;
    }
    if !outcome.errors.is_empty() {
        let msg = format_reviewer_errors(&outcome.errors);
        notify_best_effort(notifications, channel, &msg).await;
    }

    let notes = format!(
        "Review found {} comment(s), {} reviewer error(s)",
        outcome.comments.len(),
        outcome.errors.len()
    );
    Ok((ExecutionOutcome::needs_approval(notes), outcome))
}

/// The review goal, wired into the dispatch registry.
pub struct ReviewGoalExecutor {
    goal: Goal,
    loader: Arc<dyn ProjectLoader>,
    registrations: Vec<ReviewerRegistration>,
    notifications: Arc<dyn NotificationSink>,
    channel: String,
}

impl ReviewGoalExecutor {
    pub fn new(
        loader: Arc<dyn ProjectLoader>,
        registrations: Vec<ReviewerRegistration>,
        notifications: Arc<dyn NotificationSink>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            goal: well_known::review_goal(),
            loader,
            registrations,
            notifications,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl GoalExecutor for ReviewGoalExecutor {
    fn goal(&self) -> &Goal {
        &self.goal
    }

    async fn execute(
        &self,
        event: &CommitStatusEvent,
        credentials: &Credentials,
    ) -> Result<ExecutionOutcome> {
        let (outcome, _) = execute_review(
            self.loader.as_ref(),
            &self.registrations,
            &event.push,
            credentials,
            self.notifications.as_ref(),
            &self.channel,
        )
        .await?;
        Ok(outcome)
    }
}
