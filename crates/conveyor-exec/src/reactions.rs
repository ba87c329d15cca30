//! Code-reaction fan-out: side-effecting listeners run concurrently over
//! one project snapshot, with per-listener error capture.

use std::sync::Arc;

use async_trait::async_trait;

use conveyor_rules::{on_any_push, PushTest};
use conveyor_types::{ExecutionOutcome, Push, Result};

use crate::project::{Credentials, Project, ProjectLoader};

/// A side-effecting action over a pushed commit. Listeners produce no value;
/// they either complete or fail.
#[async_trait]
pub trait CodeReactionListener: Send + Sync {
    async fn on_push(&self, project: &Project, push: &Push) -> Result<()>;
}

/// An independently registered listener with its relevance guard.
pub struct ReactionRegistration {
    pub name: String,
    pub relevance: Arc<dyn PushTest>,
    pub listener: Arc<dyn CodeReactionListener>,
}

impl ReactionRegistration {
    pub fn new(name: impl Into<String>, listener: Arc<dyn CodeReactionListener>) -> Self {
        Self {
            name: name.into(),
            relevance: on_any_push(),
            listener,
        }
    }

    pub fn with_relevance(mut self, relevance: Arc<dyn PushTest>) -> Self {
        self.relevance = relevance;
        self
    }
}

/// A failure captured from one listener.
#[derive(Debug, Clone)]
pub struct ReactionError {
    pub listener: String,
    pub message: String,
}

/// Run every relevant listener concurrently against one snapshot.
///
/// Same isolation contract as the review fan-out: one listener's failure
/// never prevents its siblings from running or their failures from being
/// collected. No registered or relevant listeners is trivial success.
pub async fn execute_code_reactions(
    loader: &dyn ProjectLoader,
    registrations: &[ReactionRegistration],
    push: &Push,
    credentials: &Credentials,
) -> Result<(ExecutionOutcome, Vec<ReactionError>)> {
    if registrations.is_empty() {
        return Ok((ExecutionOutcome::success("No listeners registered"), vec![]));
    }

    let mut relevant = Vec::new();
    for reg in registrations {
        if reg.relevance.test(push).await? {
            relevant.push(reg);
        }
    }
    if relevant.is_empty() {
        return Ok((ExecutionOutcome::success("No relevant listeners"), vec![]));
    }

    let project = Arc::new(
        loader
            .load(credentials, &push.repo, push.before.as_deref())
            .await?,
    );

    let mut handles = Vec::with_capacity(relevant.len());
    for reg in &relevant {
        let name = reg.name.clone();
        let listener = Arc::clone(&reg.listener);
        let project = Arc::clone(&project);
        let push = push.clone();
        handles.push((
            name,
            tokio::spawn(async move { listener.on_push(project.as_ref(), &push).await }),
        ));
    }

    let mut errors = Vec::new();
    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(listener = %name, error = %e, "Code reaction failed");
                errors.push(ReactionError {
                    listener: name,
                    message: e.to_string(),
                });
            }
            Err(join_err) => errors.push(ReactionError {
                listener: name,
                message: format!("listener task failed: {join_err}"),
            }),
        }
    }

    let outcome = if errors.is_empty() {
        ExecutionOutcome::success(format!("{} listener(s) ran", relevant.len()))
    } else {
        ExecutionOutcome::needs_approval(format!("{} listener(s) failed", errors.len()))
    };
    Ok((outcome, errors))
}
