//! Dispatch from commit-status events to goal executors.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use conveyor_store::{current_goals, GoalStore};
use conveyor_types::{
    CommitStatus, ExecutionOutcome, Goal, GoalState, Push, RepoRef, Result, StatusState,
};

use crate::backoff::BackoffPolicy;
use crate::project::Credentials;
use crate::status::{publish_with_retry, StatusSink};

const STATUS_MAX_RETRIES: usize = 2;

/// A commit-status-like event naming a goal by its context string.
#[derive(Debug, Clone)]
pub struct CommitStatusEvent {
    pub repo: RepoRef,
    pub context: String,
    pub state: StatusState,
    pub description: String,
    pub push: Push,
}

/// Executes one kind of goal in response to a pending status event.
#[async_trait]
pub trait GoalExecutor: Send + Sync {
    /// The goal this executor implements; its context keys the registry.
    fn goal(&self) -> &Goal;

    async fn execute(
        &self,
        event: &CommitStatusEvent,
        credentials: &Credentials,
    ) -> Result<ExecutionOutcome>;
}

/// Explicit handler table mapping goal contexts to executors. Registration
/// order does not matter; contexts are unique and a later registration for
/// the same context replaces the earlier one.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn GoalExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, executor: Arc<dyn GoalExecutor>) -> Self {
        self.executors
            .insert(executor.goal().context.clone(), executor);
        self
    }

    pub fn executor_for(&self, context: &str) -> Option<Arc<dyn GoalExecutor>> {
        self.executors.get(context).cloned()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

/// Run the goal named by a pending commit-status event.
///
/// Returns `Ok(None)` when the event is not actionable here: not a pending
/// status, no executor registered for its context, or no current goal record
/// on that commit awaiting execution.
///
/// State and status writes are ordered:
///   1. publish the pending status, then append `in_process`. A failed
///      pending status write aborts the run while the record is still
///      `requested`, so a redelivered event can pick the goal up again;
///   2. run the executor, converting its error to a failure outcome;
///   3. append the terminal state only once the outcome is known, then
///      publish the terminal status. A failed terminal status write is
///      logged, not escalated: the store already holds the truth.
pub async fn run_goal(
    registry: &ExecutorRegistry,
    store: &dyn GoalStore,
    statuses: &dyn StatusSink,
    event: &CommitStatusEvent,
    credentials: &Credentials,
    policy: &BackoffPolicy,
) -> Result<Option<ExecutionOutcome>> {
    if event.state != StatusState::Pending {
        return Ok(None);
    }
    let Some(executor) = registry.executor_for(&event.context) else {
        tracing::debug!(context = %event.context, "No executor registered for context");
        return Ok(None);
    };
    let goal = executor.goal().clone();

    let records = store.goals_for_commit(&event.repo).await?;
    let Some(record) = current_goals(&records)
        .into_iter()
        .find(|r| r.goal_context == event.context && r.state == GoalState::Requested)
    else {
        tracing::debug!(context = %event.context, repo = %event.repo, "No requested goal record for event");
        return Ok(None);
    };

    publish_with_retry(
        statuses,
        &event.repo,
        &CommitStatus {
            state: StatusState::Pending,
            context: goal.context.clone(),
            description: goal.working_description.clone(),
            target_url: None,
        },
        STATUS_MAX_RETRIES,
        policy,
    )
    .await?;
    let in_process = record.transitioned_to(GoalState::InProcess);
    store.store_goal(in_process.clone()).await?;

    tracing::info!(goal = %goal.name, repo = %event.repo, "Executing goal");
    let outcome = match executor.execute(event, credentials).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(goal = %goal.name, error = %e, "Executor failed");
            ExecutionOutcome::failure(e.to_string())
        }
    };

    let terminal = in_process.transitioned_to(outcome.state);
    store.store_goal(terminal).await?;

    let status = terminal_status(&goal, &outcome);
    if let Err(e) =
        publish_with_retry(statuses, &event.repo, &status, STATUS_MAX_RETRIES, policy).await
    {
        tracing::warn!(goal = %goal.name, error = %e, "Terminal status write failed");
    }

    Ok(Some(outcome))
}

fn terminal_status(goal: &Goal, outcome: &ExecutionOutcome) -> CommitStatus {
    let (state, description) = match outcome.state {
        GoalState::Success => (StatusState::Success, goal.completed_description.clone()),
        GoalState::Failure => (
            StatusState::Failure,
            outcome
                .failure_reason
                .clone()
                .unwrap_or_else(|| format!("{} failed", goal.name)),
        ),
        GoalState::WaitingForApproval => (
            StatusState::Success,
            format!("{} (approval required)", goal.completed_description),
        ),
        GoalState::Skipped => (StatusState::Success, format!("{} skipped", goal.name)),
        // Non-terminal outcomes do not reach here; report them as-is.
        GoalState::Requested | GoalState::InProcess => {
            (StatusState::Pending, goal.working_description.clone())
        }
    };
    CommitStatus {
        state,
        context: goal.context.clone(),
        description,
        target_url: None,
    }
}
