//! The operator retry command: re-request a goal on a commit.

use conveyor_types::{Goal, GoalRecord, GoalState, RepoRef, Result};

use crate::metadata::RepoMetadataSource;
use crate::store::{goal_corresponds_to_record, GoalStore};

/// Parameters of one retry request. Only the repository identity is
/// mandatory; sha, branch, and goal set are resolved when absent.
#[derive(Debug, Clone)]
pub struct RetryGoalRequest {
    pub owner: String,
    pub repo: String,
    pub provider_id: String,
    pub sha: Option<String>,
    pub branch: Option<String>,
    pub goal_set: Option<String>,
}

/// What the retry command did. `NoMatchingGoal` is a user-facing answer, not
/// a fault: the requester asked to retry a goal that was never planned on
/// that commit and gave no explicit goal set to create it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Requested { sha: String, goal_set: String },
    NoMatchingGoal { message: String },
}

/// Re-request `goal` on a commit.
///
/// Commit resolution: explicit sha if given, else the tip of the given (or
/// default) branch. Goal-set resolution: explicit name if given, else the
/// goal set of an existing matching goal on that commit. On success a fresh
/// `requested` record is appended; prior history is never touched.
pub async fn trigger_goal(
    request: &RetryGoalRequest,
    goal: &Goal,
    metadata: &dyn RepoMetadataSource,
    store: &dyn GoalStore,
) -> Result<RetryOutcome> {
    let tips = metadata
        .branch_tips(&request.owner, &request.repo, &request.provider_id)
        .await?;
    let branch = request
        .branch
        .clone()
        .unwrap_or_else(|| tips.default_branch.clone());
    let sha = match &request.sha {
        Some(sha) => sha.clone(),
        None => tips
            .tip_of(&branch)
            .map(str::to_string)
            .ok_or_else(|| conveyor_types::ConveyorError::BranchNotFound {
                owner: request.owner.clone(),
                repo: request.repo.clone(),
                branch: branch.clone(),
            })?,
    };

    let repo = RepoRef::new(
        &request.owner,
        &request.repo,
        &request.provider_id,
        &branch,
        &sha,
    );

    let (goal_set, goal_set_id) = match &request.goal_set {
        Some(name) => (name.clone(), uuid::Uuid::new_v4()),
        None => {
            let existing = store.goals_for_commit(&repo).await?;
            match existing
                .iter()
                .find(|r| goal_corresponds_to_record(goal, r))
            {
                Some(matching) => (matching.goal_set.clone(), matching.goal_set_id),
                None => {
                    let short = &sha[..sha.len().min(7)];
                    return Ok(RetryOutcome::NoMatchingGoal {
                        message: format!(
                            "The goal '{}' does not exist on {short}. \
                             To create it anyway, pass an explicit goal set to the retry command",
                            goal.name
                        ),
                    });
                }
            }
        }
    };

    let record = GoalRecord::new(repo, goal, &goal_set, goal_set_id, GoalState::Requested);
    tracing::info!(
        goal = %goal.name,
        goal_set = %goal_set,
        sha = %sha,
        "Re-requesting goal"
    );
    store.store_goal(record).await?;
    Ok(RetryOutcome::Requested { sha, goal_set })
}
