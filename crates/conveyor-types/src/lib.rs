//! Shared types and errors for the Conveyor delivery machine.
//!
//! This crate provides the foundational types used across all other Conveyor
//! crates:
//! - `ConveyorError` — unified error taxonomy
//! - `Push`, `RepoRef` — the immutable push event and commit identity
//! - `Goal`, `GoalSet`, `GoalRecord` — delivery goals and their persisted state
//! - `ReviewOutcome`, `ExecutionOutcome` — consolidated action results
//! - `CommitStatus` — the status-reporting payload (with URL sanitization)

use serde::{Deserialize, Serialize};

pub mod well_known;

/// Unified error type for all Conveyor subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ConveyorError {
    // === Lookup errors ===
    #[error("Repository not found: {owner}/{repo}")]
    RepoNotFound { owner: String, repo: String },

    #[error("Branch not found: {branch} on {owner}/{repo}")]
    BranchNotFound {
        owner: String,
        repo: String,
        branch: String,
    },

    // === Resolution errors ===
    #[error("Push rule '{rule}' failed: {message}")]
    RuleFailed { rule: String, message: String },

    // === Execution errors ===
    #[error("Executor for goal '{goal}' failed: {message}")]
    ExecutorFailed { goal: String, message: String },

    #[error("Reviews disagree on repository identity: expected {expected}, found {found}")]
    ReviewIdentityMismatch { expected: String, found: String },

    // === Build errors ===
    #[error("Build command '{command}' failed with exit code {code}")]
    BuildStepFailed { command: String, code: i32 },

    #[error("Command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    // === External collaborator errors ===
    #[error("Write to {target} failed after {attempts} attempts: {message}")]
    ExternalWriteFailed {
        target: String,
        attempts: usize,
        message: String,
    },

    #[error("Transient failure talking to {target}: {message}")]
    Transient { target: String, message: String },

    // === Store errors ===
    #[error("Goal store error: {0}")]
    Store(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ConveyorError {
    /// Returns `true` if the error is transient and the operation may succeed
    /// on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConveyorError::Transient { .. } | ConveyorError::CommandTimeout { .. }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConveyorError::RepoNotFound { .. }
                | ConveyorError::BranchNotFound { .. }
                | ConveyorError::ReviewIdentityMismatch { .. }
        )
    }
}

/// A convenience alias for `Result<T, ConveyorError>`.
pub type Result<T> = std::result::Result<T, ConveyorError>;

// ---------------------------------------------------------------------------
// RepoRef and Push — the immutable push event
// ---------------------------------------------------------------------------

/// Identity of one commit in one repository on one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
    pub provider_id: String,
    pub branch: String,
    pub sha: String,
}

impl RepoRef {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        provider_id: impl Into<String>,
        branch: impl Into<String>,
        sha: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            provider_id: provider_id.into(),
            branch: branch.into(),
            sha: sha.into(),
        }
    }

    /// The `owner/repo` form used in messages and log lines.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// First seven characters of the sha, for human-facing output.
    pub fn short_sha(&self) -> &str {
        let end = self.sha.len().min(7);
        &self.sha[..end]
    }

    /// Same commit on the same provider, ignoring branch.
    pub fn same_commit(&self, other: &RepoRef) -> bool {
        self.owner == other.owner
            && self.repo == other.repo
            && self.provider_id == other.provider_id
            && self.sha == other.sha
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.short_sha())
    }
}

/// One commit in a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
}

/// Immutable record of a single branch-push event.
///
/// Produced by the external event source; read-only to the core. `before` is
/// `None` for a branch's first push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Push {
    pub repo: RepoRef,
    pub before: Option<String>,
    pub after: String,
    pub commits: Vec<Commit>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Push {
    /// The commit that triggered this push (the `after` commit).
    pub fn trigger(&self) -> Option<&Commit> {
        self.commits.iter().find(|c| c.sha == self.after)
    }

    pub fn branch(&self) -> &str {
        &self.repo.branch
    }
}

// ---------------------------------------------------------------------------
// GoalState — the lifecycle of one persisted goal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    Requested,
    InProcess,
    Success,
    Failure,
    WaitingForApproval,
    Skipped,
}

impl GoalState {
    /// Success, failure, and skipped are terminal. `WaitingForApproval` is a
    /// human gate: an approval command can still move it to success.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GoalState::Success | GoalState::Failure | GoalState::Skipped
        )
    }

    /// Whether a transition from `self` to `next` is part of the normal
    /// lifecycle. Retry re-enters at `Requested` from any state, so that
    /// transition is always allowed.
    pub fn can_transition_to(&self, next: GoalState) -> bool {
        if next == GoalState::Requested {
            return true;
        }
        match self {
            GoalState::Requested => matches!(
                next,
                GoalState::InProcess | GoalState::Skipped
            ),
            GoalState::InProcess => matches!(
                next,
                GoalState::Success | GoalState::Failure | GoalState::WaitingForApproval
            ),
            GoalState::WaitingForApproval => next == GoalState::Success,
            GoalState::Success | GoalState::Failure | GoalState::Skipped => false,
        }
    }
}

impl std::fmt::Display for GoalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GoalState::Requested => "requested",
            GoalState::InProcess => "in_process",
            GoalState::Success => "success",
            GoalState::Failure => "failure",
            GoalState::WaitingForApproval => "waiting_for_approval",
            GoalState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Goal, GoalSet, GoalRecord
// ---------------------------------------------------------------------------

/// A named unit of delivery work. The `context` string is the external
/// correlation key: persisted records and status events carry it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub name: String,
    /// Verb shown while the goal runs, e.g. "reviewing".
    pub working_description: String,
    /// Verb shown once the goal completes, e.g. "reviewed".
    pub completed_description: String,
    pub context: String,
    /// Chat intent that re-triggers this goal, if any.
    pub retry_intent: Option<String>,
}

impl Goal {
    pub fn new(
        name: impl Into<String>,
        working_description: impl Into<String>,
        completed_description: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            working_description: working_description.into(),
            completed_description: completed_description.into(),
            context: context.into(),
            retry_intent: None,
        }
    }

    pub fn with_retry_intent(mut self, intent: impl Into<String>) -> Self {
        self.retry_intent = Some(intent.into());
        self
    }
}

/// A labeled group of goals computed together for one push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalSet {
    pub name: String,
    pub goals: Vec<Goal>,
}

impl GoalSet {
    pub fn new(name: impl Into<String>, goals: Vec<Goal>) -> Self {
        Self {
            name: name.into(),
            goals,
        }
    }
}

/// One persisted state transition of one goal applied to one commit.
///
/// The store is append-only per goal instance: "current state" is the most
/// recent record for a (goal name, context) pair, ordered by `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalRecord {
    pub id: uuid::Uuid,
    pub repo: RepoRef,
    pub goal_name: String,
    pub goal_context: String,
    pub goal_set: String,
    pub goal_set_id: uuid::Uuid,
    pub state: GoalState,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl GoalRecord {
    /// A fresh record for `goal` on `repo` in the given state, timestamped now.
    pub fn new(
        repo: RepoRef,
        goal: &Goal,
        goal_set: impl Into<String>,
        goal_set_id: uuid::Uuid,
        state: GoalState,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            repo,
            goal_name: goal.name.clone(),
            goal_context: goal.context.clone(),
            goal_set: goal_set.into(),
            goal_set_id,
            state,
            created_at: chrono::Utc::now(),
        }
    }

    /// A new record for the same goal instance in a different state.
    pub fn transitioned_to(&self, state: GoalState) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            state,
            created_at: chrono::Utc::now(),
            repo: self.repo.clone(),
            goal_name: self.goal_name.clone(),
            goal_context: self.goal_context.clone(),
            goal_set: self.goal_set.clone(),
            goal_set_id: self.goal_set_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Review model
// ---------------------------------------------------------------------------

/// Position of a review comment within the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: String,
    pub line: Option<u32>,
}

/// A command that can fix the flagged problem, offered alongside the comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixCommand {
    pub command: String,
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub category: String,
    pub detail: String,
    pub location: Option<SourceLocation>,
    pub fix: Option<FixCommand>,
}

/// The result of one reviewer over one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectReview {
    pub repo: RepoRef,
    pub comments: Vec<ReviewComment>,
}

/// An error captured from one reviewer. A domain outcome, not a fault: it
/// never aborts sibling reviewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerError {
    pub reviewer: String,
    pub message: String,
}

/// Consolidated result of a review fan-out: comments from all contributing
/// reviewers concatenated in registration order (not deduplicated, not
/// re-sorted), plus per-reviewer errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub comments: Vec<ReviewComment>,
    pub errors: Vec<ReviewerError>,
}

impl ReviewOutcome {
    /// True when no reviewer produced a comment and none failed.
    pub fn is_clean(&self) -> bool {
        self.comments.is_empty() && self.errors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ExecutionOutcome — result of executing a goal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub state: GoalState,
    pub notes: String,
    pub failure_reason: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(notes: impl Into<String>) -> Self {
        Self {
            state: GoalState::Success,
            notes: notes.into(),
            failure_reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            state: GoalState::Failure,
            notes: String::new(),
            failure_reason: Some(reason),
        }
    }

    /// Results or errors need a human look before delivery proceeds.
    pub fn needs_approval(notes: impl Into<String>) -> Self {
        Self {
            state: GoalState::WaitingForApproval,
            notes: notes.into(),
            failure_reason: None,
        }
    }

    /// A precondition guard decided the goal is not relevant to this push.
    pub fn skipped(notes: impl Into<String>) -> Self {
        Self {
            state: GoalState::Skipped,
            notes: notes.into(),
            failure_reason: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Commit status — the status-reporting payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusState {
    Error,
    Failure,
    Pending,
    Success,
}

/// A status keyed by commit sha, published to the status-reporting sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    pub state: StatusState,
    pub context: String,
    pub description: String,
    pub target_url: Option<String>,
}

impl CommitStatus {
    /// The status backend rejects a `target_url` that is not actually a URL.
    /// Fold a non-URL target into the description instead of dropping it.
    pub fn sanitized(mut self) -> Self {
        if let Some(url) = self.target_url.take() {
            if url.starts_with("http") {
                self.target_url = Some(url);
            } else {
                self.description = format!("{} at {}", self.description, url);
            }
        }
        self
    }
}
