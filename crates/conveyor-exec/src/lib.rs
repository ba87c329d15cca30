//! Goal execution for the Conveyor delivery machine.
//!
//! Implements the fan-out/aggregate pattern: a goal's independently
//! registered actions (reviewers, code-reaction listeners) run concurrently
//! against one read-only project snapshot, each action's failure is captured
//! in isolation, and the results consolidate into one outcome. Dispatch from
//! commit-status events to executors goes through an explicit registry.

pub mod backoff;
pub mod dispatch;
pub mod notify;
pub mod project;
pub mod reactions;
pub mod registration;
pub mod review;
pub mod status;

pub use backoff::{retry_with_backoff, BackoffPolicy};
pub use dispatch::{run_goal, CommitStatusEvent, ExecutorRegistry, GoalExecutor};
pub use notify::{
    format_review_comments, format_reviewer_errors, notify_best_effort, NotificationSink,
    RecordingSink,
};
pub use project::{Credentials, InMemoryProjectLoader, Project, ProjectLoader};
pub use reactions::{
    execute_code_reactions, CodeReactionListener, ReactionError, ReactionRegistration,
};
pub use registration::{changed_files_of_type, ReviewerOptions, ReviewerRegistration, Reviewer};
pub use review::{execute_review, ReviewGoalExecutor};
pub use status::{publish_with_retry, StatusSink};
