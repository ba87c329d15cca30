//! Goal persistence and the commands that drive it.
//!
//! The store is append-only: a goal instance's state never mutates in place,
//! each transition is a new record and "current state" is the latest write.
//! This crate owns the push-time goal planning path and the operator retry
//! command, both of which funnel through the same [`GoalStore`] write path.

pub mod metadata;
pub mod plan;
pub mod retry;
pub mod store;

pub use metadata::{BranchTip, RepoBranchTips, RepoMetadataSource, StaticMetadataSource};
pub use plan::{plan_goals, GoalSetPlan};
pub use retry::{trigger_goal, RetryGoalRequest, RetryOutcome};
pub use store::{
    current_goals, goal_corresponds_to_record, FileGoalStore, GoalStore, InMemoryGoalStore,
};
