//! The stock delivery goals and goal sets.
//!
//! Context strings carry a phase prefix so that statuses sort in delivery
//! order when listed by the hosting provider.

use crate::{Goal, GoalSet};

pub fn review_goal() -> Goal {
    Goal::new(
        "review",
        "reviewing",
        "reviewed",
        "delivery/0-code/0-review",
    )
    .with_retry_intent("trigger review")
}

pub fn autofix_goal() -> Goal {
    Goal::new(
        "autofix",
        "applying autofixes",
        "applied autofixes",
        "delivery/0-code/1-autofix",
    )
}

pub fn build_goal() -> Goal {
    Goal::new("build", "building", "built", "delivery/1-build/0-build")
        .with_retry_intent("trigger build")
}

pub fn staging_deploy_goal() -> Goal {
    Goal::new(
        "deploy to staging",
        "deploying to staging",
        "deployed to staging",
        "delivery/2-deploy/0-staging",
    )
    .with_retry_intent("trigger deploy")
}

pub fn staging_verify_goal() -> Goal {
    Goal::new(
        "verify staging",
        "verifying staging endpoint",
        "verified staging endpoint",
        "delivery/2-deploy/1-verify",
    )
}

/// Review, autofix, and build, for pushes we can build but not deploy.
pub fn build_goal_set() -> GoalSet {
    GoalSet::new(
        "build",
        vec![review_goal(), autofix_goal(), build_goal()],
    )
}

/// The full path through staging deployment and verification.
pub fn deploy_goal_set() -> GoalSet {
    GoalSet::new(
        "deploy",
        vec![
            review_goal(),
            autofix_goal(),
            build_goal(),
            staging_deploy_goal(),
            staging_verify_goal(),
        ],
    )
}
