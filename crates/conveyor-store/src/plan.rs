//! Push-time goal planning: consult the rule set, write requested goals.

use conveyor_rules::PushRules;
use conveyor_types::{GoalRecord, GoalSet, GoalState, Push, Result};

use crate::store::GoalStore;

/// The outcome of planning one push: the resolved goal set and the records
/// written for it.
#[derive(Debug, Clone)]
pub struct GoalSetPlan {
    pub goal_set: GoalSet,
    pub goal_set_id: uuid::Uuid,
    pub records: Vec<GoalRecord>,
}

/// Determine which goals apply to `push` and write each as `requested`.
///
/// Returns `None` when the rules abstain (or veto) — nothing is written in
/// that case. A failing rule propagates; goal determination for the push
/// aborts visibly rather than writing a partial set.
pub async fn plan_goals(
    rules: &PushRules<GoalSet>,
    push: &Push,
    store: &dyn GoalStore,
) -> Result<Option<GoalSetPlan>> {
    let Some(goal_set) = rules.resolve(push).await? else {
        tracing::info!(push = %push.repo, "No goal set applies to this push");
        return Ok(None);
    };

    let goal_set_id = uuid::Uuid::new_v4();
    tracing::info!(
        push = %push.repo,
        goal_set = %goal_set.name,
        goals = goal_set.goals.len(),
        "Requesting goals for push"
    );

    let mut records = Vec::with_capacity(goal_set.goals.len());
    for goal in &goal_set.goals {
        let record = GoalRecord::new(
            push.repo.clone(),
            goal,
            &goal_set.name,
            goal_set_id,
            GoalState::Requested,
        );
        store.store_goal(record.clone()).await?;
        records.push(record);
    }

    Ok(Some(GoalSetPlan {
        goal_set,
        goal_set_id,
        records,
    }))
}
