//! End-to-end tests for the delivery flow: plan goals for a push, dispatch
//! a pending status event to an executor, verify the persisted lifecycle,
//! then retry a goal and run it again.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use conveyor_exec::{
    run_goal, BackoffPolicy, CommitStatusEvent, Credentials, ExecutorRegistry,
    InMemoryProjectLoader, Project, ProjectLoader, RecordingSink, Reviewer, ReviewGoalExecutor,
    ReviewerRegistration, StatusSink,
};
use conveyor_rules::{push_test, veto_when, when_push_satisfies, PushMapping, PushRules};
use conveyor_store::{
    current_goals, plan_goals, trigger_goal, BranchTip, GoalStore, InMemoryGoalStore,
    RepoBranchTips, RetryGoalRequest, RetryOutcome, StaticMetadataSource,
};
use conveyor_types::{
    well_known, CommitStatus, GoalSet, GoalState, ProjectReview, Push, RepoRef, Result,
    ReviewComment, StatusState,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn repo_at(branch: &str, sha: &str) -> RepoRef {
    RepoRef::new("octo", "widgets", "gh", branch, sha)
}

fn push_to(branch: &str, sha: &str) -> Push {
    Push {
        repo: repo_at(branch, sha),
        before: None,
        after: sha.into(),
        commits: vec![],
        timestamp: chrono::Utc::now(),
    }
}

/// Main gets the full deploy set, everything else builds, forks are vetoed.
fn goal_rules() -> PushRules<GoalSet> {
    let on_main = Arc::new(push_test("on-main", |p: Push| async move {
        Ok(p.branch() == "main")
    }));
    let from_fork = Arc::new(push_test("from-fork", |p: Push| async move {
        Ok(p.repo.owner != "octo")
    }));

    let deploy: Arc<dyn PushMapping<GoalSet>> = Arc::new(
        when_push_satisfies(vec![on_main])
            .it_means("deploy on main")
            .set(well_known::deploy_goal_set()),
    );
    let build: Arc<dyn PushMapping<GoalSet>> = Arc::new(
        when_push_satisfies(vec![])
            .it_means("build everything else")
            .set(well_known::build_goal_set()),
    );
    PushRules::new(
        "delivery",
        vec![veto_when("never on forks", vec![from_fork]), deploy, build],
    )
}

fn loader_for(repo: &RepoRef) -> Arc<InMemoryProjectLoader> {
    let mut files = BTreeMap::new();
    files.insert("src/main.rs".to_string(), "fn main() {}".to_string());
    let project =
        Project::new(repo.clone(), files).with_changed_files(vec!["src/main.rs".to_string()]);
    Arc::new(InMemoryProjectLoader::new().with_project(project))
}

struct CommentingReviewer;

#[async_trait]
impl Reviewer for CommentingReviewer {
    async fn review(&self, project: &Project) -> Result<ProjectReview> {
        Ok(ProjectReview {
            repo: project.repo().clone(),
            comments: vec![ReviewComment {
                category: "style".into(),
                detail: "needs a docstring".into(),
                location: None,
                fix: None,
            }],
        })
    }
}

struct QuietReviewer;

#[async_trait]
impl Reviewer for QuietReviewer {
    async fn review(&self, project: &Project) -> Result<ProjectReview> {
        Ok(ProjectReview {
            repo: project.repo().clone(),
            comments: vec![],
        })
    }
}

#[derive(Default)]
struct NullStatusSink {
    count: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl StatusSink for NullStatusSink {
    async fn publish(&self, _repo: &RepoRef, _status: &CommitStatus) -> Result<()> {
        self.count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

fn pending_event(push: &Push, context: &str) -> CommitStatusEvent {
    CommitStatusEvent {
        repo: push.repo.clone(),
        context: context.into(),
        state: StatusState::Pending,
        description: "requested".into(),
        push: push.clone(),
    }
}

fn review_registry(
    loader: Arc<dyn ProjectLoader>,
    reviewer: Arc<dyn Reviewer>,
    notifications: Arc<RecordingSink>,
) -> ExecutorRegistry {
    ExecutorRegistry::new().register(Arc::new(ReviewGoalExecutor::new(
        loader,
        vec![ReviewerRegistration::new("style", reviewer)],
        notifications,
        "#delivery",
    )))
}

// ---------------------------------------------------------------------------
// Test 1: push on main plans the deploy goal set
// ---------------------------------------------------------------------------

#[tokio::test]
async fn push_on_main_plans_the_deploy_goal_set() {
    let store = InMemoryGoalStore::new();
    let push = push_to("main", "abc1234");

    let plan = plan_goals(&goal_rules(), &push, &store)
        .await
        .unwrap()
        .expect("main should resolve to a goal set");

    assert_eq!(plan.goal_set.name, "deploy");
    assert_eq!(plan.records.len(), 5);
    assert!(plan.records.iter().all(|r| r.state == GoalState::Requested));
    assert!(plan
        .records
        .iter()
        .all(|r| r.goal_set_id == plan.goal_set_id));

    let persisted = store.goals_for_commit(&push.repo).await.unwrap();
    assert_eq!(persisted.len(), 5);
}

#[tokio::test]
async fn push_from_a_fork_is_vetoed() {
    let store = InMemoryGoalStore::new();
    let mut push = push_to("main", "abc1234");
    push.repo = RepoRef::new("stranger", "widgets", "gh", "main", "abc1234");

    let plan = plan_goals(&goal_rules(), &push, &store).await.unwrap();
    assert!(plan.is_none());
    assert!(store.goals_for_commit(&push.repo).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test 2: full lifecycle of the review goal through dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn review_goal_runs_through_its_full_lifecycle() {
    let store = InMemoryGoalStore::new();
    let push = push_to("feature", "def5678");
    plan_goals(&goal_rules(), &push, &store)
        .await
        .unwrap()
        .expect("feature branch should get the build set");

    let notifications = Arc::new(RecordingSink::new());
    let registry = review_registry(
        loader_for(&push.repo),
        Arc::new(CommentingReviewer),
        notifications.clone(),
    );
    let statuses = NullStatusSink::default();
    let review_context = &well_known::review_goal().context;

    let outcome = run_goal(
        &registry,
        &store,
        &statuses,
        &pending_event(&push, review_context),
        &Credentials::new("t0ken"),
        &BackoffPolicy::None,
    )
    .await
    .unwrap()
    .expect("event should be actionable");

    // A comment means a human gate, not a hard failure.
    assert_eq!(outcome.state, GoalState::WaitingForApproval);

    let records = store.goals_for_commit(&push.repo).await.unwrap();
    let review_states: Vec<GoalState> = records
        .iter()
        .filter(|r| r.goal_context == *review_context)
        .map(|r| r.state)
        .collect();
    assert_eq!(
        review_states,
        vec![
            GoalState::Requested,
            GoalState::InProcess,
            GoalState::WaitingForApproval
        ]
    );

    // Current-state reads collapse history to the latest write per goal.
    let current = current_goals(&records);
    let review_now = current
        .iter()
        .find(|r| r.goal_context == *review_context)
        .unwrap();
    assert_eq!(review_now.state, GoalState::WaitingForApproval);

    // Pending plus terminal status, and one consolidated comment message.
    assert_eq!(statuses.count.load(std::sync::atomic::Ordering::SeqCst), 2);
    let messages = notifications.messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].1.contains("needs a docstring"));
}

#[tokio::test]
async fn clean_review_leaves_success_and_no_messages() {
    let store = InMemoryGoalStore::new();
    let push = push_to("feature", "def5678");
    plan_goals(&goal_rules(), &push, &store).await.unwrap();

    let notifications = Arc::new(RecordingSink::new());
    let registry = review_registry(
        loader_for(&push.repo),
        Arc::new(QuietReviewer),
        notifications.clone(),
    );
    let statuses = NullStatusSink::default();

    let outcome = run_goal(
        &registry,
        &store,
        &statuses,
        &pending_event(&push, &well_known::review_goal().context),
        &Credentials::new("t0ken"),
        &BackoffPolicy::None,
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(outcome.state, GoalState::Success);
    assert!(notifications.messages().await.is_empty());
}

// ---------------------------------------------------------------------------
// Test 3: retry re-enters the store and the goal runs again
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retried_goal_is_re_requested_and_runs_again() {
    let store = InMemoryGoalStore::new();
    let push = push_to("main", "abc1234");
    plan_goals(&goal_rules(), &push, &store).await.unwrap();

    // First run fails for lack of a reviewer identity... simulate by writing
    // the failure directly, as an executor would.
    let review = well_known::review_goal();
    let records = store.goals_for_commit(&push.repo).await.unwrap();
    let requested = records
        .iter()
        .find(|r| r.goal_context == review.context)
        .unwrap()
        .clone();
    store
        .store_goal(requested.transitioned_to(GoalState::InProcess))
        .await
        .unwrap();
    store
        .store_goal(requested.transitioned_to(GoalState::Failure))
        .await
        .unwrap();

    // Operator retries by branch tip; no explicit sha or goal set.
    let metadata = StaticMetadataSource::new().with_repo(
        "octo",
        "widgets",
        RepoBranchTips {
            default_branch: "main".into(),
            branches: vec![BranchTip {
                name: "main".into(),
                sha: "abc1234".into(),
            }],
        },
    );
    let outcome = trigger_goal(
        &RetryGoalRequest {
            owner: "octo".into(),
            repo: "widgets".into(),
            provider_id: "gh".into(),
            sha: None,
            branch: None,
            goal_set: None,
        },
        &review,
        &metadata,
        &store,
    )
    .await
    .unwrap();

    match outcome {
        RetryOutcome::Requested { sha, goal_set } => {
            assert_eq!(sha, "abc1234");
            assert_eq!(goal_set, "deploy");
        }
        RetryOutcome::NoMatchingGoal { message } => panic!("unexpected: {message}"),
    }

    // The retried goal is current again and dispatch picks it up.
    let notifications = Arc::new(RecordingSink::new());
    let registry = review_registry(
        loader_for(&push.repo),
        Arc::new(QuietReviewer),
        notifications,
    );
    let statuses = NullStatusSink::default();
    let outcome = run_goal(
        &registry,
        &store,
        &statuses,
        &pending_event(&push, &review.context),
        &Credentials::new("t0ken"),
        &BackoffPolicy::None,
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(outcome.state, GoalState::Success);

    // History is append-only: the original failure is still on record.
    let records = store.goals_for_commit(&push.repo).await.unwrap();
    assert!(records
        .iter()
        .any(|r| r.goal_context == review.context && r.state == GoalState::Failure));
}

#[tokio::test]
async fn retrying_an_unplanned_goal_is_a_user_facing_message() {
    let store = InMemoryGoalStore::new();
    let metadata = StaticMetadataSource::new().with_repo(
        "octo",
        "widgets",
        RepoBranchTips {
            default_branch: "main".into(),
            branches: vec![BranchTip {
                name: "main".into(),
                sha: "abc1234".into(),
            }],
        },
    );

    let outcome = trigger_goal(
        &RetryGoalRequest {
            owner: "octo".into(),
            repo: "widgets".into(),
            provider_id: "gh".into(),
            sha: None,
            branch: None,
            goal_set: None,
        },
        &well_known::build_goal(),
        &metadata,
        &store,
    )
    .await
    .unwrap();

    assert!(matches!(outcome, RetryOutcome::NoMatchingGoal { .. }));
    // Nothing written.
    assert!(store
        .goals_for_commit(&repo_at("main", "abc1234"))
        .await
        .unwrap()
        .is_empty());
}
