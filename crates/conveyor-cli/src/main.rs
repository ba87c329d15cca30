//! CLI binary for planning, inspecting, and retrying delivery goals.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use conveyor_rules::{push_test, veto_when, when_push_satisfies, PushMapping, PushRules};
use conveyor_store::{
    current_goals, plan_goals, trigger_goal, BranchTip, FileGoalStore, GoalStore, RepoBranchTips,
    RetryGoalRequest, RetryOutcome, StaticMetadataSource,
};
use conveyor_types::{well_known, Goal, GoalRecord, GoalSet, Push, RepoRef};

#[derive(Parser)]
#[command(name = "convey", version, about = "Push-triggered delivery goal orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the goal store file
    #[arg(long, global = true, default_value = ".conveyor/goals.jsonl")]
    store: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan goals for a push described by a JSON file
    Plan {
        /// Path to the push event JSON
        push: PathBuf,
    },

    /// List current goals for a commit
    Goals {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        repo: String,

        #[arg(long)]
        sha: String,

        /// Source-control provider id
        #[arg(long, default_value = "github")]
        provider: String,
    },

    /// Re-request a goal on a commit
    Retry {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        repo: String,

        /// Goal name: review, autofix, build, deploy, or verify
        #[arg(long)]
        goal: String,

        /// Commit to retry on (default: tip of the branch)
        #[arg(long)]
        sha: Option<String>,

        /// Branch whose tip to retry on (default: the default branch)
        #[arg(long)]
        branch: Option<String>,

        /// Goal set to file the retried goal under, when it was never planned
        #[arg(long)]
        goal_set: Option<String>,

        #[arg(long, default_value = "github")]
        provider: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Plan { push } => {
            cmd_plan(&push, &cli.store).await?;
        }
        Commands::Goals {
            owner,
            repo,
            sha,
            provider,
        } => {
            cmd_goals(&owner, &repo, &sha, &provider, &cli.store).await?;
        }
        Commands::Retry {
            owner,
            repo,
            goal,
            sha,
            branch,
            goal_set,
            provider,
        } => {
            cmd_retry(
                &owner, &repo, &goal, sha, branch, goal_set, &provider, &cli.store,
            )
            .await?;
        }
    }

    Ok(())
}

/// The stock rule set: nothing on wip/ branches, the full deploy set on the
/// default branch, a plain build set everywhere else.
fn default_rules() -> PushRules<GoalSet> {
    let on_main = Arc::new(push_test("on-default-branch", |p: Push| async move {
        Ok(p.branch() == "main" || p.branch() == "master")
    }));
    let on_wip = Arc::new(push_test("on-wip-branch", |p: Push| async move {
        Ok(p.branch().starts_with("wip/"))
    }));

    let deploy: Arc<dyn PushMapping<GoalSet>> = Arc::new(
        when_push_satisfies(vec![on_main])
            .it_means("deploy from the default branch")
            .set(well_known::deploy_goal_set()),
    );
    let build: Arc<dyn PushMapping<GoalSet>> = Arc::new(
        when_push_satisfies(vec![])
            .it_means("build everything else")
            .set(well_known::build_goal_set()),
    );
    PushRules::new(
        "delivery",
        vec![veto_when("never on wip branches", vec![on_wip]), deploy, build],
    )
}

fn goal_by_name(name: &str) -> Option<Goal> {
    match name {
        "review" => Some(well_known::review_goal()),
        "autofix" => Some(well_known::autofix_goal()),
        "build" => Some(well_known::build_goal()),
        "deploy" => Some(well_known::staging_deploy_goal()),
        "verify" => Some(well_known::staging_verify_goal()),
        _ => None,
    }
}

async fn cmd_plan(push_path: &std::path::Path, store_path: &std::path::Path) -> anyhow::Result<()> {
    let source = tokio::fs::read_to_string(push_path).await?;
    let push: Push = serde_json::from_str(&source)?;
    let store = FileGoalStore::new(store_path);

    match plan_goals(&default_rules(), &push, &store).await? {
        Some(plan) => {
            println!(
                "Planned goal set '{}' for {} ({} goals):",
                plan.goal_set.name,
                push.repo,
                plan.records.len()
            );
            for record in &plan.records {
                println!("  {} [{}] {}", record.goal_name, record.state, record.goal_context);
            }
        }
        None => {
            println!("No goal set applies to this push");
        }
    }
    Ok(())
}

async fn cmd_goals(
    owner: &str,
    repo: &str,
    sha: &str,
    provider: &str,
    store_path: &std::path::Path,
) -> anyhow::Result<()> {
    let store = FileGoalStore::new(store_path);
    let target = RepoRef::new(owner, repo, provider, "", sha);
    let records = store.goals_for_commit(&target).await?;

    if records.is_empty() {
        println!("No goals recorded for {owner}/{repo}@{sha}");
        return Ok(());
    }

    let current = current_goals(&records);
    println!("Goals for {owner}/{repo}@{sha}:");
    for record in &current {
        println!(
            "  {:<12} {:<22} set={} at {}",
            record.state.to_string(),
            record.goal_name,
            record.goal_set,
            record.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Branch tips reconstructed from the store's own records: for each branch,
/// the sha of the most recently written record. Serves as the repository
/// metadata source when no hosting API is wired up.
fn tips_from_records(records: &[GoalRecord]) -> RepoBranchTips {
    let mut latest: HashMap<String, &GoalRecord> = HashMap::new();
    for record in records {
        if record.repo.branch.is_empty() {
            continue;
        }
        let entry = latest.entry(record.repo.branch.clone()).or_insert(record);
        if record.created_at > entry.created_at {
            *entry = record;
        }
    }
    let mut branches: Vec<BranchTip> = latest
        .into_iter()
        .map(|(name, record)| BranchTip {
            name,
            sha: record.repo.sha.clone(),
        })
        .collect();
    branches.sort_by(|a, b| a.name.cmp(&b.name));

    let default_branch = branches
        .iter()
        .find(|b| b.name == "main" || b.name == "master")
        .or_else(|| branches.first())
        .map(|b| b.name.clone())
        .unwrap_or_else(|| "main".to_string());

    RepoBranchTips {
        default_branch,
        branches,
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_retry(
    owner: &str,
    repo: &str,
    goal_name: &str,
    sha: Option<String>,
    branch: Option<String>,
    goal_set: Option<String>,
    provider: &str,
    store_path: &std::path::Path,
) -> anyhow::Result<()> {
    let goal = goal_by_name(goal_name).ok_or_else(|| {
        anyhow::anyhow!("Unknown goal '{goal_name}'; expected review, autofix, build, deploy, or verify")
    })?;

    let store = FileGoalStore::new(store_path);
    let known: Vec<GoalRecord> = store
        .all_records()
        .await?
        .into_iter()
        .filter(|r| r.repo.owner == owner && r.repo.repo == repo)
        .collect();
    if known.is_empty() {
        anyhow::bail!("No recorded pushes for {owner}/{repo}; nothing to resolve a commit from");
    }
    let metadata = StaticMetadataSource::new().with_repo(owner, repo, tips_from_records(&known));

    let request = RetryGoalRequest {
        owner: owner.to_string(),
        repo: repo.to_string(),
        provider_id: provider.to_string(),
        sha,
        branch,
        goal_set,
    };

    match trigger_goal(&request, &goal, &metadata, &store).await? {
        RetryOutcome::Requested { sha, goal_set } => {
            println!("Re-requested '{}' on {owner}/{repo}@{sha} (goal set '{goal_set}')", goal.name);
        }
        RetryOutcome::NoMatchingGoal { message } => {
            println!("{message}");
        }
    }
    Ok(())
}
