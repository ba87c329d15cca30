//! Builders: ordered command pipelines over a fresh checkout per build.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use conveyor_exec::{CommitStatusEvent, Credentials, GoalExecutor, Project, ProjectLoader};
use conveyor_types::{well_known, ExecutionOutcome, Goal, Push, RepoRef, Result};

use crate::progress_log::InMemoryProgressLog;
use crate::spawn::{failure_on_nonzero, spawn_and_watch, ErrorFinder, SpawnCommand};

const DEFAULT_STEP_TIMEOUT_MS: u64 = 600_000;

/// Identity of the thing being built, derived from the project contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone)]
pub enum BuildStatus {
    Succeeded,
    /// The pipeline stopped at `command`; later steps never ran.
    Failed { command: String, message: String },
}

/// The result of one build: status, full log, and what the post-steps
/// located in the finished working directory.
#[derive(Debug, Clone)]
pub struct BuildHandle {
    pub repo: RepoRef,
    pub status: BuildStatus,
    pub log: String,
    pub app_info: Option<AppInfo>,
    pub deployment_unit: Option<PathBuf>,
}

impl BuildHandle {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, BuildStatus::Succeeded)
    }
}

#[async_trait]
pub trait Builder: Send + Sync {
    fn name(&self) -> &str;

    async fn initiate_build(
        &self,
        credentials: &Credentials,
        repo: &RepoRef,
        push: &Push,
    ) -> Result<BuildHandle>;
}

type AppInfoFn = Arc<dyn Fn(&Project) -> Option<AppInfo> + Send + Sync>;
type DeploymentUnitFn = Arc<dyn Fn(&Path) -> Option<PathBuf> + Send + Sync>;

/// Runs an ordered list of external commands in a fresh working directory
/// materialized from the project snapshot.
///
/// The first step always runs; step i+1 runs only if step i reported no
/// error. Each build gets its own directory under `workspace_root`, so
/// builds of unrelated commits can proceed concurrently without sharing
/// state.
pub struct SpawnBuilder {
    name: String,
    loader: Arc<dyn ProjectLoader>,
    workspace_root: PathBuf,
    commands: Vec<SpawnCommand>,
    error_finder: ErrorFinder,
    step_timeout_ms: u64,
    app_info_for: Option<AppInfoFn>,
    deployment_unit_for: Option<DeploymentUnitFn>,
}

impl SpawnBuilder {
    pub fn new(
        name: impl Into<String>,
        loader: Arc<dyn ProjectLoader>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            loader,
            workspace_root: workspace_root.into(),
            commands: Vec::new(),
            error_finder: failure_on_nonzero(),
            step_timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            app_info_for: None,
            deployment_unit_for: None,
        }
    }

    pub fn step(mut self, command: SpawnCommand) -> Self {
        self.commands.push(command);
        self
    }

    pub fn error_finder(mut self, finder: ErrorFinder) -> Self {
        self.error_finder = finder;
        self
    }

    pub fn step_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.step_timeout_ms = timeout_ms;
        self
    }

    pub fn app_info_for(mut self, f: AppInfoFn) -> Self {
        self.app_info_for = Some(f);
        self
    }

    pub fn deployment_unit_for(mut self, f: DeploymentUnitFn) -> Self {
        self.deployment_unit_for = Some(f);
        self
    }

    async fn materialize(&self, project: &Project, dir: &Path) -> Result<()> {
        for path in project.paths() {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if let Some(content) = project.file(path) {
                tokio::fs::write(&target, content).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Builder for SpawnBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initiate_build(
        &self,
        credentials: &Credentials,
        repo: &RepoRef,
        push: &Push,
    ) -> Result<BuildHandle> {
        let project = self
            .loader
            .load(credentials, repo, push.before.as_deref())
            .await?;
        let app_info = self.app_info_for.as_ref().and_then(|f| f(&project));

        let build_dir = self.workspace_root.join(format!(
            "{}-{}-{}-{}",
            repo.owner,
            repo.repo,
            repo.short_sha(),
            uuid::Uuid::new_v4().simple()
        ));
        tokio::fs::create_dir_all(&build_dir).await?;
        self.materialize(&project, &build_dir).await?;

        let log = Arc::new(InMemoryProgressLog::new());
        let mut status = BuildStatus::Succeeded;
        for command in &self.commands {
            tracing::info!(builder = %self.name, command = %command, "Running build step");
            let result = spawn_and_watch(
                command,
                &build_dir,
                Arc::clone(&log) as Arc<dyn crate::progress_log::ProgressLog>,
                self.step_timeout_ms,
            )
            .await?;

            if result.timed_out {
                status = BuildStatus::Failed {
                    command: command.to_string(),
                    message: format!("timed out after {}ms", self.step_timeout_ms),
                };
                break;
            }
            if (self.error_finder)(result.exit_code, &result.output) {
                let message = if result.exit_code == 0 {
                    "error pattern matched in output".to_string()
                } else {
                    format!("exited with code {}", result.exit_code)
                };
                status = BuildStatus::Failed {
                    command: command.to_string(),
                    message,
                };
                break;
            }
        }
        if let BuildStatus::Failed { command, message } = &status {
            tracing::warn!(builder = %self.name, command = %command, message = %message, "Build step failed, skipping remainder");
        }

        // Post-step runs on success and failure alike; a partial build may
        // still leave a usable artifact behind.
        let deployment_unit = self
            .deployment_unit_for
            .as_ref()
            .and_then(|f| f(&build_dir));

        Ok(BuildHandle {
            repo: repo.clone(),
            status,
            log: log.text(),
            app_info,
            deployment_unit,
        })
    }
}

/// The build goal, wired into the dispatch registry.
pub struct BuildGoalExecutor {
    goal: Goal,
    builder: Arc<dyn Builder>,
}

impl BuildGoalExecutor {
    pub fn new(builder: Arc<dyn Builder>) -> Self {
        Self {
            goal: well_known::build_goal(),
            builder,
        }
    }
}

#[async_trait]
impl GoalExecutor for BuildGoalExecutor {
    fn goal(&self) -> &Goal {
        &self.goal
    }

    async fn execute(
        &self,
        event: &CommitStatusEvent,
        credentials: &Credentials,
    ) -> Result<ExecutionOutcome> {
        let handle = self
            .builder
            .initiate_build(credentials, &event.repo, &event.push)
            .await?;
        Ok(match handle.status {
            BuildStatus::Succeeded => {
                ExecutionOutcome::success(format!("Build succeeded ({})", self.builder.name()))
            }
            BuildStatus::Failed { command, message } => {
                ExecutionOutcome::failure(format!("Build failed at `{command}`: {message}"))
            }
        })
    }
}
