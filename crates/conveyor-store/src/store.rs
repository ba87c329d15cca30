//! The append-only goal store and its in-memory and file-backed backends.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use conveyor_types::{ConveyorError, Goal, GoalRecord, RepoRef, Result};

/// Append-only persistence of goal state transitions, queryable by commit.
#[async_trait]
pub trait GoalStore: Send + Sync {
    /// Append one state record. Never overwrites prior records.
    async fn store_goal(&self, record: GoalRecord) -> Result<()>;

    /// All records for the given commit (owner, repo, sha, provider), in
    /// write order.
    async fn goals_for_commit(&self, repo: &RepoRef) -> Result<Vec<GoalRecord>>;
}

/// Does a persisted record belong to this static goal definition?
pub fn goal_corresponds_to_record(goal: &Goal, record: &GoalRecord) -> bool {
    goal.name == record.goal_name && goal.context == record.goal_context
}

/// Reduce append-only records to the current state of each goal instance:
/// the most recent record per (goal name, context), ordered by write time.
/// Output preserves the order in which goal instances first appeared.
pub fn current_goals(records: &[GoalRecord]) -> Vec<GoalRecord> {
    let mut latest: Vec<GoalRecord> = Vec::new();
    for record in records {
        match latest
            .iter_mut()
            .find(|r| r.goal_name == record.goal_name && r.goal_context == record.goal_context)
        {
            Some(existing) => {
                if record.created_at >= existing.created_at {
                    *existing = record.clone();
                }
            }
            None => latest.push(record.clone()),
        }
    }
    latest
}

// ---------------------------------------------------------------------------
// InMemoryGoalStore
// ---------------------------------------------------------------------------

/// Append-only store backed by a Vec. The core never caches store state, so
/// this is sufficient for tests and single-process use.
#[derive(Default)]
pub struct InMemoryGoalStore {
    records: tokio::sync::RwLock<Vec<GoalRecord>>,
}

impl InMemoryGoalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record ever written, in write order.
    pub async fn all_records(&self) -> Vec<GoalRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl GoalStore for InMemoryGoalStore {
    async fn store_goal(&self, record: GoalRecord) -> Result<()> {
        tracing::debug!(
            goal = %record.goal_name,
            state = %record.state,
            repo = %record.repo,
            "Storing goal record"
        );
        self.records.write().await.push(record);
        Ok(())
    }

    async fn goals_for_commit(&self, repo: &RepoRef) -> Result<Vec<GoalRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.repo.same_commit(repo))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// FileGoalStore
// ---------------------------------------------------------------------------

/// Append-only store backed by a JSON-lines file, one record per line.
pub struct FileGoalStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileGoalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Vec<GoalRecord>> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for line in data.lines().filter(|l| !l.trim().is_empty()) {
            let record: GoalRecord = serde_json::from_str(line)
                .map_err(|e| ConveyorError::Store(format!("corrupt record line: {e}")))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Every record in the file, in write order.
    pub async fn all_records(&self) -> Result<Vec<GoalRecord>> {
        self.read_all().await
    }
}

#[async_trait]
impl GoalStore for FileGoalStore {
    async fn store_goal(&self, record: GoalRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn goals_for_commit(&self, repo: &RepoRef) -> Result<Vec<GoalRecord>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| r.repo.same_commit(repo))
            .collect())
    }
}
