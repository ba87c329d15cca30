//! Read-only project snapshots and the loader that produces them.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;

use conveyor_types::{ConveyorError, RepoRef, Result};

/// Explicit credentials threaded through every call that needs them. No
/// ambient token state anywhere in the core.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub token: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

/// An immutable snapshot of a checked-out project.
///
/// Actions in a fan-out share one snapshot and must not mutate it; a
/// registration that wants "only changed files" gets a derived, filtered
/// view rather than a mutated checkout. Cleanup of whatever backs the
/// snapshot happens when the value is dropped.
#[derive(Debug, Clone)]
pub struct Project {
    repo: RepoRef,
    files: BTreeMap<String, String>,
    changed_files: Vec<String>,
}

impl Project {
    pub fn new(repo: RepoRef, files: BTreeMap<String, String>) -> Self {
        Self {
            repo,
            files,
            changed_files: Vec::new(),
        }
    }

    pub fn with_changed_files(mut self, changed: Vec<String>) -> Self {
        self.changed_files = changed;
        self
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Paths changed since the push's `before` commit, as reported by the
    /// loader. Empty for a branch's first push.
    pub fn changed_files(&self) -> &[String] {
        &self.changed_files
    }

    /// A derived read-only view containing only the given paths.
    pub fn filtered_to(&self, paths: &[String]) -> Project {
        let files = self
            .files
            .iter()
            .filter(|(p, _)| paths.contains(p))
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect();
        let changed_files = self
            .changed_files
            .iter()
            .filter(|p| paths.contains(p))
            .cloned()
            .collect();
        Project {
            repo: self.repo.clone(),
            files,
            changed_files,
        }
    }

    /// The view restricted to files changed by the push.
    pub fn changed_view(&self) -> Project {
        self.filtered_to(&self.changed_files.clone())
    }
}

/// Yields a read-only project snapshot for a commit. The `since` sha, when
/// present, lets the loader report which files changed in the push.
#[async_trait]
pub trait ProjectLoader: Send + Sync {
    async fn load(
        &self,
        credentials: &Credentials,
        repo: &RepoRef,
        since: Option<&str>,
    ) -> Result<Project>;
}

/// Loader over pre-registered snapshots, keyed by sha.
#[derive(Default)]
pub struct InMemoryProjectLoader {
    projects: HashMap<String, Project>,
}

impl InMemoryProjectLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: Project) -> Self {
        self.projects.insert(project.repo.sha.clone(), project);
        self
    }
}

#[async_trait]
impl ProjectLoader for InMemoryProjectLoader {
    async fn load(
        &self,
        _credentials: &Credentials,
        repo: &RepoRef,
        _since: Option<&str>,
    ) -> Result<Project> {
        self.projects
            .get(&repo.sha)
            .cloned()
            .ok_or_else(|| ConveyorError::RepoNotFound {
                owner: repo.owner.clone(),
                repo: repo.repo.clone(),
            })
    }
}
