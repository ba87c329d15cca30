//! Action registrations: reviewers and their relevance guards.

use std::sync::Arc;

use async_trait::async_trait;
use globset::{Glob, GlobSetBuilder};

use conveyor_rules::{on_any_push, PushTest};
use conveyor_types::{ConveyorError, ProjectReview, Push, Result};

use crate::project::Project;

/// One static-analysis action over a project snapshot.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, project: &Project) -> Result<ProjectReview>;
}

#[derive(Debug, Clone, Default)]
pub struct ReviewerOptions {
    /// Hand the reviewer the changed-files view instead of the full snapshot.
    pub review_only_changed_files: bool,
}

/// An independently registered reviewer with its relevance guard.
pub struct ReviewerRegistration {
    pub name: String,
    pub relevance: Arc<dyn PushTest>,
    pub options: ReviewerOptions,
    pub reviewer: Arc<dyn Reviewer>,
}

impl ReviewerRegistration {
    pub fn new(name: impl Into<String>, reviewer: Arc<dyn Reviewer>) -> Self {
        Self {
            name: name.into(),
            relevance: on_any_push(),
            options: ReviewerOptions::default(),
            reviewer,
        }
    }

    pub fn with_relevance(mut self, relevance: Arc<dyn PushTest>) -> Self {
        self.relevance = relevance;
        self
    }

    pub fn review_only_changed_files(mut self) -> Self {
        self.options.review_only_changed_files = true;
        self
    }

    /// Whether this reviewer applies to the push. Guard errors propagate.
    pub async fn is_relevant(&self, push: &Push) -> Result<bool> {
        self.relevance.test(push).await
    }
}

/// Changed files of the snapshot matching a glob, e.g. `"**/*.rs"`.
pub fn changed_files_of_type(project: &Project, pattern: &str) -> Result<Vec<String>> {
    let glob = Glob::new(pattern).map_err(|e| ConveyorError::Other(e.to_string()))?;
    let mut builder = GlobSetBuilder::new();
    builder.add(glob);
    let set = builder
        .build()
        .map_err(|e| ConveyorError::Other(e.to_string()))?;
    Ok(project
        .changed_files()
        .iter()
        .filter(|p| set.is_match(p.as_str()))
        .cloned()
        .collect())
}
