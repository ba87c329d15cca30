//! Repository metadata: default branch and per-branch tips.

use std::collections::HashMap;

use async_trait::async_trait;

use conveyor_types::{ConveyorError, Result};

#[derive(Debug, Clone)]
pub struct BranchTip {
    pub name: String,
    pub sha: String,
}

#[derive(Debug, Clone)]
pub struct RepoBranchTips {
    pub default_branch: String,
    pub branches: Vec<BranchTip>,
}

impl RepoBranchTips {
    pub fn tip_of(&self, branch: &str) -> Option<&str> {
        self.branches
            .iter()
            .find(|b| b.name == branch)
            .map(|b| b.sha.as_str())
    }
}

/// External source of repository metadata. Fails with a `NotFound` error when
/// the repository is unknown to the given provider.
#[async_trait]
pub trait RepoMetadataSource: Send + Sync {
    async fn branch_tips(
        &self,
        owner: &str,
        repo: &str,
        provider_id: &str,
    ) -> Result<RepoBranchTips>;
}

/// Fixed metadata for tests and local runs.
#[derive(Default)]
pub struct StaticMetadataSource {
    repos: HashMap<(String, String), RepoBranchTips>,
}

impl StaticMetadataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(
        mut self,
        owner: impl Into<String>,
        repo: impl Into<String>,
        tips: RepoBranchTips,
    ) -> Self {
        self.repos.insert((owner.into(), repo.into()), tips);
        self
    }
}

#[async_trait]
impl RepoMetadataSource for StaticMetadataSource {
    async fn branch_tips(
        &self,
        owner: &str,
        repo: &str,
        _provider_id: &str,
    ) -> Result<RepoBranchTips> {
        self.repos
            .get(&(owner.to_string(), repo.to_string()))
            .cloned()
            .ok_or_else(|| ConveyorError::RepoNotFound {
                owner: owner.to_string(),
                repo: repo.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tips() -> RepoBranchTips {
        RepoBranchTips {
            default_branch: "main".into(),
            branches: vec![
                BranchTip {
                    name: "main".into(),
                    sha: "aaa111".into(),
                },
                BranchTip {
                    name: "release".into(),
                    sha: "bbb222".into(),
                },
            ],
        }
    }

    #[test]
    fn tip_of_known_and_unknown_branch() {
        let t = tips();
        assert_eq!(t.tip_of("release"), Some("bbb222"));
        assert_eq!(t.tip_of("gone"), None);
    }

    #[tokio::test]
    async fn static_source_returns_registered_repo() {
        let source = StaticMetadataSource::new().with_repo("octo", "widgets", tips());
        let t = source.branch_tips("octo", "widgets", "gh").await.unwrap();
        assert_eq!(t.default_branch, "main");
    }

    #[tokio::test]
    async fn static_source_unknown_repo_is_not_found() {
        let source = StaticMetadataSource::new();
        let err = source.branch_tips("octo", "widgets", "gh").await.unwrap_err();
        assert!(matches!(err, ConveyorError::RepoNotFound { .. }));
    }
}
