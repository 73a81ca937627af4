use std::sync::Arc;

use anyhow::{Context, Result};
use charles_github_issues::charles_yml::{CharlesYml, CHARLES_YML_PATH};
use charles_github_issues::github_types::GithubRepository;
use charles_github_issues::mention::RepoRef;
use tokio::sync::OnceCell;

use super::bot_services::GithubApi;

const GH_PAGES_BRANCH: &str = "gh-pages";

/// Lazily fetched repository facts, memoized for one Command only.
pub struct RepoView {
    repo: RepoRef,
    github: Arc<dyn GithubApi>,
    metadata: OnceCell<GithubRepository>,
    gh_pages: OnceCell<bool>,
    charles_yml: OnceCell<CharlesYml>,
}

impl RepoView {
    pub fn new(repo: RepoRef, github: Arc<dyn GithubApi>) -> Self {
        Self {
            repo,
            github,
            metadata: OnceCell::new(),
            gh_pages: OnceCell::new(),
            charles_yml: OnceCell::new(),
        }
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    async fn metadata(&self) -> Result<&GithubRepository> {
        self.metadata
            .get_or_try_init(|| async {
                self.github
                    .repository(&self.repo)
                    .await
                    .with_context(|| format!("failed to read repository {}", self.repo.as_slug()))
            })
            .await
    }

    pub async fn name(&self) -> Result<&str> {
        Ok(self.metadata().await?.name.as_str())
    }

    pub async fn owner_login(&self) -> Result<&str> {
        Ok(self.metadata().await?.owner.login.as_str())
    }

    pub async fn is_fork(&self) -> Result<bool> {
        Ok(self.metadata().await?.fork)
    }

    pub async fn is_org_owned(&self) -> Result<bool> {
        Ok(self.metadata().await?.owner.is_organization())
    }

    pub async fn has_gh_pages(&self) -> Result<bool> {
        self.gh_pages
            .get_or_try_init(|| async {
                self.github
                    .branch_exists(&self.repo, GH_PAGES_BRANCH)
                    .await
                    .with_context(|| {
                        format!("failed to check gh-pages branch of {}", self.repo.as_slug())
                    })
            })
            .await
            .copied()
    }

    pub async fn charles_yml(&self) -> Result<&CharlesYml> {
        self.charles_yml
            .get_or_try_init(|| async {
                let contents = self
                    .github
                    .file_contents(&self.repo, CHARLES_YML_PATH)
                    .await
                    .with_context(|| {
                        format!("failed to read {CHARLES_YML_PATH} of {}", self.repo.as_slug())
                    })?;
                CharlesYml::parse(contents.as_deref()).with_context(|| {
                    format!("invalid {CHARLES_YML_PATH} in {}", self.repo.as_slug())
                })
            })
            .await
    }
}
