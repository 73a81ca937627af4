//! Authorization gates and the general precondition decision tree.
//!
//! Order: commander listed, author is owner, author is org admin, repo is
//! not a fork, repo is named `{owner}.github.io`, repo has `gh-pages`.
//! Each failed gate answers with its own denial reply.

use anyhow::Result;
use async_trait::async_trait;
use charles_github_issues::command_text::{
    extract_backquoted_name, extract_markdown_link, is_page_hosted_on_github,
};

use super::action_log::ActionLog;
use super::bot_services::BotServices;
use super::command::Command;
use super::side_effects::reply_and_end;
use super::step_engine::{gate, PlanStep, Predicate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `CheckKind` values.
pub enum CheckKind {
    CommanderListed,
    AuthorIsOwner,
    AuthorIsOrgAdmin,
    RepoIsNotFork,
    RepoNamedOwnerSite,
    HasGhPagesBranch,
    PageHostedOnGithub,
    DeleteIndexNameMatches,
    IndexExists,
}

impl CheckKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CommanderListed => "commander_listed",
            Self::AuthorIsOwner => "author_is_owner",
            Self::AuthorIsOrgAdmin => "author_is_org_admin",
            Self::RepoIsNotFork => "repo_is_not_fork",
            Self::RepoNamedOwnerSite => "repo_named_owner_site",
            Self::HasGhPagesBranch => "has_gh_pages_branch",
            Self::PageHostedOnGithub => "page_hosted_on_github",
            Self::DeleteIndexNameMatches => "delete_index_name_matches",
            Self::IndexExists => "index_exists",
        }
    }
}

pub struct Check {
    kind: CheckKind,
    services: BotServices,
}

impl Check {
    pub fn new(kind: CheckKind, services: &BotServices) -> Self {
        Self {
            kind,
            services: services.clone(),
        }
    }

    async fn author_is_org_admin(&self, command: &Command) -> Result<bool> {
        let repo = command.repo();
        if !repo.is_org_owned().await? {
            return Ok(false);
        }
        let membership = self
            .services
            .github
            .org_membership(repo.owner_login().await?, command.author_login())
            .await?;
        Ok(membership.is_some_and(|membership| membership.is_active_admin()))
    }

    async fn page_hosted_on_github(&self, command: &Command, log: &ActionLog) -> Result<bool> {
        let Some(link) = extract_markdown_link(command.body()) else {
            log.info("command carries no link");
            return Ok(false);
        };
        let repo = command.repo();
        Ok(is_page_hosted_on_github(
            &link,
            repo.owner_login().await?,
            repo.name().await?,
            repo.has_gh_pages().await?,
        ))
    }

    async fn delete_index_name_matches(&self, command: &Command) -> Result<bool> {
        let Some(name) = extract_backquoted_name(command.body()) else {
            return Ok(false);
        };
        Ok(name == command.repo().name().await?)
    }
}

#[async_trait]
impl Predicate for Check {
    fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    async fn evaluate(&self, command: &Command, log: &ActionLog) -> Result<bool> {
        let repo = command.repo();
        match self.kind {
            CheckKind::CommanderListed => Ok(repo
                .charles_yml()
                .await?
                .is_commander(command.author_login())),
            CheckKind::AuthorIsOwner => Ok(repo
                .owner_login()
                .await?
                .eq_ignore_ascii_case(command.author_login())),
            CheckKind::AuthorIsOrgAdmin => self.author_is_org_admin(command).await,
            CheckKind::RepoIsNotFork => Ok(!repo.is_fork().await?),
            CheckKind::RepoNamedOwnerSite => {
                let expected = format!("{}.github.io", repo.owner_login().await?);
                Ok(repo.name().await?.eq_ignore_ascii_case(&expected))
            }
            CheckKind::HasGhPagesBranch => repo.has_gh_pages().await,
            CheckKind::PageHostedOnGithub => self.page_hosted_on_github(command, log).await,
            CheckKind::DeleteIndexNameMatches => self.delete_index_name_matches(command).await,
            CheckKind::IndexExists => self.services.index.exists(&command.index_name()).await,
        }
    }
}

/// Wrap `proceed` in the general precondition tree. Built fresh per plan.
pub fn general_preconditions(services: &BotServices, proceed: PlanStep) -> PlanStep {
    let check = |kind| Check::new(kind, services);

    let site_gate = gate(
        check(CheckKind::RepoNamedOwnerSite),
        proceed.clone(),
        gate(
            check(CheckKind::HasGhPagesBranch),
            proceed,
            reply_and_end(services, "denied.name.comment"),
        ),
    );
    let fork_gate = gate(
        check(CheckKind::RepoIsNotFork),
        site_gate,
        reply_and_end(services, "denied.fork.comment"),
    );
    gate(
        check(CheckKind::CommanderListed),
        fork_gate.clone(),
        gate(
            check(CheckKind::AuthorIsOwner),
            fork_gate.clone(),
            gate(
                check(CheckKind::AuthorIsOrgAdmin),
                fork_gate,
                reply_and_end(services, "denied.commander.comment"),
            ),
        ),
    )
}
