use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use charles_github_issues::command_text::{extract_markdown_link, site_url};
use charles_github_issues::issue_comment::{render_reply, render_response};

use super::action_log::ActionLog;
use super::bot_services::{BotServices, CrawlRequest, Envelope, WebPage};
use super::command::{Command, TemplateVars};
use super::step_engine::{seq, terminal, Criticality, Effect, PlanStep};

/// Document type under which crawled pages are stored.
pub const PAGE_DOCUMENT_TYPE: &str = "page";
const FOLLOW_SUCCESS_STATUS: u16 = 204;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `LeafKind` values.
pub enum LeafKind {
    Reply(&'static str),
    StarRepo,
    Follow,
    Tweet,
    EmailAuthor,
    IndexSite,
    IndexPage,
    IndexSitemap,
    DeleteIndex,
    DeletePage,
}

/// A side-effect leaf bound to the shared collaborators.
pub struct Leaf {
    kind: LeafKind,
    services: BotServices,
}

impl Leaf {
    pub fn new(kind: LeafKind, services: &BotServices) -> Self {
        Self {
            kind,
            services: services.clone(),
        }
    }
}

/// Reply with `key`, then end the plan.
pub fn reply_and_end(services: &BotServices, key: &'static str) -> PlanStep {
    seq(
        Leaf::new(LeafKind::Reply(key), services),
        terminal(format!("answered with {key}")),
    )
}

fn command_link(command: &Command) -> Result<String> {
    extract_markdown_link(command.body())
        .ok_or_else(|| anyhow!("command carries no markdown link"))
}

async fn crawl_request(command: &Command, url: String) -> Result<CrawlRequest> {
    let driver = command.repo().charles_yml().await?.driver.clone();
    Ok(CrawlRequest { url, driver })
}

impl Leaf {
    async fn send_reply(&self, key: &str, command: &Command, log: &ActionLog) -> Result<()> {
        let vars = TemplateVars::for_command(command, log.address());
        let response = render_response(command.language(), key, &vars.as_pairs())
            .ok_or_else(|| anyhow!("no '{key}' template in {}", command.language().name()))?;
        let body = render_reply(command.body(), &response);
        self.services
            .github
            .create_issue_comment(command.issue(), &body)
            .await
            .with_context(|| format!("failed to post {key} reply"))?;
        log.info(format!("replied with {key}"));
        Ok(())
    }

    async fn star_repo(&self, command: &Command, log: &ActionLog) -> Result<()> {
        let repo = command.repo().repo();
        if self.services.github.is_starred(repo).await? {
            log.info(format!("{} is already starred", repo.as_slug()));
            return Ok(());
        }
        self.services.github.star(repo).await?;
        log.info(format!("starred {}", repo.as_slug()));
        Ok(())
    }

    async fn follow(&self, command: &Command, log: &ActionLog) -> Result<()> {
        let author = command.author_login();
        let status = self.services.github.follow_user(author).await?;
        if status != FOLLOW_SUCCESS_STATUS {
            bail!("following {author} returned status {status}, expected {FOLLOW_SUCCESS_STATUS}");
        }
        log.info(format!("followed {author}"));
        Ok(())
    }

    async fn tweet(&self, command: &Command, log: &ActionLog) -> Result<()> {
        if !command.repo().charles_yml().await?.tweet {
            log.info("tweeting is not enabled in .charles.yml");
            return Ok(());
        }
        let Some(tweeter) = &self.services.tweeter else {
            log.info("twitter credentials are not configured, not tweeting");
            return Ok(());
        };
        let key = format!("tweet.{}", command.category().as_str());
        let vars = TemplateVars::for_command(command, log.address());
        let message = render_response(command.language(), &key, &vars.as_pairs())
            .unwrap_or_default();
        if message.trim().is_empty() {
            log.warn(format!("no tweet text for {key}, not tweeting"));
            return Ok(());
        }
        tweeter.tweet(message.trim()).await?;
        log.info(format!("tweeted: {}", message.trim()));
        Ok(())
    }

    /// Follow-up email to the author's public address, when SMTP is configured.
    async fn email_author(&self, command: &Command, log: &ActionLog) -> Result<()> {
        let Some(mailer) = &self.services.mailer else {
            log.info("smtp is not configured, not sending a follow-up email");
            return Ok(());
        };
        let author = command.author_login();
        let Some(address) = self.services.github.user_email(author).await? else {
            log.info(format!("{author} has no public email, not sending a follow-up email"));
            return Ok(());
        };
        let vars = TemplateVars::for_command(command, log.address());
        let render = |key: &str| {
            render_response(command.language(), key, &vars.as_pairs())
                .ok_or_else(|| anyhow!("no '{key}' template in {}", command.language().name()))
        };
        let envelope = Envelope {
            to: address,
            subject: render("index.followup.email.subject")?,
            body: render("index.followup.email")?,
        };
        mailer.send(&envelope).await?;
        log.info(format!("sent follow-up email to {author}"));
        Ok(())
    }

    async fn export(&self, command: &Command, log: &ActionLog, pages: &[WebPage]) -> Result<()> {
        let index = command.index_name();
        log.info(format!("exporting {} page(s) to index {index}", pages.len()));
        self.services.index.export(&index, pages).await?;
        log.info("export finished");
        Ok(())
    }

    async fn index_site(&self, command: &Command, log: &ActionLog) -> Result<()> {
        let repo = command.repo();
        let url = site_url(repo.owner_login().await?, repo.name().await?, repo.has_gh_pages().await?);
        log.info(format!("crawling site {url}"));
        let request = crawl_request(command, url).await?;
        let pages = self.services.crawler.crawl_site(&request).await?;
        self.export(command, log, &pages).await
    }

    async fn index_page(&self, command: &Command, log: &ActionLog) -> Result<()> {
        let link = command_link(command)?;
        log.info(format!("crawling page {link}"));
        let request = crawl_request(command, link).await?;
        let page = self.services.crawler.crawl_page(&request).await?;
        self.export(command, log, std::slice::from_ref(&page)).await
    }

    async fn index_sitemap(&self, command: &Command, log: &ActionLog) -> Result<()> {
        let link = command_link(command)?;
        log.info(format!("crawling sitemap {link}"));
        let request = crawl_request(command, link).await?;
        let pages = self.services.crawler.crawl_sitemap(&request).await?;
        self.export(command, log, &pages).await
    }

    async fn delete_index(&self, command: &Command, log: &ActionLog) -> Result<()> {
        let index = command.index_name();
        log.info(format!("deleting index {index}"));
        self.services.index.delete_index(&index).await?;
        log.info("index deleted");
        Ok(())
    }

    async fn delete_page(&self, command: &Command, log: &ActionLog) -> Result<()> {
        let index = command.index_name();
        let link = command_link(command)?;
        log.info(format!("deleting page {link} from index {index}"));
        self.services
            .index
            .delete_document(&index, PAGE_DOCUMENT_TYPE, &link)
            .await?;
        log.info("page deleted");
        Ok(())
    }
}

#[async_trait]
impl Effect for Leaf {
    fn name(&self) -> &'static str {
        match self.kind {
            LeafKind::Reply(_) => "send_reply",
            LeafKind::StarRepo => "star_repo",
            LeafKind::Follow => "follow",
            LeafKind::Tweet => "tweet",
            LeafKind::EmailAuthor => "email_author",
            LeafKind::IndexSite => "index_site",
            LeafKind::IndexPage => "index_page",
            LeafKind::IndexSitemap => "index_sitemap",
            LeafKind::DeleteIndex => "delete_index",
            LeafKind::DeletePage => "delete_page",
        }
    }

    fn criticality(&self) -> Criticality {
        match self.kind {
            LeafKind::StarRepo | LeafKind::Follow | LeafKind::Tweet | LeafKind::EmailAuthor => {
                Criticality::Cosmetic
            }
            _ => Criticality::Critical,
        }
    }

    fn describe(&self) -> String {
        match self.kind {
            LeafKind::Reply(key) => format!("send_reply {key}"),
            _ => self.name().to_string(),
        }
    }

    async fn apply(&self, command: &Command, log: &ActionLog) -> Result<()> {
        match self.kind {
            LeafKind::Reply(key) => self.send_reply(key, command, log).await,
            LeafKind::StarRepo => self.star_repo(command, log).await,
            LeafKind::Follow => self.follow(command, log).await,
            LeafKind::Tweet => self.tweet(command, log).await,
            LeafKind::EmailAuthor => self.email_author(command, log).await,
            LeafKind::IndexSite => self.index_site(command, log).await,
            LeafKind::IndexPage => self.index_page(command, log).await,
            LeafKind::IndexSitemap => self.index_sitemap(command, log).await,
            LeafKind::DeleteIndex => self.delete_index(command, log).await,
            LeafKind::DeletePage => self.delete_page(command, log).await,
        }
    }
}
