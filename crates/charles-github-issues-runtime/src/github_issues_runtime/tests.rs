use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use charles_core::LogRotationPolicy;
use charles_github_issues::command_classifier::{CommandCategory, CommandClassifier};
use charles_github_issues::github_types::{
    GithubIssueComment, GithubNotification, GithubNotificationRepository,
    GithubNotificationSubject, GithubRepository, GithubUser, OrgMembership,
};
use charles_github_issues::mention::{IssueRef, Mention, RawComment, RepoRef};
use tempfile::TempDir;

use super::action_log::ActionLog;
use super::action_runner::{ActionReport, ActionRunner, ActionStatus};
use super::bot_services::{
    BotServices, CrawlRequest, Crawler, Envelope, GithubApi, Mailer, SearchIndex, Tweeter,
    WebPage,
};
use super::command::Command;
use super::repo_view::RepoView;
use super::side_effects::{reply_and_end, Leaf, LeafKind};
use super::step_engine::{
    gate, seq, terminal, Criticality, Effect, PlanOutcome, PlanStep, Predicate, Steps,
};
use super::workflow_builder::WorkflowBuilder;
use super::{NotificationsRuntime, RuntimeSettings};

const BOT: &str = "charlesmike";
const LOGS: &str = "http://logs.charles.test";
const SITE_REPO: &str = "amihaiemil/amihaiemil.github.io";

#[derive(Default)]
struct GithubState {
    notifications: Vec<GithubNotification>,
    comments: HashMap<u64, GithubIssueComment>,
    issue_comments: Vec<GithubIssueComment>,
    repositories: HashMap<String, GithubRepository>,
    gh_pages: HashSet<String>,
    memberships: HashMap<String, OrgMembership>,
    starred: HashSet<String>,
    files: HashMap<String, String>,
    emails: HashMap<String, String>,
    follow_status: Option<u16>,
    fail_comment_listing: bool,
    comment_delay: Option<Duration>,
    posted: Vec<(u64, String)>,
    marked_read: Vec<String>,
    calls: Vec<String>,
}

#[derive(Default)]
struct FakeGithub {
    state: Mutex<GithubState>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeGithub {
    fn with(setup: impl FnOnce(&mut GithubState)) -> Arc<Self> {
        let github = Self::default();
        setup(&mut github.state());
        Arc::new(github)
    }

    fn state(&self) -> MutexGuard<'_, GithubState> {
        self.state.lock().expect("github state")
    }

    fn record(&self, call: impl Into<String>) {
        self.state().calls.push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    fn posted(&self) -> Vec<String> {
        self.state()
            .posted
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl GithubApi for FakeGithub {
    async fn authenticated_login(&self) -> Result<String> {
        Ok(BOT.to_string())
    }

    async fn list_notifications(&self) -> Result<Vec<GithubNotification>> {
        self.record("list_notifications");
        Ok(self.state().notifications.clone())
    }

    async fn mark_notifications_read(&self, last_read_at: &str) -> Result<()> {
        self.state().marked_read.push(last_read_at.to_string());
        Ok(())
    }

    async fn issue_comment(&self, _repo: &RepoRef, comment_id: u64) -> Result<GithubIssueComment> {
        self.record("issue_comment");
        let delay = self.state().comment_delay;
        if let Some(delay) = delay {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
        self.state()
            .comments
            .get(&comment_id)
            .cloned()
            .ok_or_else(|| anyhow!("comment {comment_id} not found"))
    }

    async fn list_issue_comments(&self, _issue: &IssueRef) -> Result<Vec<GithubIssueComment>> {
        self.record("list_issue_comments");
        let state = self.state();
        if state.fail_comment_listing {
            bail!("connection reset by peer");
        }
        Ok(state.issue_comments.clone())
    }

    async fn create_issue_comment(&self, issue: &IssueRef, body: &str) -> Result<()> {
        self.state().posted.push((issue.number, body.to_string()));
        Ok(())
    }

    async fn repository(&self, repo: &RepoRef) -> Result<GithubRepository> {
        self.record(format!("repository {}", repo.as_slug()));
        self.state()
            .repositories
            .get(&repo.as_slug())
            .cloned()
            .ok_or_else(|| anyhow!("repository {} not found", repo.as_slug()))
    }

    async fn branch_exists(&self, repo: &RepoRef, branch: &str) -> Result<bool> {
        self.record(format!("branch_exists {branch}"));
        Ok(self.state().gh_pages.contains(&repo.as_slug()))
    }

    async fn org_membership(&self, org: &str, login: &str) -> Result<Option<OrgMembership>> {
        self.record("org_membership");
        Ok(self
            .state()
            .memberships
            .get(&format!("{org}/{login}"))
            .cloned())
    }

    async fn is_starred(&self, repo: &RepoRef) -> Result<bool> {
        self.record("is_starred");
        Ok(self.state().starred.contains(&repo.as_slug()))
    }

    async fn star(&self, repo: &RepoRef) -> Result<()> {
        self.record("star");
        self.state().starred.insert(repo.as_slug());
        Ok(())
    }

    async fn follow_user(&self, login: &str) -> Result<u16> {
        self.record(format!("follow_user {login}"));
        Ok(self.state().follow_status.unwrap_or(204))
    }

    async fn file_contents(&self, repo: &RepoRef, path: &str) -> Result<Option<String>> {
        self.record(format!("file_contents {path}"));
        Ok(self.state().files.get(&repo.as_slug()).cloned())
    }

    async fn user_email(&self, login: &str) -> Result<Option<String>> {
        self.record(format!("user_email {login}"));
        Ok(self.state().emails.get(login).cloned())
    }
}

#[derive(Default)]
struct FakeIndex {
    existing: Mutex<HashSet<String>>,
    exports: Mutex<Vec<(String, Vec<WebPage>)>>,
    deleted_indexes: Mutex<Vec<String>>,
    deleted_documents: Mutex<Vec<(String, String, String)>>,
    lookups: AtomicUsize,
}

impl FakeIndex {
    fn with_existing(index: &str) -> Arc<Self> {
        let fake = Self::default();
        fake.existing
            .lock()
            .expect("existing")
            .insert(index.to_string());
        Arc::new(fake)
    }

    fn exports(&self) -> Vec<(String, Vec<WebPage>)> {
        self.exports.lock().expect("exports").clone()
    }
}

#[async_trait]
impl SearchIndex for FakeIndex {
    async fn exists(&self, index: &str) -> Result<bool> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.existing.lock().expect("existing").contains(index))
    }

    async fn export(&self, index: &str, pages: &[WebPage]) -> Result<()> {
        self.exports
            .lock()
            .expect("exports")
            .push((index.to_string(), pages.to_vec()));
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.deleted_indexes
            .lock()
            .expect("deleted")
            .push(index.to_string());
        Ok(())
    }

    async fn delete_document(&self, index: &str, doc_type: &str, id: &str) -> Result<()> {
        self.deleted_documents.lock().expect("deleted").push((
            index.to_string(),
            doc_type.to_string(),
            id.to_string(),
        ));
        Ok(())
    }
}

#[derive(Default)]
struct FakeCrawler {
    fail: bool,
    requests: Mutex<Vec<(&'static str, CrawlRequest)>>,
}

impl FakeCrawler {
    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    fn requests(&self) -> Vec<(&'static str, CrawlRequest)> {
        self.requests.lock().expect("requests").clone()
    }

    fn pages(&self, kind: &'static str, request: &CrawlRequest) -> Result<Vec<WebPage>> {
        self.requests
            .lock()
            .expect("requests")
            .push((kind, request.clone()));
        if self.fail {
            bail!("crawler could not reach {}", request.url);
        }
        Ok(vec![
            WebPage {
                url: request.url.clone(),
                title: "Home".to_string(),
                content: "Welcome".to_string(),
            },
            WebPage {
                url: format!("{}/about.html", request.url),
                title: "About".to_string(),
                content: "About me".to_string(),
            },
        ])
    }
}

#[async_trait]
impl Crawler for FakeCrawler {
    async fn crawl_page(&self, request: &CrawlRequest) -> Result<WebPage> {
        let mut pages = self.pages("page", request)?;
        Ok(pages.remove(0))
    }

    async fn crawl_site(&self, request: &CrawlRequest) -> Result<Vec<WebPage>> {
        self.pages("site", request)
    }

    async fn crawl_sitemap(&self, request: &CrawlRequest) -> Result<Vec<WebPage>> {
        self.pages("sitemap", request)
    }
}

#[derive(Default)]
struct FakeTweeter {
    fail: bool,
    tweets: Mutex<Vec<String>>,
}

#[async_trait]
impl Tweeter for FakeTweeter {
    async fn tweet(&self, message: &str) -> Result<()> {
        self.tweets
            .lock()
            .expect("tweets")
            .push(message.to_string());
        if self.fail {
            bail!("twitter is down");
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeMailer {
    sent: Mutex<Vec<Envelope>>,
}

impl FakeMailer {
    fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().expect("sent").clone()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, envelope: &Envelope) -> Result<()> {
        self.sent.lock().expect("sent").push(envelope.clone());
        Ok(())
    }
}

fn user(login: &str) -> GithubUser {
    GithubUser {
        login: login.to_string(),
        kind: Some("User".to_string()),
    }
}

fn comment(id: u64, author: &str, body: &str) -> GithubIssueComment {
    GithubIssueComment {
        id,
        body: Some(body.to_string()),
        user: user(author),
    }
}

fn repository(slug: &str, owner: GithubUser, fork: bool) -> GithubRepository {
    let repo = RepoRef::parse(slug).expect("slug");
    GithubRepository {
        name: repo.name,
        full_name: slug.to_string(),
        owner,
        fork,
        default_branch: Some("master".to_string()),
    }
}

fn mention_notification(id: &str, slug: &str, issue: u64, comment_id: u64) -> GithubNotification {
    GithubNotification {
        id: id.to_string(),
        reason: "mention".to_string(),
        subject: GithubNotificationSubject {
            kind: "Issue".to_string(),
            url: Some(format!("https://api.github.com/repos/{slug}/issues/{issue}")),
            latest_comment_url: Some(format!(
                "https://api.github.com/repos/{slug}/issues/comments/{comment_id}"
            )),
        },
        repository: GithubNotificationRepository {
            full_name: slug.to_string(),
        },
    }
}

/// Owner-hosted site repo with one latest comment `body` by `author`.
fn site_github(author: &str, body: &str) -> Arc<FakeGithub> {
    let body = body.to_string();
    let author = author.to_string();
    FakeGithub::with(move |state| {
        state.comments.insert(10, comment(10, &author, &body));
        state.repositories.insert(
            SITE_REPO.to_string(),
            repository(SITE_REPO, user("amihaiemil"), false),
        );
    })
}

struct Fixture {
    github: Arc<FakeGithub>,
    index: Arc<FakeIndex>,
    crawler: Arc<FakeCrawler>,
    tweeter: Option<Arc<FakeTweeter>>,
    mailer: Option<Arc<FakeMailer>>,
}

impl Fixture {
    fn new(github: Arc<FakeGithub>) -> Self {
        Self {
            github,
            index: Arc::new(FakeIndex::default()),
            crawler: Arc::new(FakeCrawler::default()),
            tweeter: None,
            mailer: None,
        }
    }

    fn services(&self) -> BotServices {
        BotServices {
            github: self.github.clone(),
            index: self.index.clone(),
            crawler: self.crawler.clone(),
            tweeter: self
                .tweeter
                .clone()
                .map(|tweeter| tweeter as Arc<dyn Tweeter>),
            mailer: self.mailer.clone().map(|mailer| mailer as Arc<dyn Mailer>),
        }
    }

    fn runner(&self, logs_dir: &Path) -> ActionRunner {
        ActionRunner::new(
            self.services(),
            CommandClassifier::default(),
            BOT,
            logs_dir.to_path_buf(),
            LOGS,
        )
    }

    async fn run_mention(
        &self,
        slug: &str,
        latest_comment_id: Option<u64>,
    ) -> (ActionReport, TempDir) {
        let temp = tempfile::tempdir().expect("tempdir");
        let mention = Mention {
            issue: IssueRef {
                repo: RepoRef::parse(slug).expect("slug"),
                number: 5,
            },
            latest_comment_id,
        };
        let report = self.runner(temp.path()).run("action-1", &mention).await;
        (report, temp)
    }

    async fn run(&self) -> (ActionReport, TempDir) {
        self.run_mention(SITE_REPO, Some(10)).await
    }
}

fn settings(
    logs_dir: &Path,
    max_concurrent_actions: usize,
    timeout: Option<Duration>,
) -> RuntimeSettings {
    RuntimeSettings {
        poll_interval: Duration::from_millis(10),
        poll_once: true,
        max_concurrent_actions,
        action_timeout: timeout,
        logs_dir: logs_dir.to_path_buf(),
        logs_base_url: LOGS.to_string(),
        ledger_rotation: LogRotationPolicy::default(),
    }
}

#[test]
fn unit_plan_construction_performs_no_io() {
    let fixture = Fixture::new(site_github("amihaiemil", "@charlesmike hello"));
    let services = fixture.services();
    let builder = WorkflowBuilder::new(&services);
    let hello = builder.build(CommandCategory::Hello).describe();
    assert_eq!(hello[0], "do send_reply hello.comment");
    let index_site = builder.build(CommandCategory::IndexSite).describe();
    assert_eq!(index_site[0], "gate commander_listed");
    assert!(index_site
        .iter()
        .any(|line| line.trim() == "do send_reply denied.commander.comment"));
    let delete_index = builder.build(CommandCategory::DeleteIndex).describe();
    assert_eq!(delete_index[0], "gate delete_index_name_matches");
    assert!(fixture.github.calls().is_empty());
    assert_eq!(fixture.index.lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn functional_hello_replies_without_repository_io() {
    let fixture = Fixture::new(site_github("amihaiemil", "@charlesmike hello"));
    let (report, temp) = fixture.run().await;

    assert_eq!(report.status, ActionStatus::Completed);
    assert_eq!(report.category, Some(CommandCategory::Hello));
    let posted = fixture.github.posted();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].starts_with("> @charlesmike hello\n\nHi @amihaiemil!"));
    assert_eq!(fixture.github.calls(), vec!["issue_comment".to_string()]);

    let log = std::fs::read_to_string(temp.path().join("action-1.log")).expect("action log");
    assert!(log.contains("understood as hello"));
    assert_eq!(report.log_address, "http://logs.charles.test/action-1.log");
}

#[tokio::test]
async fn functional_unknown_command_gets_unknown_reply() {
    let fixture = Fixture::new(site_github(
        "amihaiemil",
        "@charlesmike how many languages do you speak?",
    ));
    let (report, _temp) = fixture.run().await;
    assert_eq!(report.category, Some(CommandCategory::Unknown));
    let posted = fixture.github.posted();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].contains("Sorry @amihaiemil, I did not understand that."));
}

#[tokio::test]
async fn integration_owner_indexes_owner_site_end_to_end() {
    let fixture = Fixture::new(site_github("amihaiemil", "@charlesmike index this site"));
    let (report, _temp) = fixture.run().await;

    assert_eq!(report.status, ActionStatus::Completed);
    let posted = fixture.github.posted();
    assert_eq!(posted.len(), 2);
    assert!(posted[0].contains("I started indexing"));
    assert!(posted[0].contains("(http://logs.charles.test/action-1.log)"));
    assert!(posted[1].contains("indexing finished"));

    let requests = fixture.crawler.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "site");
    assert_eq!(requests[0].1.url, "http://amihaiemil.github.io");
    assert_eq!(requests[0].1.driver, "chrome");

    let exports = fixture.index.exports();
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].0, "amihaiemilxamihaiemil.github.io");
    assert_eq!(exports[0].1.len(), 2);

    let calls = fixture.github.calls();
    assert!(calls.contains(&"star".to_string()));
    assert!(!calls.contains(&"org_membership".to_string()));
    assert_eq!(
        calls
            .iter()
            .filter(|call| call.starts_with("repository "))
            .count(),
        1
    );
}

#[tokio::test]
async fn functional_star_is_skipped_when_already_starred() {
    let github = site_github("amihaiemil", "@charlesmike index this site");
    github.state().starred.insert(SITE_REPO.to_string());
    let fixture = Fixture::new(github);
    let (report, _temp) = fixture.run().await;

    assert_eq!(report.status, ActionStatus::Completed);
    let calls = fixture.github.calls();
    assert!(calls.contains(&"is_starred".to_string()));
    assert!(!calls.contains(&"star".to_string()));
}

#[tokio::test]
async fn functional_non_commander_is_denied_without_org_lookup() {
    let fixture = Fixture::new(site_github("john", "@charlesmike index this site"));
    let (report, _temp) = fixture.run().await;

    assert_eq!(report.status, ActionStatus::Completed);
    let posted = fixture.github.posted();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].contains("@john only the repository owner"));
    assert!(fixture.index.exports().is_empty());
    assert!(!fixture
        .github
        .calls()
        .contains(&"org_membership".to_string()));
}

#[tokio::test]
async fn functional_commander_listed_in_charles_yml_may_index() {
    let github = site_github("john", "@charlesmike index this site");
    github
        .state()
        .files
        .insert(SITE_REPO.to_string(), "commanders:\n  - '@John'\n".to_string());
    let fixture = Fixture::new(github);
    let (report, _temp) = fixture.run().await;

    assert_eq!(report.status, ActionStatus::Completed);
    assert_eq!(fixture.index.exports().len(), 1);
}

#[tokio::test]
async fn integration_org_admin_may_index_org_site() {
    let slug = "opencharles/opencharles.github.io";
    let github = FakeGithub::with(|state| {
        state
            .comments
            .insert(10, comment(10, "amihaiemil", "@charlesmike index this site"));
        state.repositories.insert(
            slug.to_string(),
            repository(
                slug,
                GithubUser {
                    login: "opencharles".to_string(),
                    kind: Some("Organization".to_string()),
                },
                false,
            ),
        );
        state.memberships.insert(
            "opencharles/amihaiemil".to_string(),
            OrgMembership {
                state: "active".to_string(),
                role: "admin".to_string(),
            },
        );
    });
    let fixture = Fixture::new(github);
    let (report, _temp) = fixture.run_mention(slug, Some(10)).await;

    assert_eq!(report.status, ActionStatus::Completed);
    let exports = fixture.index.exports();
    assert_eq!(exports[0].0, "opencharlesxopencharles.github.io");
    assert!(fixture
        .github
        .calls()
        .contains(&"org_membership".to_string()));
}

#[tokio::test]
async fn functional_fork_and_non_site_repositories_are_denied() {
    let github = site_github("amihaiemil", "@charlesmike index this site");
    github.state().repositories.insert(
        SITE_REPO.to_string(),
        repository(SITE_REPO, user("amihaiemil"), true),
    );
    let fixture = Fixture::new(github);
    fixture.run().await;
    let posted = fixture.github.posted();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].contains("is a fork"));

    let slug = "amihaiemil/charles";
    let github = FakeGithub::with(|state| {
        state
            .comments
            .insert(10, comment(10, "amihaiemil", "@charlesmike index this site"));
        state
            .repositories
            .insert(slug.to_string(), repository(slug, user("amihaiemil"), false));
    });
    let fixture = Fixture::new(github);
    fixture.run_mention(slug, Some(10)).await;
    let posted = fixture.github.posted();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].contains("is not hosting a website"));
    assert!(fixture
        .github
        .calls()
        .contains(&"branch_exists gh-pages".to_string()));
}

#[tokio::test]
async fn integration_gh_pages_project_site_is_crawled_under_owner_domain() {
    let slug = "amihaiemil/charles";
    let github = FakeGithub::with(|state| {
        state
            .comments
            .insert(10, comment(10, "amihaiemil", "@charlesmike index this site"));
        state
            .repositories
            .insert(slug.to_string(), repository(slug, user("amihaiemil"), false));
        state.gh_pages.insert(slug.to_string());
    });
    let fixture = Fixture::new(github);
    let (report, _temp) = fixture.run_mention(slug, Some(10)).await;

    assert_eq!(report.status, ActionStatus::Completed);
    let requests = fixture.crawler.requests();
    assert_eq!(requests[0].1.url, "http://amihaiemil.github.io/charles");
    assert_eq!(
        fixture
            .github
            .calls()
            .iter()
            .filter(|call| call.starts_with("branch_exists"))
            .count(),
        1
    );
}

#[tokio::test]
async fn regression_critical_failure_sends_exactly_one_failure_reply() {
    let mut fixture = Fixture::new(site_github("amihaiemil", "@charlesmike index this site"));
    fixture.crawler = FakeCrawler::failing();
    let (report, temp) = fixture.run().await;

    assert_eq!(report.status, ActionStatus::Failed);
    let posted = fixture.github.posted();
    assert_eq!(posted.len(), 2);
    assert!(posted[0].contains("I started indexing"));
    assert_eq!(
        posted
            .iter()
            .filter(|body| body.contains("something went wrong"))
            .count(),
        1
    );
    assert!(fixture.index.exports().is_empty());
    assert!(!fixture.github.calls().contains(&"star".to_string()));

    let log = std::fs::read_to_string(temp.path().join("action-1.log")).expect("action log");
    assert!(log.contains("step 'index_site' failed"));
}

#[tokio::test]
async fn regression_cosmetic_tweet_failure_does_not_abort_plan() {
    let github = site_github("amihaiemil", "@charlesmike index this site");
    github
        .state()
        .files
        .insert(SITE_REPO.to_string(), "tweet: true\n".to_string());
    let mut fixture = Fixture::new(github);
    let tweeter = Arc::new(FakeTweeter {
        fail: true,
        ..FakeTweeter::default()
    });
    fixture.tweeter = Some(tweeter.clone());
    let (report, _temp) = fixture.run().await;

    assert_eq!(report.status, ActionStatus::Completed);
    let tweets = tweeter.tweets.lock().expect("tweets").clone();
    assert_eq!(tweets.len(), 1);
    assert!(tweets[0].contains("amihaiemil/amihaiemil.github.io"));
    assert!(!fixture
        .github
        .posted()
        .iter()
        .any(|body| body.contains("something went wrong")));
}

#[tokio::test]
async fn functional_tweet_requires_charles_yml_opt_in() {
    let mut fixture = Fixture::new(site_github("amihaiemil", "@charlesmike index this site"));
    let tweeter = Arc::new(FakeTweeter::default());
    fixture.tweeter = Some(tweeter.clone());
    let (report, _temp) = fixture.run().await;
    assert_eq!(report.status, ActionStatus::Completed);
    assert!(tweeter.tweets.lock().expect("tweets").is_empty());
}

#[tokio::test]
async fn functional_site_indexing_emails_the_author_a_followup() {
    let github = site_github("amihaiemil", "@charlesmike index this site");
    github
        .state()
        .emails
        .insert("amihaiemil".to_string(), "amihai@example.com".to_string());
    let mut fixture = Fixture::new(github);
    let mailer = Arc::new(FakeMailer::default());
    fixture.mailer = Some(mailer.clone());
    let (report, _temp) = fixture.run().await;

    assert_eq!(report.status, ActionStatus::Completed);
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "amihai@example.com");
    assert_eq!(
        sent[0].subject,
        "Repo amihaiemil/amihaiemil.github.io successfully indexed"
    );
    assert!(sent[0].body.starts_with("Hello @amihaiemil,"));
    assert_eq!(fixture.github.posted().len(), 2);
}

#[tokio::test]
async fn regression_hidden_author_email_skips_the_followup_quietly() {
    let mut fixture = Fixture::new(site_github("amihaiemil", "@charlesmike index this site"));
    let mailer = Arc::new(FakeMailer::default());
    fixture.mailer = Some(mailer.clone());
    let (report, _temp) = fixture.run().await;

    assert_eq!(report.status, ActionStatus::Completed);
    assert!(mailer.sent().is_empty());
    assert!(fixture
        .github
        .calls()
        .contains(&"user_email amihaiemil".to_string()));
    assert_eq!(fixture.github.posted().len(), 2);
}

#[tokio::test]
async fn functional_page_indexing_sends_no_email() {
    let github = site_github(
        "amihaiemil",
        "@charlesmike index [this](http://amihaiemil.github.io/page.html) page",
    );
    github
        .state()
        .emails
        .insert("amihaiemil".to_string(), "amihai@example.com".to_string());
    let mut fixture = Fixture::new(github);
    let mailer = Arc::new(FakeMailer::default());
    fixture.mailer = Some(mailer.clone());
    let (report, _temp) = fixture.run().await;

    assert_eq!(report.status, ActionStatus::Completed);
    assert!(mailer.sent().is_empty());
    assert!(!fixture
        .github
        .calls()
        .iter()
        .any(|call| call.starts_with("user_email")));
}

#[tokio::test]
async fn functional_index_page_crawls_linked_page_only() {
    let fixture = Fixture::new(site_github(
        "amihaiemil",
        "@charlesmike index [this](http://amihaiemil.github.io/about.html) page",
    ));
    let (report, _temp) = fixture.run().await;

    assert_eq!(report.category, Some(CommandCategory::IndexPage));
    assert_eq!(report.status, ActionStatus::Completed);
    let requests = fixture.crawler.requests();
    assert_eq!(requests[0].0, "page");
    assert_eq!(requests[0].1.url, "http://amihaiemil.github.io/about.html");
    assert_eq!(fixture.index.exports()[0].1.len(), 1);
}

#[tokio::test]
async fn regression_greeting_in_link_label_still_indexes_the_page() {
    let fixture = Fixture::new(site_github(
        "amihaiemil",
        "@charlesmike index [hello world](http://amihaiemil.github.io/hello.html) page",
    ));
    let (report, _temp) = fixture.run().await;

    assert_eq!(report.category, Some(CommandCategory::IndexPage));
    let requests = fixture.crawler.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].1.url, "http://amihaiemil.github.io/hello.html");
    assert!(!fixture.github.posted()[0].contains("Hi @"));
}

#[tokio::test]
async fn functional_foreign_link_is_denied_as_bad_link() {
    let fixture = Fixture::new(site_github(
        "amihaiemil",
        "@charlesmike index [this](http://www.amihaiemil.com/about.html) page",
    ));
    fixture.run().await;
    let posted = fixture.github.posted();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].contains("does not point at this repository's website"));
    assert!(fixture.crawler.requests().is_empty());
}

#[tokio::test]
async fn functional_index_sitemap_uses_sitemap_crawl() {
    let fixture = Fixture::new(site_github(
        "amihaiemil",
        "@charlesmike index [sitemap](http://amihaiemil.github.io/sitemap.xml)",
    ));
    let (report, _temp) = fixture.run().await;
    assert_eq!(report.category, Some(CommandCategory::IndexSitemap));
    let requests = fixture.crawler.requests();
    assert_eq!(requests[0].0, "sitemap");
    assert_eq!(requests[0].1.url, "http://amihaiemil.github.io/sitemap.xml");
}

#[tokio::test]
async fn integration_delete_index_flow_deletes_and_follows_author() {
    let mut fixture = Fixture::new(site_github(
        "amihaiemil",
        "@charlesmike delete `amihaiemil.github.io` index",
    ));
    fixture.index = FakeIndex::with_existing("amihaiemilxamihaiemil.github.io");
    let (report, _temp) = fixture.run().await;

    assert_eq!(report.status, ActionStatus::Completed);
    assert_eq!(
        fixture.index.deleted_indexes.lock().expect("deleted").clone(),
        vec!["amihaiemilxamihaiemil.github.io".to_string()]
    );
    let posted = fixture.github.posted();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].contains("I deleted the index of `amihaiemil/amihaiemil.github.io`"));
    assert!(fixture
        .github
        .calls()
        .contains(&"follow_user amihaiemil".to_string()));
}

#[tokio::test]
async fn functional_delete_index_name_mismatch_and_missing_index() {
    let fixture = Fixture::new(site_github("amihaiemil", "@charlesmike delete this index"));
    fixture.run().await;
    let posted = fixture.github.posted();
    assert!(posted[0].contains("write the exact name of this repository"));
    assert_eq!(fixture.index.lookups.load(Ordering::SeqCst), 0);

    let fixture = Fixture::new(site_github(
        "amihaiemil",
        "@charlesmike delete `amihaiemil.github.io` index",
    ));
    fixture.run().await;
    let posted = fixture.github.posted();
    assert!(posted[0].contains("there is no index for"));
    assert!(fixture
        .index
        .deleted_indexes
        .lock()
        .expect("deleted")
        .is_empty());
}

#[tokio::test]
async fn regression_follow_failure_is_cosmetic() {
    let github = site_github("amihaiemil", "@charlesmike delete `amihaiemil.github.io` index");
    github.state().follow_status = Some(404);
    let mut fixture = Fixture::new(github);
    fixture.index = FakeIndex::with_existing("amihaiemilxamihaiemil.github.io");
    let (report, _temp) = fixture.run().await;
    assert_eq!(report.status, ActionStatus::Completed);
}

#[tokio::test]
async fn integration_delete_page_removes_document_by_url() {
    let mut fixture = Fixture::new(site_github(
        "amihaiemil",
        "@charlesmike delete [this](http://amihaiemil.github.io/old.html) page",
    ));
    fixture.index = FakeIndex::with_existing("amihaiemilxamihaiemil.github.io");
    let (report, _temp) = fixture.run().await;

    assert_eq!(report.category, Some(CommandCategory::DeletePage));
    assert_eq!(report.status, ActionStatus::Completed);
    assert_eq!(
        fixture
            .index
            .deleted_documents
            .lock()
            .expect("deleted")
            .clone(),
        vec![(
            "amihaiemilxamihaiemil.github.io".to_string(),
            "page".to_string(),
            "http://amihaiemil.github.io/old.html".to_string()
        )]
    );
    assert!(fixture.github.posted()[0].contains("removed that page"));
}

#[tokio::test]
async fn regression_schemeless_links_are_denied_before_any_crawl_or_delete() {
    for body in [
        "@charlesmike delete [this](amihaiemil.github.io/old.html) page",
        "@charlesmike index [this](amihaiemil.github.io/a.html) page",
    ] {
        let mut fixture = Fixture::new(site_github("amihaiemil", body));
        fixture.index = FakeIndex::with_existing("amihaiemilxamihaiemil.github.io");
        let (report, _temp) = fixture.run().await;

        assert_eq!(report.status, ActionStatus::Completed, "{body}");
        let posted = fixture.github.posted();
        assert_eq!(posted.len(), 1, "{body}");
        assert!(
            posted[0].contains("does not point at this repository's website"),
            "{body}"
        );
        assert!(fixture.crawler.requests().is_empty(), "{body}");
        assert!(fixture
            .index
            .deleted_documents
            .lock()
            .expect("deleted")
            .is_empty());
    }
}

#[tokio::test]
async fn regression_already_answered_issue_is_ignored_silently() {
    let github = FakeGithub::with(|state| {
        state
            .comments
            .insert(11, comment(11, BOT, "> @charlesmike hello\n\nHi @amihaiemil!"));
        state.issue_comments = vec![
            comment(10, "amihaiemil", "@charlesmike hello"),
            comment(11, BOT, "> @charlesmike hello\n\nHi @amihaiemil!"),
        ];
    });
    let fixture = Fixture::new(github);
    let (report, _temp) = fixture.run_mention(SITE_REPO, Some(11)).await;

    assert_eq!(report.status, ActionStatus::Ignored);
    assert_eq!(report.category, None);
    assert!(fixture.github.posted().is_empty());
}

#[tokio::test]
async fn functional_comment_scan_falls_back_to_issue_history() {
    let github = FakeGithub::with(|state| {
        state.issue_comments = vec![
            comment(7, "amihaiemil", "@charlesmike hi"),
            comment(8, "john", "nice repo"),
        ];
    });
    let fixture = Fixture::new(github);
    let (report, _temp) = fixture.run_mention(SITE_REPO, None).await;
    assert_eq!(report.category, Some(CommandCategory::Hello));
    assert!(fixture.github.posted()[0].starts_with("> @charlesmike hi\n\nHi @amihaiemil!"));
}

#[tokio::test]
async fn regression_scanner_io_error_posts_error_reply() {
    let github = FakeGithub::with(|state| state.fail_comment_listing = true);
    let fixture = Fixture::new(github);
    let (report, temp) = fixture.run_mention(SITE_REPO, None).await;

    assert_eq!(report.status, ActionStatus::Errored);
    let posted = fixture.github.posted();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].contains("could not process the latest command"));
    assert!(posted[0].contains("(http://logs.charles.test/action-1.log)"));
    let log = std::fs::read_to_string(temp.path().join("action-1.log")).expect("action log");
    assert!(log.contains("connection reset by peer"));
}

#[tokio::test]
async fn unit_repo_view_memoizes_repository_facts() {
    let github = site_github("amihaiemil", "@charlesmike hello");
    let view = RepoView::new(
        RepoRef::parse(SITE_REPO).expect("slug"),
        github.clone() as Arc<dyn GithubApi>,
    );
    assert_eq!(view.name().await.expect("name"), "amihaiemil.github.io");
    assert_eq!(view.owner_login().await.expect("owner"), "amihaiemil");
    assert!(!view.is_fork().await.expect("fork"));
    assert!(!view.has_gh_pages().await.expect("gh-pages"));
    assert!(!view.has_gh_pages().await.expect("gh-pages"));
    assert!(view.charles_yml().await.expect("yml").commanders.is_empty());
    view.charles_yml().await.expect("yml");

    let calls = github.calls();
    assert_eq!(
        calls,
        vec![
            format!("repository {SITE_REPO}"),
            "branch_exists gh-pages".to_string(),
            "file_contents .charles.yml".to_string(),
        ]
    );
}

#[tokio::test]
async fn integration_poll_dispatches_mentions_and_marks_read() {
    let github = FakeGithub::with(|state| {
        state
            .comments
            .insert(10, comment(10, "amihaiemil", "@charlesmike hello"));
        state
            .comments
            .insert(20, comment(20, "john", "@charlesmike hi"));
        let mut subscribed = mention_notification("3", SITE_REPO, 9, 30);
        subscribed.reason = "subscribed".to_string();
        state.notifications = vec![
            mention_notification("1", SITE_REPO, 5, 10),
            mention_notification("2", SITE_REPO, 6, 20),
            subscribed,
        ];
    });
    let fixture = Fixture::new(github);
    let temp = tempfile::tempdir().expect("tempdir");
    let mut runtime = NotificationsRuntime::new(
        settings(temp.path(), 4, None),
        fixture.services(),
        CommandClassifier::default(),
        BOT,
    )
    .expect("runtime");

    let report = runtime.check_for_notifications().await.expect("poll");
    assert_eq!(report.notifications, 3);
    assert_eq!(report.dispatched_actions, 2);
    assert_eq!(report.skipped_notifications, 1);
    assert_eq!(fixture.github.state().marked_read.len(), 1);

    let mut reports = runtime.wait_for_actions().await;
    reports.sort_by_key(|report| report.issue_number);
    assert_eq!(reports.len(), 2);
    assert!(reports
        .iter()
        .all(|report| report.status == ActionStatus::Completed));
    assert_eq!(runtime.in_flight(), 0);

    let mut issues = fixture
        .github
        .state()
        .posted
        .iter()
        .map(|(issue, _)| *issue)
        .collect::<Vec<_>>();
    issues.sort_unstable();
    assert_eq!(issues, vec![5, 6]);

    let ledger = std::fs::read_to_string(temp.path().join("actions.jsonl")).expect("ledger");
    assert_eq!(ledger.lines().count(), 2);
}

#[tokio::test]
async fn functional_empty_poll_does_not_mark_read() {
    let fixture = Fixture::new(FakeGithub::with(|_| {}));
    let temp = tempfile::tempdir().expect("tempdir");
    let mut runtime = NotificationsRuntime::new(
        settings(temp.path(), 4, None),
        fixture.services(),
        CommandClassifier::default(),
        BOT,
    )
    .expect("runtime");
    let reports = runtime.poll_once().await.expect("poll");
    assert!(reports.is_empty());
    assert!(fixture.github.state().marked_read.is_empty());
}

#[tokio::test]
async fn regression_timed_out_action_posts_no_reply() {
    let github = site_github("amihaiemil", "@charlesmike hello");
    github.state().comment_delay = Some(Duration::from_secs(5));
    github.state().notifications = vec![mention_notification("1", SITE_REPO, 5, 10)];
    let fixture = Fixture::new(github);
    let temp = tempfile::tempdir().expect("tempdir");
    let mut runtime = NotificationsRuntime::new(
        settings(temp.path(), 2, Some(Duration::from_millis(50))),
        fixture.services(),
        CommandClassifier::default(),
        BOT,
    )
    .expect("runtime");

    let reports = runtime.poll_once().await.expect("poll");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, ActionStatus::TimedOut);
    assert!(fixture.github.posted().is_empty());
    let log = std::fs::read_to_string(temp.path().join(format!("{}.log", reports[0].action_id)))
        .expect("action log");
    assert!(log.contains("timed out after 50ms"));
}

#[tokio::test]
async fn integration_worker_pool_bounds_concurrent_actions() {
    let github = FakeGithub::with(|state| {
        state.comment_delay = Some(Duration::from_millis(40));
        for (issue, comment_id) in [(1_u64, 11_u64), (2, 12), (3, 13)] {
            state
                .comments
                .insert(comment_id, comment(comment_id, "amihaiemil", "@charlesmike hello"));
            state.notifications.push(mention_notification(
                &issue.to_string(),
                SITE_REPO,
                issue,
                comment_id,
            ));
        }
    });
    let fixture = Fixture::new(github);
    let temp = tempfile::tempdir().expect("tempdir");
    let mut runtime = NotificationsRuntime::new(
        settings(temp.path(), 1, None),
        fixture.services(),
        CommandClassifier::default(),
        BOT,
    )
    .expect("runtime");

    let reports = runtime.poll_once().await.expect("poll");
    assert_eq!(reports.len(), 3);
    assert_eq!(fixture.github.peak.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.github.posted().len(), 3);
}

fn owner_command(fixture: &Fixture, body: &str) -> Command {
    let issue = IssueRef {
        repo: RepoRef::parse(SITE_REPO).expect("slug"),
        number: 5,
    };
    let classification = CommandClassifier::default().classify(body, BOT);
    let repo = RepoView::new(
        issue.repo.clone(),
        fixture.github.clone() as Arc<dyn GithubApi>,
    );
    let comment = RawComment {
        id: 10,
        body: body.to_string(),
        author_login: "amihaiemil".to_string(),
    };
    Command::new(issue, comment, classification, BOT, repo)
}

struct Broken;

#[async_trait]
impl Predicate for Broken {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn evaluate(&self, _command: &Command, _log: &ActionLog) -> Result<bool> {
        bail!("service unavailable")
    }
}

#[async_trait]
impl Effect for Broken {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn criticality(&self) -> Criticality {
        Criticality::Critical
    }

    async fn apply(&self, _command: &Command, _log: &ActionLog) -> Result<()> {
        bail!("service unavailable")
    }
}

struct Always(bool);

#[async_trait]
impl Predicate for Always {
    fn name(&self) -> &'static str {
        "always"
    }

    async fn evaluate(&self, _command: &Command, _log: &ActionLog) -> Result<bool> {
        Ok(self.0)
    }
}

#[tokio::test]
async fn regression_star_twice_in_sequence_stars_once() {
    let fixture = Fixture::new(site_github("amihaiemil", "@charlesmike index this site"));
    let services = fixture.services();
    let command = owner_command(&fixture, "@charlesmike index this site");
    let log = ActionLog::detached("action-star", LOGS);
    let plan = seq(
        Leaf::new(LeafKind::StarRepo, &services),
        seq(Leaf::new(LeafKind::StarRepo, &services), terminal("done")),
    );

    let outcome = Steps::new(plan, reply_and_end(&services, "step.failure.comment"))
        .perform(&command, &log)
        .await;

    assert_eq!(outcome, PlanOutcome::Completed);
    let stars = fixture
        .github
        .calls()
        .iter()
        .filter(|call| call.as_str() == "star")
        .count();
    assert_eq!(stars, 1);
    assert!(fixture.github.posted().is_empty());
}

#[tokio::test]
async fn functional_root_contains_fatal_signal_wherever_it_is_raised() {
    let fixture = Fixture::new(site_github("amihaiemil", "@charlesmike hello"));
    let services = fixture.services();
    let command = owner_command(&fixture, "@charlesmike hello");
    let log = ActionLog::detached("action-root", LOGS);
    let reply = |key| reply_and_end(&services, key);

    let plans: Vec<PlanStep> = vec![
        gate(Broken, reply("hello.comment"), reply("unknown.comment")),
        seq(Broken, reply("hello.comment")),
        gate(
            Always(true),
            seq(
                Leaf::new(LeafKind::Reply("hello.comment"), &services),
                seq(Broken, terminal("unreachable")),
            ),
            reply("unknown.comment"),
        ),
        gate(
            Always(false),
            reply("hello.comment"),
            gate(Always(true), gate(Broken, terminal("a"), terminal("b")), terminal("c")),
        ),
    ];

    for (position, plan) in plans.into_iter().enumerate() {
        let before = fixture.github.posted().len();
        let outcome = Steps::new(plan, reply("step.failure.comment"))
            .perform(&command, &log)
            .await;
        assert_eq!(
            outcome,
            PlanOutcome::Failed { reply_sent: true },
            "plan {position}"
        );
        let posted = fixture.github.posted();
        let failure_replies = posted[before..]
            .iter()
            .filter(|body| body.contains(&format!("{LOGS}/action-root.log")))
            .count();
        assert_eq!(failure_replies, 1, "plan {position}");
    }
}

struct TableRow {
    author: &'static str,
    commander: bool,
    fork: bool,
    slug: &'static str,
    gh_pages: bool,
    /// Text that only the expected reply carries.
    reply_marker: &'static str,
}

const PROCEEDS: &str = "Hi @";

fn table_row(
    author: &'static str,
    commander: bool,
    fork: bool,
    slug: &'static str,
    gh_pages: bool,
    reply_marker: &'static str,
) -> TableRow {
    TableRow {
        author,
        commander,
        fork,
        slug,
        gh_pages,
        reply_marker,
    }
}

#[tokio::test]
async fn integration_precondition_table_routes_each_combination() {
    let commander_denied = "only the repository owner";
    let fork_denied = "is a fork";
    let name_denied = "is not hosting a website";
    let blog = "amihaiemil/blog";
    let rows = [
        table_row("john", false, false, SITE_REPO, false, commander_denied),
        table_row("amihaiemil", false, true, SITE_REPO, false, fork_denied),
        table_row("amihaiemil", false, false, blog, false, name_denied),
        table_row("amihaiemil", false, false, blog, true, PROCEEDS),
        table_row("amihaiemil", false, false, SITE_REPO, false, PROCEEDS),
        table_row("john", true, false, SITE_REPO, false, PROCEEDS),
        table_row("john", true, true, SITE_REPO, false, fork_denied),
    ];
    let markers = [commander_denied, fork_denied, name_denied, PROCEEDS];

    for (position, row) in rows.iter().enumerate() {
        let github = FakeGithub::with(|state| {
            state.repositories.insert(
                row.slug.to_string(),
                repository(row.slug, user("amihaiemil"), row.fork),
            );
            if row.gh_pages {
                state.gh_pages.insert(row.slug.to_string());
            }
            if row.commander {
                state
                    .files
                    .insert(row.slug.to_string(), "commanders:\n  - john\n".to_string());
            }
        });
        let fixture = Fixture::new(github);
        let services = fixture.services();
        let issue = IssueRef {
            repo: RepoRef::parse(row.slug).expect("slug"),
            number: 5,
        };
        let body = "@charlesmike index this site";
        let command = Command::new(
            issue.clone(),
            RawComment {
                id: 10,
                body: body.to_string(),
                author_login: row.author.to_string(),
            },
            CommandClassifier::default().classify(body, BOT),
            BOT,
            RepoView::new(
                issue.repo.clone(),
                fixture.github.clone() as Arc<dyn GithubApi>,
            ),
        );
        let log = ActionLog::detached("action-table", LOGS);
        let plan = super::authorization_planner::general_preconditions(
            &services,
            reply_and_end(&services, "hello.comment"),
        );

        let outcome = Steps::new(plan, reply_and_end(&services, "step.failure.comment"))
            .perform(&command, &log)
            .await;

        assert_eq!(outcome, PlanOutcome::Completed, "row {position}");
        let posted = fixture.github.posted();
        assert_eq!(posted.len(), 1, "row {position}");
        for marker in markers {
            assert_eq!(
                posted[0].contains(marker),
                marker == row.reply_marker,
                "row {position}: marker '{marker}' in {}",
                posted[0]
            );
        }
        if row.commander {
            assert!(!fixture
                .github
                .calls()
                .iter()
                .any(|call| call == "org_membership"));
        }
    }
}
