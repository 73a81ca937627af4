use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use charles_core::LogRotationPolicy;
use charles_github_issues::command_classifier::CommandClassifier;
use charles_github_issues_runtime::github_issues_runtime::elasticsearch_index::ElasticsearchIndex;
use charles_github_issues_runtime::github_issues_runtime::github_api_client::GithubApiClient;
use charles_github_issues_runtime::{
    ActionStatus, BotServices, CrawlRequest, Crawler, NotificationsRuntime, RuntimeSettings,
    WebPage,
};
use httpmock::prelude::*;
use serde_json::json;

const REPO_PATH: &str = "/repos/amihaiemil/amihaiemil.github.io";

#[derive(Default)]
struct ScriptedCrawler {
    requests: Mutex<Vec<CrawlRequest>>,
}

impl ScriptedCrawler {
    fn site(&self, request: &CrawlRequest) -> Vec<WebPage> {
        self.requests
            .lock()
            .expect("requests")
            .push(request.clone());
        vec![
            WebPage {
                url: request.url.clone(),
                title: "Amihai Emil".to_string(),
                content: "Welcome to my blog".to_string(),
            },
            WebPage {
                url: format!("{}/about.html", request.url),
                title: "About".to_string(),
                content: "Java and Rust".to_string(),
            },
        ]
    }
}

#[async_trait]
impl Crawler for ScriptedCrawler {
    async fn crawl_page(&self, request: &CrawlRequest) -> Result<WebPage> {
        let mut pages = self.site(request);
        Ok(pages.remove(0))
    }

    async fn crawl_site(&self, request: &CrawlRequest) -> Result<Vec<WebPage>> {
        Ok(self.site(request))
    }

    async fn crawl_sitemap(&self, request: &CrawlRequest) -> Result<Vec<WebPage>> {
        Ok(self.site(request))
    }
}

fn services(
    github: &MockServer,
    index: &MockServer,
    crawler: Arc<ScriptedCrawler>,
) -> BotServices {
    BotServices {
        github: Arc::new(
            GithubApiClient::new(github.base_url(), "ghp_test".to_string(), 2_000, 2, 1)
                .expect("github client"),
        ),
        index: Arc::new(ElasticsearchIndex::new(index.base_url(), 2_000).expect("index client")),
        crawler,
        tweeter: None,
        mailer: None,
    }
}

fn runtime(services: BotServices, logs_dir: &Path) -> NotificationsRuntime {
    NotificationsRuntime::new(
        RuntimeSettings {
            poll_interval: Duration::from_millis(10),
            poll_once: true,
            max_concurrent_actions: 2,
            action_timeout: Some(Duration::from_secs(30)),
            logs_dir: logs_dir.to_path_buf(),
            logs_base_url: "https://charles.test/logs".to_string(),
            ledger_rotation: LogRotationPolicy::default(),
        },
        services,
        CommandClassifier::default(),
        "charlesmike",
    )
    .expect("runtime")
}

fn mock_mention(server: &MockServer, comment_body: &str) {
    server.mock(|when, then| {
        when.method(GET).path("/notifications");
        then.status(200).json_body(json!([{
            "id": "101",
            "reason": "mention",
            "unread": true,
            "subject": {
                "title": "Please index my blog",
                "type": "Issue",
                "url": format!("https://api.github.com{REPO_PATH}/issues/5"),
                "latest_comment_url": format!("https://api.github.com{REPO_PATH}/issues/comments/10")
            },
            "repository": { "full_name": "amihaiemil/amihaiemil.github.io" }
        }]));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path(format!("{REPO_PATH}/issues/comments/10"));
        then.status(200).json_body(json!({
            "id": 10,
            "body": comment_body,
            "user": { "login": "amihaiemil", "type": "User" }
        }));
    });
}

#[tokio::test]
async fn integration_hello_mention_is_answered_and_marked_read() {
    let github = MockServer::start();
    let index = MockServer::start();
    mock_mention(&github, "@charlesmike hello");
    let reply = github.mock(|when, then| {
        when.method(POST)
            .path(format!("{REPO_PATH}/issues/5/comments"))
            .body_includes("> @charlesmike hello")
            .body_includes("Hi @amihaiemil!");
        then.status(201).json_body(json!({ "id": 11 }));
    });
    let mark_read = github.mock(|when, then| {
        when.method(PUT).path("/notifications");
        then.status(205);
    });
    let temp = tempfile::tempdir().expect("tempdir");

    let mut runtime = runtime(
        services(&github, &index, Arc::new(ScriptedCrawler::default())),
        temp.path(),
    );
    let reports = runtime.poll_once().await.expect("poll");

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, ActionStatus::Completed);
    reply.assert_calls(1);
    mark_read.assert_calls(1);
    let ledger = std::fs::read_to_string(temp.path().join("actions.jsonl")).expect("ledger");
    assert!(ledger.contains("\"category\":\"hello\""));
}

#[tokio::test]
async fn integration_owner_site_is_crawled_and_exported_to_index() {
    let github = MockServer::start();
    let index = MockServer::start();
    mock_mention(&github, "@charlesmike index this site");
    github.mock(|when, then| {
        when.method(GET).path(REPO_PATH);
        then.status(200).json_body(json!({
            "name": "amihaiemil.github.io",
            "full_name": "amihaiemil/amihaiemil.github.io",
            "owner": { "login": "amihaiemil", "type": "User" },
            "fork": false,
            "default_branch": "master"
        }));
    });
    github.mock(|when, then| {
        when.method(GET)
            .path(format!("{REPO_PATH}/contents/.charles.yml"));
        then.status(404).json_body(json!({ "message": "Not Found" }));
    });
    github.mock(|when, then| {
        when.method(GET)
            .path(format!("{REPO_PATH}/branches/gh-pages"));
        then.status(404).json_body(json!({ "message": "Branch not found" }));
    });
    github.mock(|when, then| {
        when.method(GET)
            .path("/user/starred/amihaiemil/amihaiemil.github.io");
        then.status(404);
    });
    let star = github.mock(|when, then| {
        when.method(PUT)
            .path("/user/starred/amihaiemil/amihaiemil.github.io");
        then.status(204);
    });
    let replies = github.mock(|when, then| {
        when.method(POST)
            .path(format!("{REPO_PATH}/issues/5/comments"));
        then.status(201).json_body(json!({ "id": 12 }));
    });
    github.mock(|when, then| {
        when.method(PUT).path("/notifications");
        then.status(205);
    });
    let bulk = index.mock(|when, then| {
        when.method(POST)
            .path("/_bulk")
            .body_includes("\"_index\":\"amihaiemilxamihaiemil.github.io\"")
            .body_includes("\"_id\":\"http://amihaiemil.github.io/about.html\"");
        then.status(200).json_body(json!({ "errors": false, "items": [] }));
    });
    let crawler = Arc::new(ScriptedCrawler::default());
    let temp = tempfile::tempdir().expect("tempdir");

    let mut runtime = runtime(services(&github, &index, crawler.clone()), temp.path());
    let reports = runtime.poll_once().await.expect("poll");

    assert_eq!(reports[0].status, ActionStatus::Completed);
    bulk.assert_calls(1);
    star.assert_calls(1);
    replies.assert_calls(2);
    let requests = crawler.requests.lock().expect("requests").clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "http://amihaiemil.github.io");
    assert_eq!(requests[0].driver, "chrome");
}

#[tokio::test]
async fn regression_unreadable_comment_gets_single_error_reply() {
    let github = MockServer::start();
    let index = MockServer::start();
    github.mock(|when, then| {
        when.method(GET).path("/notifications");
        then.status(200).json_body(json!([{
            "id": "102",
            "reason": "mention",
            "subject": {
                "type": "Issue",
                "url": format!("https://api.github.com{REPO_PATH}/issues/5"),
                "latest_comment_url": format!("https://api.github.com{REPO_PATH}/issues/comments/10")
            },
            "repository": { "full_name": "amihaiemil/amihaiemil.github.io" }
        }]));
    });
    let comment = github.mock(|when, then| {
        when.method(GET)
            .path(format!("{REPO_PATH}/issues/comments/10"));
        then.status(503).body("unavailable");
    });
    let error_reply = github.mock(|when, then| {
        when.method(POST)
            .path(format!("{REPO_PATH}/issues/5/comments"))
            .body_includes("could not process the latest command");
        then.status(201).json_body(json!({ "id": 13 }));
    });
    github.mock(|when, then| {
        when.method(PUT).path("/notifications");
        then.status(205);
    });
    let temp = tempfile::tempdir().expect("tempdir");

    let mut runtime = runtime(
        services(&github, &index, Arc::new(ScriptedCrawler::default())),
        temp.path(),
    );
    let reports = runtime.poll_once().await.expect("poll");

    assert_eq!(reports[0].status, ActionStatus::Errored);
    comment.assert_calls(2);
    error_reply.assert_calls(1);
}
