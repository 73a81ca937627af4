use std::collections::{HashSet, VecDeque};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;

use super::bot_services::{CrawlRequest, Crawler, WebPage};

fn title_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok())
        .as_ref()
}

fn hidden_block_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<head[^>]*>.*?</head>|<!--.*?-->").ok()
        })
        .as_ref()
}

fn tag_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<[^>]*>").ok()).as_ref()
}

fn href_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"(?i)<a\s[^>]*href\s*=\s*["']([^"'#]+)"#).ok())
        .as_ref()
}

/// Sitemap indexes nested deeper than this are not followed.
const MAX_SITEMAP_DEPTH: usize = 3;

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title and visible text of an HTML document.
pub fn page_from_html(url: &str, html: &str) -> WebPage {
    let title = title_regex()
        .and_then(|pattern| pattern.captures(html))
        .and_then(|captures| captures.get(1))
        .map(|title| collapse_whitespace(&decode_entities(title.as_str())))
        .unwrap_or_default();
    let visible = match hidden_block_regex() {
        Some(pattern) => pattern.replace_all(html, " ").into_owned(),
        None => html.to_string(),
    };
    let text = match tag_regex() {
        Some(pattern) => pattern.replace_all(&visible, " ").into_owned(),
        None => visible,
    };
    WebPage {
        url: url.to_string(),
        title,
        content: collapse_whitespace(&decode_entities(&text)),
    }
}

/// Absolute links of `html` that stay under `root`.
pub fn same_site_links(root: &Url, page: &Url, html: &str) -> Vec<Url> {
    let Some(pattern) = href_regex() else {
        return Vec::new();
    };
    let root_path = root.path().trim_end_matches('/');
    pattern
        .captures_iter(html)
        .filter_map(|captures| captures.get(1))
        .filter_map(|href| page.join(href.as_str().trim()).ok())
        .filter(|link| matches!(link.scheme(), "http" | "https"))
        .filter(|link| link.host_str() == root.host_str())
        .filter(|link| link.path().starts_with(root_path))
        .map(|mut link| {
            link.set_fragment(None);
            link
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// `<loc>` entries of a sitemap, split by the kind of document they come from.
pub enum SitemapEntries {
    /// `<urlset>`: addresses of pages.
    Pages(Vec<String>),
    /// `<sitemapindex>`: addresses of further sitemaps.
    Sitemaps(Vec<String>),
}

/// Reads a sitemap or sitemap index. CDATA sections and entities are decoded
/// by the XML parser.
pub fn parse_sitemap(xml: &str) -> Result<SitemapEntries> {
    let document = roxmltree::Document::parse(xml.trim_start()).context("invalid sitemap xml")?;
    let root = document.root_element();
    let locations = root
        .descendants()
        .filter(|node| node.has_tag_name("loc"))
        .filter_map(|node| node.text())
        .map(str::trim)
        .filter(|loc| !loc.is_empty())
        .map(str::to_string)
        .collect();
    match root.tag_name().name() {
        "urlset" => Ok(SitemapEntries::Pages(locations)),
        "sitemapindex" => Ok(SitemapEntries::Sitemaps(locations)),
        other => bail!("unexpected sitemap root element <{other}>"),
    }
}

/// Plain HTTP crawler. Pages are fetched without a browser, so the
/// requested driver is only logged.
pub struct HttpCrawler {
    http: reqwest::Client,
    max_pages: usize,
}

impl HttpCrawler {
    pub fn new(request_timeout_ms: u64, max_pages: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("charles-github-bot")
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create crawler http client")?;
        Ok(Self {
            http,
            max_pages: max_pages.max(1),
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("fetching {url} failed with status {}", status.as_u16());
        }
        response
            .text()
            .await
            .with_context(|| format!("failed to read body of {url}"))
    }
}

#[async_trait]
impl Crawler for HttpCrawler {
    async fn crawl_page(&self, request: &CrawlRequest) -> Result<WebPage> {
        tracing::debug!(url = %request.url, driver = %request.driver, "crawling page");
        let html = self.fetch(&request.url).await?;
        Ok(page_from_html(&request.url, &html))
    }

    async fn crawl_site(&self, request: &CrawlRequest) -> Result<Vec<WebPage>> {
        tracing::debug!(url = %request.url, driver = %request.driver, "crawling site");
        let root = Url::parse(&request.url)
            .with_context(|| format!("invalid site address {}", request.url))?;
        let mut queue = VecDeque::from([root.clone()]);
        let mut seen = HashSet::from([root.to_string()]);
        let mut pages = Vec::new();
        while let Some(url) = queue.pop_front() {
            if pages.len() >= self.max_pages {
                break;
            }
            let html = match self.fetch(url.as_str()).await {
                Ok(html) => html,
                Err(error) if pages.is_empty() => return Err(error),
                Err(error) => {
                    tracing::warn!(url = %url, "skipping page: {error:#}");
                    continue;
                }
            };
            for link in same_site_links(&root, &url, &html) {
                if seen.insert(link.to_string()) {
                    queue.push_back(link);
                }
            }
            pages.push(page_from_html(url.as_str(), &html));
        }
        Ok(pages)
    }

    async fn crawl_sitemap(&self, request: &CrawlRequest) -> Result<Vec<WebPage>> {
        tracing::debug!(url = %request.url, driver = %request.driver, "crawling sitemap");
        let mut pending = VecDeque::from([(request.url.clone(), 0_usize)]);
        let mut seen_sitemaps = HashSet::from([request.url.clone()]);
        let mut seen_pages = HashSet::new();
        let mut locations = Vec::new();
        while let Some((url, depth)) = pending.pop_front() {
            if locations.len() >= self.max_pages {
                break;
            }
            let entries = match self.fetch(&url).await.and_then(|xml| parse_sitemap(&xml)) {
                Ok(entries) => entries,
                Err(error) if depth == 0 => return Err(error),
                Err(error) => {
                    tracing::warn!(url = %url, "skipping sitemap: {error:#}");
                    continue;
                }
            };
            match entries {
                SitemapEntries::Pages(pages) => {
                    for page in pages {
                        if locations.len() >= self.max_pages {
                            break;
                        }
                        if seen_pages.insert(page.clone()) {
                            locations.push(page);
                        }
                    }
                }
                SitemapEntries::Sitemaps(nested) if depth < MAX_SITEMAP_DEPTH => {
                    for sitemap in nested {
                        if seen_sitemaps.insert(sitemap.clone()) {
                            pending.push_back((sitemap, depth + 1));
                        }
                    }
                }
                SitemapEntries::Sitemaps(nested) => {
                    tracing::warn!(url = %url, skipped = nested.len(), "sitemap index nested too deep");
                }
            }
        }

        let mut pages = Vec::new();
        for location in locations {
            match self.fetch(&location).await {
                Ok(html) => pages.push(page_from_html(&location, &html)),
                Err(error) => tracing::warn!(url = %location, "skipping page: {error:#}"),
            }
        }
        Ok(pages)
    }
}
