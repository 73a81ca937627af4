use std::sync::OnceLock;

use regex::Regex;

fn markdown_link_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\[([^\]]*)\]\s*\(([^)\s]+)\)").ok())
        .as_ref()
}

fn backquoted_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"`([^`]+)`").ok()).as_ref()
}

/// URL of the first markdown link (`[text](url)`, whitespace allowed before `(`).
pub fn extract_markdown_link(body: &str) -> Option<String> {
    markdown_link_regex()?
        .captures(body)
        .and_then(|captures| captures.get(2))
        .map(|url| url.as_str().trim().to_string())
}

/// Replace every markdown link with its label text.
pub fn strip_markdown_links(body: &str) -> String {
    match markdown_link_regex() {
        Some(pattern) => pattern.replace_all(body, " $1 ").into_owned(),
        None => body.to_string(),
    }
}

/// Drop every markdown link, label included.
pub fn remove_markdown_links(body: &str) -> String {
    match markdown_link_regex() {
        Some(pattern) => pattern.replace_all(body, " ").into_owned(),
        None => body.to_string(),
    }
}

/// Drop every back-quoted span, e.g. a repo name that happens to read as a keyword.
pub fn remove_backquoted_spans(body: &str) -> String {
    match backquoted_regex() {
        Some(pattern) => pattern.replace_all(body, " ").into_owned(),
        None => body.to_string(),
    }
}

/// First back-quoted token, e.g. the repo name in ``delete `charles` index``.
pub fn extract_backquoted_name(body: &str) -> Option<String> {
    backquoted_regex()?
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|name| name.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Search-index name for a repository: `lowercase(owner) + "x" + lowercase(repo)`.
pub fn index_name(owner: &str, repo_name: &str) -> String {
    format!(
        "{}x{}",
        owner.to_ascii_lowercase(),
        repo_name.to_ascii_lowercase()
    )
}

/// Public site address of a repository.
pub fn site_url(owner: &str, repo_name: &str, has_gh_pages: bool) -> String {
    if has_gh_pages {
        format!("http://{owner}.github.io/{repo_name}")
    } else {
        format!("http://{repo_name}")
    }
}

/// True when `link` is an absolute http(s) URL on this repository's GitHub
/// Pages site.
///
/// Repos with a `gh-pages` branch serve under `{owner}.github.io/{repo}`;
/// otherwise the repo is the `{owner}.github.io` blog itself. Stored pages
/// are keyed by their full URL, so a link without a scheme never matches.
pub fn is_page_hosted_on_github(
    link: &str,
    owner: &str,
    repo_name: &str,
    has_gh_pages: bool,
) -> bool {
    let normalized = link.trim().to_ascii_lowercase();
    let Some(without_scheme) = normalized
        .strip_prefix("https://")
        .or_else(|| normalized.strip_prefix("http://"))
    else {
        return false;
    };
    let expected = if has_gh_pages {
        format!("{owner}.github.io/{repo_name}")
    } else {
        format!("{owner}.github.io")
    }
    .to_ascii_lowercase();
    if !without_scheme.starts_with(&expected) {
        return false;
    }
    let remainder = &without_scheme[expected.len()..];
    remainder.is_empty() || remainder.starts_with('/') || remainder.starts_with('?')
}
