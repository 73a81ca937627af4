use crate::command_classifier::{CommandCategory, Language};
use crate::command_text::{
    extract_markdown_link, remove_backquoted_spans, remove_markdown_links, strip_markdown_links,
};

const GREETINGS: &[&str] = &["hello", "hi", "hey"];

/// English vocabulary and reply templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct English;

fn tokenize(text: &str, bot_login: &str) -> Vec<String> {
    let handle = format!("@{}", bot_login.trim().to_ascii_lowercase());
    let text = text.to_ascii_lowercase();
    let text = if bot_login.trim().is_empty() {
        text
    } else {
        text.replace(&handle, " ")
    };
    text.split(|ch: char| !(ch.is_alphanumeric() || ch == '\''))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Words of a command split by where they may count.
///
/// `own` excludes link labels and back-quoted names, so user-chosen text such
/// as ``delete `hi` index`` never reads as a verb. `labelled` keeps link
/// labels, which may name the target (`[sitemap](..)`, `[this page](..)`).
struct Words {
    own: Vec<String>,
    labelled: Vec<String>,
}

impl Words {
    fn new(body: &str, bot_login: &str) -> Self {
        let unquoted = remove_backquoted_spans(body);
        Self {
            own: tokenize(&remove_markdown_links(&unquoted), bot_login),
            labelled: tokenize(&strip_markdown_links(&unquoted), bot_login),
        }
    }

    fn said(&self, word: &str) -> bool {
        self.own.iter().any(|token| token == word)
    }

    fn mentioned(&self, word: &str) -> bool {
        self.labelled.iter().any(|token| token == word)
    }
}

impl Language for English {
    fn name(&self) -> &'static str {
        "english"
    }

    fn categorize(&self, body: &str, bot_login: &str) -> CommandCategory {
        let words = Words::new(body, bot_login);
        let has_link = extract_markdown_link(body).is_some();
        let delete = words.said("delete");

        if GREETINGS.iter().any(|greeting| words.said(greeting)) {
            return CommandCategory::Hello;
        }
        if delete && has_link && words.mentioned("page") {
            return CommandCategory::DeletePage;
        }
        if words.mentioned("sitemap") && !delete {
            return CommandCategory::IndexSitemap;
        }
        if has_link && words.mentioned("page") {
            return CommandCategory::IndexPage;
        }
        if words.said("index") && !has_link && !delete {
            return CommandCategory::IndexSite;
        }
        if delete && words.said("index") {
            return CommandCategory::DeleteIndex;
        }
        CommandCategory::Unknown
    }

    fn response(&self, key: &str) -> Option<&'static str> {
        let template = match key {
            "hello.comment" => {
                "Hi @{author}! I can help you index your Github-hosted website. Mention me with:\n\n\
                 * `@{bot} index this site` to index the whole site\n\
                 * `@{bot} index [this](link) page` to index one page\n\
                 * `@{bot} index [sitemap](link)` to index the pages of a sitemap\n\
                 * `@{bot} delete [this](link) page` to remove one page from the index\n\
                 * ``@{bot} delete `{name}` index`` to delete the whole index"
            }
            "unknown.comment" => {
                "Sorry @{author}, I did not understand that. Say `@{bot} hello` to see what I can do."
            }
            "index.start.comment" => {
                "@{author} thanks for the request! I started indexing, you can follow the progress [here]({logs})."
            }
            "index.finished.comment" => {
                "@{author} indexing finished, the pages are now searchable. Logs are [here]({logs})."
            }
            "deleteindex.finished.comment" => {
                "@{author} I deleted the index of `{repo}`. Logs are [here]({logs})."
            }
            "deletepage.finished.comment" => {
                "@{author} I removed that page from the index of `{repo}`. Logs are [here]({logs})."
            }
            "index.missing.comment" => {
                "@{author} there is no index for `{repo}`, so there is nothing to delete."
            }
            "denied.commander.comment" => {
                "@{author} only the repository owner, an admin of its organization or a commander listed in `.charles.yml` can ask me to do that."
            }
            "denied.fork.comment" => {
                "@{author} `{repo}` is a fork. I only work with original repositories."
            }
            "denied.name.comment" => {
                "@{author} `{repo}` is not hosting a website: it must be named `{owner}.github.io` or have a `gh-pages` branch."
            }
            "denied.badlink.comment" => {
                "@{author} that link does not point at this repository's website. It should start with `{owner}.github.io`."
            }
            "denied.deleteindex.comment" => {
                "@{author} to delete the index, write the exact name of this repository between back quotes, e.g. ``@{bot} delete `{name}` index``."
            }
            "step.failure.comment" => {
                "@{author} something went wrong while processing your command. Details are in the [logs]({logs})."
            }
            "error.comment" => {
                "I could not process the latest command on this issue because of an unexpected error. Details are in the [logs]({logs})."
            }
            "index.followup.email.subject" => "Repo {repo} successfully indexed",
            "index.followup.email" => {
                "Hello @{author},\n\n\
                 the website of {repo} has been indexed, as you asked in {issue}. \
                 Its pages are now searchable.\n\n\
                 If something looks wrong, mention @{bot} on that issue.\n\n\
                 Charles"
            }
            "tweet.indexsite" => "I just indexed the website of {repo}! {issue}",
            "tweet.indexpage" => "I just indexed a page of {repo}'s website! {issue}",
            "tweet.indexsitemap" => "I just indexed the sitemap of {repo}'s website! {issue}",
            "tweet.deleteindex" => "The index of {repo} was deleted. {issue}",
            "tweet.deletepage" => "A page of {repo} was removed from the index. {issue}",
            _ => return None,
        };
        Some(template)
    }
}
