//! Resolution of the single actionable mention in an issue thread.
//!
//! A bot reply closes every mention posted before it, so only a mention
//! strictly newer than the bot's last comment can be answered.

use crate::mention::RawComment;

/// Return true when `body` contains `@login` as a whole handle.
pub fn mentions_login(body: &str, login: &str) -> bool {
    let login = login.trim();
    if login.is_empty() {
        return false;
    }
    let needle = format!("@{}", login.to_ascii_lowercase());
    let haystack = body.to_ascii_lowercase();
    let mut offset = 0;
    while let Some(found) = haystack[offset..].find(&needle) {
        let start = offset + found;
        let end = start + needle.len();
        let preceded_by_handle_char = haystack[..start]
            .chars()
            .next_back()
            .is_some_and(is_handle_char);
        let followed_by_handle_char = haystack[end..].chars().next().is_some_and(is_handle_char);
        if !preceded_by_handle_char && !followed_by_handle_char {
            return true;
        }
        offset = end;
    }
    false
}

fn is_handle_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-'
}

fn is_authored_by(comment: &RawComment, login: &str) -> bool {
    comment.author_login.eq_ignore_ascii_case(login.trim())
}

/// Find the most recent unanswered mention of `bot_login`.
///
/// `latest` is the comment the notification pointed at; when it already
/// mentions the bot it is returned without scanning. Otherwise `comments`
/// are walked newest to oldest by id: a bot-authored comment ends the scan
/// with the sentinel, a mention is returned. No match yields the sentinel.
pub fn find_actionable_mention(
    latest: Option<&RawComment>,
    comments: &[RawComment],
    bot_login: &str,
) -> RawComment {
    if let Some(latest) = latest {
        if !is_authored_by(latest, bot_login) && mentions_login(&latest.body, bot_login) {
            return latest.clone();
        }
    }

    let mut ordered = comments.iter().collect::<Vec<_>>();
    ordered.sort_by(|left, right| right.id.cmp(&left.id));
    for comment in ordered {
        if is_authored_by(comment, bot_login) {
            return RawComment::sentinel();
        }
        if mentions_login(&comment.body, bot_login) {
            return comment.clone();
        }
    }
    RawComment::sentinel()
}
