#![no_main]

use charles_github_issues::comment_scanner::{find_actionable_mention, mentions_login};
use charles_github_issues::mention::RawComment;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let comments = raw
        .split('\u{0}')
        .enumerate()
        .map(|(index, chunk)| {
            let (author, body) = chunk.split_once('\n').unwrap_or(("someone", chunk));
            RawComment {
                id: index as i64,
                body: body.to_string(),
                author_login: author.to_string(),
            }
        })
        .collect::<Vec<_>>();

    let found = find_actionable_mention(None, &comments, "charlesmike");
    if !found.is_sentinel() {
        assert!(mentions_login(&found.body, "charlesmike"));
        assert!(!found.author_login.eq_ignore_ascii_case("charlesmike"));
    }
});
