#![no_main]

use charles_github_issues::command_classifier::CommandClassifier;
use charles_github_issues::issue_comment::{render_reply, render_response};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let body = String::from_utf8_lossy(data);
    let classifier = CommandClassifier::default();
    let first = classifier.classify(&body, "charlesmike");
    let second = classifier.classify(&body, "charlesmike");
    assert_eq!(first.category, second.category);

    let key = format!("{}.comment", first.category.as_str());
    if let Some(response) = render_response(first.language.as_ref(), &key, &[("author", "fuzz")]) {
        let reply = render_reply(&body, &response);
        assert!(reply.ends_with(response.trim()));
    }
});
