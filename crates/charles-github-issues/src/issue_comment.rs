use crate::command_classifier::Language;

/// Substitute `{name}` placeholders in `template`. Unknown placeholders are kept verbatim.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            rendered.push_str(&rest[open..]);
            return rendered;
        };
        let key = &after_open[..close];
        match vars.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => rendered.push_str(value),
            None => {
                rendered.push('{');
                rendered.push_str(key);
                rendered.push('}');
            }
        }
        rest = &after_open[close + 1..];
    }
    rendered.push_str(rest);
    rendered
}

/// Render a localized response, or `None` when the language has no such key.
pub fn render_response(
    language: &dyn Language,
    key: &str,
    vars: &[(&str, &str)],
) -> Option<String> {
    language
        .response(key)
        .map(|template| render_template(template, vars))
}

/// Quote the command being answered, then append the response.
pub fn render_reply(command_body: &str, response: &str) -> String {
    let quoted = command_body
        .trim()
        .lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{quoted}\n\n{}", response.trim())
}
