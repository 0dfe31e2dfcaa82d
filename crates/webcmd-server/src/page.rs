//! HTML page rendering.

use askama::Template;

/// Message shown once the subprocess has exited.
pub const DONE_MESSAGE: &str = "Commander is done.  Type 'restart' to resurrect it";

/// The single page: title, captured output, input form.
#[derive(Template)]
#[template(path = "page.html")]
struct PageTemplate<'a> {
    title: String,
    body: &'a str,
}

/// Render the page for `command` with `body` as the captured output.
pub fn render(command: &str, body: &str) -> askama::Result<String> {
    PageTemplate {
        title: title_case(command),
        body,
    }
    .render()
}

/// Upper-case the first letter of every whitespace-separated word.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && !c.is_whitespace() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}
