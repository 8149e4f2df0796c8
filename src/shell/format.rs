use super::ChatMessage;
use regex::Regex;

static ANSI_ESCAPE: &str = r"\x1B[@-_][0-?]*[ -/]*[@-~]";

static ANSI_TAGS: [(&str, &str); 4] = [
    ("\x1b[1m", "<b>"),
    ("\x1b[0m", "</b>"),
    ("\x1b[95m", "<span style=\"color: magenta;\">"),
    ("\x1b[00m", "</span>"),
];

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Turns bold and magenta escape codes into HTML tags and drops every other
/// escape sequence. The text itself is HTML escaped.
pub fn ansi_to_html(text: &str) -> String {
    let mut html = escape_html(text);
    for (code, tag) in ANSI_TAGS {
        html = html.replace(code, tag);
    }
    match Regex::new(ANSI_ESCAPE) {
        Ok(ansi_escape) => ansi_escape.replace_all(&html, "").into_owned(),
        Err(e) => {
            log::error!("Invalid escape pattern: {}", e);
            html
        }
    }
}

/// A standalone HTML page holding the whole transcript.
pub fn transcript_html(messages: &[ChatMessage]) -> String {
    let mut body = String::new();
    for message in messages {
        body.push_str(&format!(
            "<div class=\"message\">\n<strong>{} {}</strong>\n<pre>{}</pre>\n</div>\n",
            message.avatar,
            escape_html(&message.author),
            ansi_to_html(&message.content)
        ));
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>TechSage Chat</title>\n</head>\n<body>\n<h1>TechSage Chat</h1>\n{}</body>\n</html>\n",
        body
    )
}
