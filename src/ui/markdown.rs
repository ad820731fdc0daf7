//! Markdown to sanitized HTML.
//!
//! Model output is untrusted. Raw HTML in the source is emitted as escaped
//! text and script-capable link or image destinations are replaced, so the
//! result can be embedded in a page as-is.

use crate::core::message::Message;
use crate::utils::syntax;
use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};

const BLOCKED_URL: &str = "#";

fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// `false` for destinations a browser would execute.
pub fn is_safe_url(url: &str) -> bool {
    let compact: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    if compact.starts_with("data:") {
        return compact.starts_with("data:image/");
    }
    !(compact.starts_with("javascript:") || compact.starts_with("vbscript:"))
}

fn sanitize_url(url: CowStr<'_>) -> CowStr<'_> {
    if is_safe_url(&url) {
        url
    } else {
        CowStr::Borrowed(BLOCKED_URL)
    }
}

fn language_from_info(info: &str) -> String {
    info.split_ascii_whitespace()
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '#' | '.'))
        .collect()
}

fn render_code_block(lang: &str, code: &str) -> String {
    if !lang.is_empty() {
        if let Some(highlighted) = syntax::highlight_html(lang, code) {
            return format!(
                "<pre class=\"code hl-code\"><code class=\"language-{}\">{}</code></pre>\n",
                escape_html(lang),
                highlighted
            );
        }
    }
    let class = if lang.is_empty() {
        String::new()
    } else {
        format!(" class=\"language-{}\"", escape_html(lang))
    };
    format!(
        "<pre class=\"code\"><code{}>{}</code></pre>\n",
        class,
        escape_html(code)
    )
}

/// Render markdown to HTML that is safe to inject into a page.
pub fn render_html(markdown: &str) -> String {
    let mut events: Vec<Event<'_>> = Vec::new();
    let mut code_block: Option<(String, String)> = None;

    for event in Parser::new_ext(markdown, parser_options()) {
        if let Some((lang, code)) = code_block.as_mut() {
            match event {
                Event::Text(text) => code.push_str(&text),
                Event::End(TagEnd::CodeBlock) => {
                    let rendered = render_code_block(lang, code);
                    events.push(Event::Html(rendered.into()));
                    code_block = None;
                }
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => language_from_info(&info),
                    CodeBlockKind::Indented => String::new(),
                };
                code_block = Some((lang, String::new()));
            }
            Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => events.push(Event::Start(Tag::Link {
                link_type,
                dest_url: sanitize_url(dest_url),
                title,
                id,
            })),
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) => events.push(Event::Start(Tag::Image {
                link_type,
                dest_url: sanitize_url(dest_url),
                title,
                id,
            })),
            other => events.push(other),
        }
    }

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    out
}

const PAGE_STYLE: &str = r#"
body { margin: 0; background: #0d1117; color: #e6edf3; font: 15px/1.6 -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; }
main { max-width: 860px; margin: 0 auto; padding: 24px; }
h1.thread-title { font-size: 18px; color: #8b949e; font-weight: 500; }
.message { margin: 16px 0; padding: 12px 16px; border-radius: 8px; }
.message.user { background: #1f6feb33; margin-left: 15%; }
.message.assistant { background: #161b22; margin-right: 15%; }
.role { font-size: 12px; text-transform: uppercase; letter-spacing: .05em; color: #8b949e; }
pre.code { background: #161b22; padding: 12px; border-radius: 6px; overflow-x: auto; }
code { font-family: ui-monospace, SFMono-Regular, Menlo, Consolas, monospace; font-size: 13px; }
a { color: #58a6ff; }
table { border-collapse: collapse; }
th, td { border: 1px solid #30363d; padding: 4px 8px; }
blockquote { border-left: 3px solid #30363d; margin-left: 0; padding-left: 12px; color: #8b949e; }
"#;

/// Standalone HTML page for a list of messages, used by `export`.
pub fn render_document(title: &str, messages: &[Message]) -> String {
    let mut body = String::new();
    for message in messages {
        let role = message.role.as_str();
        body.push_str(&format!(
            "<section class=\"message {role}\">\n<div class=\"role\">{role}</div>\n<div class=\"markdown-content\">\n{}</div>\n</section>\n",
            render_html(&message.content)
        ));
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>{PAGE_STYLE}\n{highlight}</style>\n</head>\n<body>\n<main>\n<h1 class=\"thread-title\">{title}</h1>\n{body}</main>\n</body>\n</html>\n",
        title = escape_html(title),
        highlight = syntax::highlight_stylesheet(),
    )
}
