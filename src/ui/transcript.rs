//! Markdown to styled terminal lines for the live chat view.

use crate::core::message::Message;
use crate::ui::theme::Theme;
use crate::utils::syntax;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use unicode_width::UnicodeWidthStr;

const RULE_WIDTH: usize = 32;
const QUOTE_PREFIX: &str = "│ ";
const LIST_INDENT: &str = "  ";

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub markdown: bool,
    pub syntax: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            markdown: true,
            syntax: true,
        }
    }
}

/// Role header, rendered body and a trailing blank line.
pub fn render_message_lines(
    message: &Message,
    theme: &Theme,
    options: RenderOptions,
) -> Vec<Line<'static>> {
    let (label, label_style, text_style) = if message.is_user() {
        ("You", theme.user_prefix_style, theme.user_text_style)
    } else {
        (
            "Assistant",
            theme.assistant_prefix_style,
            theme.assistant_text_style,
        )
    };

    let mut lines = vec![Line::from(Span::styled(label, label_style))];
    if options.markdown {
        lines.extend(render_markdown_lines(
            &message.content,
            theme,
            options.syntax,
            text_style,
        ));
    } else {
        lines.extend(
            message
                .content
                .lines()
                .map(|line| Line::from(Span::styled(line.to_string(), text_style))),
        );
    }
    lines.push(Line::default());
    lines
}

/// Lines for a whole thread, in order.
pub fn render_transcript(
    messages: &[Message],
    theme: &Theme,
    options: RenderOptions,
) -> Vec<Line<'static>> {
    messages
        .iter()
        .flat_map(|message| render_message_lines(message, theme, options))
        .collect()
}

pub fn render_markdown_lines(
    markdown: &str,
    theme: &Theme,
    syntax: bool,
    base_style: Style,
) -> Vec<Line<'static>> {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut renderer = LineRenderer::new(theme, syntax, base_style);
    for event in Parser::new_ext(markdown, options) {
        renderer.handle(event);
    }
    renderer.finish()
}

struct TableState {
    rows: Vec<Vec<String>>,
    header_rows: usize,
    cell: String,
}

struct LineRenderer<'t> {
    theme: &'t Theme,
    syntax: bool,
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    quote_depth: usize,
    // One entry per open list; `Some(n)` is the next ordinal.
    lists: Vec<Option<u64>>,
    link_urls: Vec<String>,
    code_block: Option<(String, String)>,
    table: Option<TableState>,
}

impl<'t> LineRenderer<'t> {
    fn new(theme: &'t Theme, syntax: bool, base_style: Style) -> Self {
        Self {
            theme,
            syntax,
            lines: Vec::new(),
            current: Vec::new(),
            styles: vec![base_style],
            quote_depth: 0,
            lists: Vec::new(),
            link_urls: Vec::new(),
            code_block: None,
            table: None,
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, patch: Style) {
        let next = self.style().patch(patch);
        self.styles.push(next);
    }

    fn pop_style(&mut self) {
        if self.styles.len() > 1 {
            self.styles.pop();
        }
    }

    fn line_prefix(&self) -> Vec<Span<'static>> {
        let mut prefix = Vec::new();
        if self.quote_depth > 0 {
            prefix.push(Span::styled(
                QUOTE_PREFIX.repeat(self.quote_depth),
                self.theme.md_quote_style,
            ));
        }
        prefix
    }

    fn push_text(&mut self, text: String, style: Style) {
        if let Some(table) = self.table.as_mut() {
            table.cell.push_str(&text);
            return;
        }
        if self.current.is_empty() {
            self.current = self.line_prefix();
        }
        self.current.push(Span::styled(text, style));
    }

    fn flush_line(&mut self) {
        if !self.current.is_empty() {
            let spans = std::mem::take(&mut self.current);
            self.lines.push(Line::from(spans));
        }
    }

    fn blank_line(&mut self) {
        self.flush_line();
        let last_blank = self.lines.last().is_none_or(|line| line.width() == 0);
        if !last_blank {
            self.lines.push(Line::default());
        }
    }

    fn handle(&mut self, event: Event<'_>) {
        if let Some((_, code)) = self.code_block.as_mut() {
            match event {
                Event::Text(text) => code.push_str(&text),
                Event::End(TagEnd::CodeBlock) => self.finish_code_block(),
                _ => {}
            }
            return;
        }

        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => {
                let style = self.style();
                self.push_text(text.into_string(), style);
            }
            Event::Code(code) => {
                let style = self.style().patch(self.theme.md_inline_code_style);
                self.push_text(code.into_string(), style);
            }
            Event::Html(raw) | Event::InlineHtml(raw) => {
                let style = self.style();
                for (i, part) in raw.split('\n').enumerate() {
                    if i > 0 {
                        self.flush_line();
                    }
                    if !part.is_empty() {
                        self.push_text(part.to_string(), style);
                    }
                }
            }
            Event::SoftBreak => {
                let style = self.style();
                self.push_text(" ".into(), style);
            }
            Event::HardBreak => self.flush_line(),
            Event::Rule => {
                self.blank_line();
                self.lines.push(Line::from(Span::styled(
                    "─".repeat(RULE_WIDTH),
                    self.theme.md_quote_style,
                )));
                self.lines.push(Line::default());
            }
            Event::TaskListMarker(checked) => {
                let style = self.style();
                self.push_text(if checked { "[x] " } else { "[ ] " }.into(), style);
            }
            Event::FootnoteReference(label) => {
                let style = self.style();
                self.push_text(format!("[^{label}]"), style);
            }
            _ => {}
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading { level, .. } => {
                self.blank_line();
                self.push_style(self.theme.md_heading_style);
                let style = self.style();
                self.push_text(format!("{} ", "#".repeat(heading_depth(level))), style);
            }
            Tag::BlockQuote(_) => {
                self.flush_line();
                self.quote_depth += 1;
                self.push_style(self.theme.md_quote_style);
            }
            Tag::CodeBlock(kind) => {
                self.blank_line();
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_ascii_whitespace()
                        .next()
                        .unwrap_or("")
                        .to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.code_block = Some((lang, String::new()));
            }
            Tag::List(start) => {
                self.flush_line();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush_line();
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(next)) => {
                        let marker = format!("{next}. ");
                        *next += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                let style = self.style();
                self.push_text(format!("{}{}", LIST_INDENT.repeat(depth), marker), style);
            }
            Tag::Emphasis => self.push_style(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => {
                self.push_style(Style::default().add_modifier(Modifier::CROSSED_OUT))
            }
            Tag::Link { dest_url, .. } => {
                self.link_urls.push(dest_url.into_string());
                self.push_style(self.theme.md_link_style);
            }
            Tag::Image { dest_url, .. } => {
                self.link_urls.push(dest_url.into_string());
                self.push_style(self.theme.md_link_style);
                let style = self.style();
                self.push_text("[image: ".into(), style);
            }
            Tag::Table(_) => {
                self.blank_line();
                self.table = Some(TableState {
                    rows: Vec::new(),
                    header_rows: 0,
                    cell: String::new(),
                });
            }
            Tag::TableHead | Tag::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.rows.push(Vec::new());
                }
            }
            Tag::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.clear();
                }
            }
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                if self.lists.is_empty() {
                    self.blank_line();
                } else {
                    self.flush_line();
                }
            }
            TagEnd::Heading(_) => {
                self.pop_style();
                self.blank_line();
            }
            TagEnd::BlockQuote(_) => {
                self.flush_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.pop_style();
                if self.quote_depth == 0 {
                    self.blank_line();
                }
            }
            TagEnd::List(_) => {
                self.flush_line();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Item => self.flush_line(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link => {
                self.pop_style();
                if let Some(url) = self.link_urls.pop() {
                    if !url.is_empty() {
                        self.push_text(format!(" ({url})"), self.theme.hint_style);
                    }
                }
            }
            TagEnd::Image => {
                let style = self.style();
                self.push_text("]".into(), style);
                self.pop_style();
                if let Some(url) = self.link_urls.pop() {
                    self.push_text(format!(" ({url})"), self.theme.hint_style);
                }
            }
            TagEnd::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.header_rows = table.rows.len();
                }
            }
            TagEnd::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    let cell = std::mem::take(&mut table.cell);
                    if let Some(row) = table.rows.last_mut() {
                        row.push(cell.trim().to_string());
                    }
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    self.emit_table(table);
                }
                self.blank_line();
            }
            _ => {}
        }
    }

    fn finish_code_block(&mut self) {
        let Some((lang, code)) = self.code_block.take() else {
            return;
        };
        let highlighted = if self.syntax {
            syntax::highlight_code_block(&lang, &code, self.theme)
        } else {
            None
        };
        let block = highlighted.unwrap_or_else(|| {
            let style = self.theme.md_codeblock_style();
            code.lines()
                .map(|line| Line::from(Span::styled(line.replace('\t', "    "), style)))
                .collect()
        });
        for line in block {
            let mut spans = self.line_prefix();
            spans.extend(line.spans);
            self.lines.push(Line::from(spans));
        }
        self.lines.push(Line::default());
    }

    fn emit_table(&mut self, table: TableState) {
        let columns = table.rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut widths = vec![0usize; columns];
        for row in &table.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(UnicodeWidthStr::width(cell.as_str()));
            }
        }

        let base = self.style();
        for (index, row) in table.rows.iter().enumerate() {
            let is_header = index < table.header_rows;
            let cell_style = if is_header {
                base.add_modifier(Modifier::BOLD)
            } else {
                base
            };
            let mut spans = self.line_prefix();
            for (i, width) in widths.iter().enumerate() {
                if i > 0 {
                    spans.push(Span::styled(" │ ", self.theme.md_quote_style));
                }
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                let pad = width.saturating_sub(UnicodeWidthStr::width(cell));
                spans.push(Span::styled(format!("{cell}{}", " ".repeat(pad)), cell_style));
            }
            self.lines.push(Line::from(spans));

            if is_header && index + 1 == table.header_rows {
                let rule = widths
                    .iter()
                    .map(|w| "─".repeat(*w))
                    .collect::<Vec<_>>()
                    .join("─┼─");
                let mut spans = self.line_prefix();
                spans.push(Span::styled(rule, self.theme.md_quote_style));
                self.lines.push(Line::from(spans));
            }
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        if self.code_block.is_some() {
            // Unterminated fence while the reply is still streaming.
            self.finish_code_block();
        }
        self.flush_line();
        while self.lines.last().is_some_and(|line| line.width() == 0) {
            self.lines.pop();
        }
        self.lines
    }
}

fn heading_depth(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
