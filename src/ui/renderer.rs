use std::time::Instant;

use crate::core::app::{App, StreamPhase};
use crate::ui::transcript::render_transcript;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

pub const SIDEBAR_WIDTH: u16 = 30;

const HINTS: &str =
    "Ctrl+↑/↓ switch · Ctrl+D delete · PgUp/PgDn scroll · Esc stop · Ctrl+C quit";

/// Breathing indicator shown while a reply is pending.
pub fn pulse_symbol(start: Instant) -> &'static str {
    let elapsed = start.elapsed().as_millis() as f32 / 1000.0;
    let phase = (elapsed * 2.0) % 2.0;
    let intensity = if phase < 1.0 { phase } else { 2.0 - phase };
    if intensity < 0.33 {
        "○"
    } else if intensity < 0.66 {
        "◐"
    } else {
        "●"
    }
}

pub fn ui(f: &mut Frame, app: &mut App) {
    let area = f.area();
    f.render_widget(
        Block::default().style(Style::default().bg(app.ui.theme.background_color)),
        area,
    );

    let main_area = if app.ui.sidebar_collapsed {
        area
    } else {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(SIDEBAR_WIDTH.min(area.width / 2)),
                Constraint::Min(1),
            ])
            .split(area);
        render_sidebar(f, app, columns[0]);
        columns[1]
    };

    let input_height = app.ui.input_line_count() + 2;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(input_height),
            Constraint::Length(1),
        ])
        .split(main_area);

    render_transcript_pane(f, app, rows[0]);
    render_input(f, app, rows[1]);
    render_status(f, app, rows[2]);
}

fn render_sidebar(f: &mut Frame, app: &App, area: Rect) {
    let theme = &app.ui.theme;
    let active = app.threads.active_id();
    let streaming_thread = app.session.in_flight.as_ref().map(|op| op.thread_id);

    let items: Vec<ListItem> = app
        .threads
        .threads()
        .iter()
        .map(|thread| {
            let marker = if Some(thread.id) == streaming_thread {
                "● "
            } else {
                "  "
            };
            let style = if Some(thread.id) == active {
                theme.sidebar_active_style
            } else {
                theme.sidebar_item_style
            };
            ListItem::new(Line::from(vec![
                Span::styled(marker, theme.streaming_indicator_style),
                Span::styled(thread.title(), style),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::RIGHT)
            .border_style(theme.sidebar_border_style)
            .title(" Threads · Ctrl+N new "),
    );
    f.render_widget(list, area);
}

fn render_transcript_pane(f: &mut Frame, app: &mut App, area: Rect) {
    let theme = &app.ui.theme;
    let title = app
        .threads
        .active_id()
        .and_then(|id| app.threads.thread_title(id))
        .unwrap_or_default();
    let mut lines = app
        .active_thread()
        .map(|thread| render_transcript(&thread.messages, theme, app.ui.render_options()))
        .unwrap_or_default();

    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "Start a conversation by typing below.",
            theme.hint_style,
        )));
    } else if app.active_thread_is_streaming() && app.phase() == StreamPhase::Sending {
        lines.push(Line::from(Span::styled(
            "Assistant",
            theme.assistant_prefix_style,
        )));
        lines.push(Line::from(Span::styled(
            pulse_symbol(app.ui.pulse_start),
            theme.streaming_indicator_style,
        )));
    }

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(theme.sidebar_border_style)
        .title(format!(" {title} "));
    let inner = block.inner(area);

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    let total = paragraph.line_count(inner.width);
    app.ui.clamp_scroll(total, inner.height);
    let offset = app.ui.scroll_offset(total, inner.height);

    f.render_widget(paragraph.block(block).scroll((offset, 0)), area);
}

fn render_input(f: &mut Frame, app: &App, area: Rect) {
    f.render_widget(&app.ui.textarea, area);

    if app.is_streaming() && area.width > 4 && area.height > 2 {
        let indicator = Rect::new(area.right().saturating_sub(3), area.y + 1, 1, 1);
        f.render_widget(
            Paragraph::new(pulse_symbol(app.ui.pulse_start))
                .style(app.ui.theme.streaming_indicator_style),
            indicator,
        );
    }
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let theme = &app.ui.theme;
    let line = match &app.ui.status {
        Some(status) => Line::from(Span::styled(status.clone(), theme.status_style)),
        None => Line::from(Span::styled(HINTS, theme.hint_style)),
    };
    f.render_widget(Paragraph::new(line), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Message;
    use crate::utils::test_utils::create_test_app;
    use ratatui::{backend::TestBackend, Terminal};

    fn draw(app: &mut App, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).expect("terminal");
        terminal.draw(|f| ui(f, app)).expect("draw");
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn renders_sidebar_transcript_and_hints() {
        let mut app = create_test_app();
        let id = app.threads.active_id().expect("thread");
        app.threads.append_message(id, Message::user("Plan a trip"));
        app.threads
            .append_message(id, Message::assistant("Sure, **where** to?"));

        let screen = draw(&mut app, 120, 30);
        let top_row = screen.lines().next().expect("top row");
        assert!(top_row.contains("Threads"));
        assert!(top_row.contains(" Plan a trip "), "pane title names the thread");
        assert!(screen.contains("Plan a trip"));
        assert!(screen.contains("Sure, where to?"));
        assert!(screen.contains("Ctrl+C quit"));
    }

    #[test]
    fn collapsed_sidebar_is_not_drawn() {
        let mut app = create_test_app();
        app.ui.sidebar_collapsed = true;
        let screen = draw(&mut app, 60, 20);
        assert!(!screen.contains("Threads"));
        assert!(screen.contains("Start a conversation"));
    }

    #[test]
    fn status_replaces_hints() {
        let mut app = create_test_app();
        app.ui.set_status("Rate limited; retrying in 2s (attempt 1/5)");
        let screen = draw(&mut app, 120, 20);
        assert!(screen.contains("retrying in 2s"));
        assert!(!screen.contains("Ctrl+C quit"));
    }

    #[test]
    fn pending_reply_shows_placeholder() {
        let mut app = create_test_app();
        let id = app.threads.active_id().expect("thread");
        app.threads.append_message(id, Message::user("Hi"));
        app.session.begin(id);

        let screen = draw(&mut app, 120, 20);
        assert!(screen.contains("Assistant"));
        assert!(screen.contains("● Hi"), "sidebar marks the streaming thread");
    }
}
