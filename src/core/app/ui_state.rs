use crate::core::config::data::Config;
use crate::ui::theme::Theme;
use crate::ui::transcript::RenderOptions;
use ratatui::prelude::Size;
use ratatui::widgets::{Block, Borders};
use std::time::Instant;
use tui_textarea::TextArea;

/// Terminals at or below this width collapse the sidebar automatically.
pub const NARROW_WIDTH: u16 = 80;

pub struct UiState {
    pub textarea: TextArea<'static>,
    input: String,
    pub status: Option<String>,
    pub sidebar_collapsed: bool,
    pub narrow: bool,
    /// First visible transcript line once the user has scrolled up. `None`
    /// follows new output.
    scroll_top: Option<u16>,
    /// Bottom-most offset seen by the last render.
    max_scroll: u16,
    pub markdown: bool,
    pub syntax: bool,
    pub theme: Theme,
    pub pulse_start: Instant,
    pub exit_requested: bool,
    pub last_term_size: Size,
    input_enabled: bool,
}

impl UiState {
    pub fn new(config: &Config) -> Self {
        Self::new_basic(config.markdown_enabled(), config.syntax_enabled())
    }

    pub(crate) fn new_basic(markdown: bool, syntax: bool) -> Self {
        let mut ui = Self {
            textarea: TextArea::default(),
            input: String::new(),
            status: None,
            sidebar_collapsed: false,
            narrow: false,
            scroll_top: None,
            max_scroll: 0,
            markdown,
            syntax,
            theme: Theme::dark_default(),
            pulse_start: Instant::now(),
            exit_requested: false,
            last_term_size: Size::default(),
            input_enabled: true,
        };
        ui.sync_input_block();
        ui
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            markdown: self.markdown,
            syntax: self.syntax,
        }
    }

    pub fn get_input_text(&self) -> &str {
        &self.input
    }

    pub fn set_input_text(&mut self, text: String) {
        let lines: Vec<String> = if text.is_empty() {
            Vec::new()
        } else {
            text.split('\n').map(str::to_string).collect()
        };
        self.textarea = TextArea::from(lines);
        self.textarea.move_cursor(tui_textarea::CursorMove::Bottom);
        self.textarea.move_cursor(tui_textarea::CursorMove::End);
        self.input = text;
        self.sync_input_block();
    }

    pub fn clear_input(&mut self) {
        self.set_input_text(String::new());
    }

    pub fn apply_textarea_edit<F, R>(&mut self, f: F)
    where
        F: FnOnce(&mut TextArea<'static>) -> R,
    {
        if !self.input_enabled {
            return;
        }
        f(&mut self.textarea);
        self.input = self.textarea.lines().join("\n");
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    /// Typing is refused while a reply is in flight.
    pub fn set_input_enabled(&mut self, enabled: bool) {
        if self.input_enabled != enabled {
            self.input_enabled = enabled;
            self.sync_input_block();
        }
        if enabled {
            self.pulse_start = Instant::now();
        }
    }

    pub fn input_line_count(&self) -> u16 {
        self.textarea.lines().len().clamp(1, 6) as u16
    }

    /// Restyle the input box for the enabled/disabled state.
    pub fn sync_input_block(&mut self) {
        let (title, border, text) = if self.input_enabled {
            (
                " Message (Enter send · Alt+Enter newline · Ctrl+N new · Ctrl+B threads) ",
                self.theme.input_border_style,
                self.theme.input_text_style,
            )
        } else {
            (
                " Waiting for reply (Esc to stop) ",
                self.theme.input_disabled_style,
                self.theme.input_disabled_style,
            )
        };
        self.textarea.set_block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border)
                .title(title),
        );
        self.textarea.set_style(text);
        self.textarea.set_cursor_line_style(ratatui::style::Style::default());
        let cursor = if self.input_enabled {
            self.theme.input_cursor_style
        } else {
            text
        };
        self.textarea.set_cursor_style(cursor);
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    /// Track the terminal width; becoming narrow collapses the sidebar.
    pub fn set_terminal_width(&mut self, width: u16) {
        let narrow = width <= NARROW_WIDTH;
        if narrow && !self.narrow {
            self.sidebar_collapsed = true;
        }
        self.narrow = narrow;
    }

    pub fn toggle_sidebar(&mut self) {
        self.sidebar_collapsed = !self.sidebar_collapsed;
    }

    /// After a thread is created, switched or deleted.
    pub fn after_thread_change(&mut self) {
        if self.narrow {
            self.sidebar_collapsed = true;
        }
        self.scroll_to_bottom();
    }

    /// Pin the view where it is and move it up. New output no longer moves
    /// it until the user returns to the bottom.
    pub fn scroll_up(&mut self, lines: u16) {
        let top = self.scroll_top.unwrap_or(self.max_scroll);
        self.scroll_top = Some(top.saturating_sub(lines));
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let Some(top) = self.scroll_top else {
            return;
        };
        let next = top.saturating_add(lines);
        self.scroll_top = (next < self.max_scroll).then_some(next);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_top = None;
    }

    pub fn is_following(&self) -> bool {
        self.scroll_top.is_none()
    }

    /// First visible line for a transcript of `total` lines in `height` rows.
    pub fn scroll_offset(&self, total: usize, height: u16) -> u16 {
        let max_offset = max_offset(total, height);
        self.scroll_top.map_or(max_offset, |top| top.min(max_offset))
    }

    /// Record the transcript size from a render. A pinned position at or
    /// past the bottom goes back to following.
    pub fn clamp_scroll(&mut self, total: usize, height: u16) {
        self.max_scroll = max_offset(total, height);
        if self.scroll_top.is_some_and(|top| top >= self.max_scroll) {
            self.scroll_top = None;
        }
    }

    pub fn page_height(&self) -> u16 {
        self.last_term_size.height.saturating_sub(8).max(1)
    }
}

fn max_offset(total: usize, height: u16) -> u16 {
    total.saturating_sub(height as usize).min(u16::MAX as usize) as u16
}
