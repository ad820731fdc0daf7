use ratatui::style::{Color, Modifier, Style};

#[derive(Debug, Clone)]
pub struct Theme {
    // Overall background color to paint the full frame
    pub background_color: Color,
    // Chat message styles
    pub user_prefix_style: Style,
    pub user_text_style: Style,
    pub assistant_prefix_style: Style,
    pub assistant_text_style: Style,

    // Markdown
    pub md_heading_style: Style,
    pub md_inline_code_style: Style,
    pub md_link_style: Style,
    pub md_quote_style: Style,
    pub md_codeblock_text_style: Style,
    pub md_codeblock_bg: Option<Color>,

    // Chrome
    pub sidebar_border_style: Style,
    pub sidebar_item_style: Style,
    pub sidebar_active_style: Style,
    pub streaming_indicator_style: Style,
    pub status_style: Style,
    pub hint_style: Style,
    pub input_border_style: Style,
    pub input_disabled_style: Style,
    pub input_text_style: Style,
    pub input_cursor_style: Style,
}

impl Theme {
    pub fn dark_default() -> Self {
        Theme {
            background_color: Color::Rgb(13, 17, 23),
            user_prefix_style: Style::default()
                .fg(Color::Rgb(121, 192, 255))
                .add_modifier(Modifier::BOLD),
            user_text_style: Style::default().fg(Color::Rgb(121, 192, 255)),
            assistant_prefix_style: Style::default()
                .fg(Color::Rgb(126, 231, 135))
                .add_modifier(Modifier::BOLD),
            assistant_text_style: Style::default().fg(Color::Rgb(230, 237, 243)),

            md_heading_style: Style::default()
                .fg(Color::Rgb(210, 168, 255))
                .add_modifier(Modifier::BOLD),
            md_inline_code_style: Style::default()
                .fg(Color::Rgb(255, 166, 87))
                .bg(Color::Rgb(33, 38, 45)),
            md_link_style: Style::default()
                .fg(Color::Rgb(88, 166, 255))
                .add_modifier(Modifier::UNDERLINED),
            md_quote_style: Style::default().fg(Color::Rgb(139, 148, 158)),
            md_codeblock_text_style: Style::default().fg(Color::Rgb(201, 209, 217)),
            md_codeblock_bg: Some(Color::Rgb(22, 27, 34)),

            sidebar_border_style: Style::default().fg(Color::Rgb(48, 54, 61)),
            sidebar_item_style: Style::default().fg(Color::Rgb(139, 148, 158)),
            sidebar_active_style: Style::default()
                .fg(Color::Rgb(230, 237, 243))
                .bg(Color::Rgb(33, 38, 45))
                .add_modifier(Modifier::BOLD),
            streaming_indicator_style: Style::default().fg(Color::Rgb(126, 231, 135)),
            status_style: Style::default().fg(Color::Rgb(210, 153, 34)),
            hint_style: Style::default().fg(Color::Rgb(110, 118, 129)),
            input_border_style: Style::default().fg(Color::Rgb(88, 166, 255)),
            input_disabled_style: Style::default().fg(Color::Rgb(72, 79, 88)),
            input_text_style: Style::default().fg(Color::Rgb(230, 237, 243)),
            input_cursor_style: Style::default().add_modifier(Modifier::REVERSED),
        }
    }

    /// Style for fenced code blocks when no highlighter output is available.
    pub fn md_codeblock_style(&self) -> Style {
        match self.md_codeblock_bg {
            Some(bg) => self.md_codeblock_text_style.bg(bg),
            None => self.md_codeblock_text_style,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark_default()
    }
}
