//! Syntax highlighting shared by the HTML and terminal renderers.
//!
//! Both renderers only highlight languages syntect actually knows; an empty
//! or unknown hint returns `None` and the caller falls back to plain code.

use crate::ui::theme::Theme;
use ratatui::style::Color as TuiColor;
use ratatui::text::{Line, Span};
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, OnceLock};
use syntect::highlighting::ThemeSet;
use syntect::html::{css_for_theme_with_class_style, ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;
use tracing::warn;

const SYNTECT_THEME: &str = "base16-ocean.dark";
const FALLBACK_THEMES: [&str; 2] = ["base16-eighties.dark", "base16-mocha.dark"];
const CACHE_CAPACITY: usize = 64;

/// Class prefix keeps highlighter classes apart from page classes.
pub const HTML_CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "hl-" };

// Simple FIFO cache (bounded) for highlighted blocks
// key = (lang_norm, hash)

fn hash_code(lang: &str, code: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    lang.hash(&mut hasher);
    code.hash(&mut hasher);
    hasher.finish()
}

struct SimpleCache {
    map: HashMap<(String, u64), Vec<Line<'static>>>,
    order: VecDeque<(String, u64)>,
    cap: usize,
}

impl SimpleCache {
    fn new(cap: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    fn get(&self, k: &(String, u64)) -> Option<Vec<Line<'static>>> {
        self.map.get(k).cloned()
    }

    fn put(&mut self, k: (String, u64), v: Vec<Line<'static>>) {
        if !self.map.contains_key(&k) {
            self.order.push_back(k.clone());
        }
        self.map.insert(k, v);
        while self.map.len() > self.cap {
            match self.order.pop_front() {
                Some(old) => {
                    self.map.remove(&old);
                }
                None => break,
            }
        }
    }
}

static LINE_CACHE: Mutex<Option<SimpleCache>> = Mutex::new(None);

fn cache() -> MutexGuard<'static, Option<SimpleCache>> {
    let mut guard = LINE_CACHE.lock().unwrap_or_else(|e| e.into_inner());
    if guard.is_none() {
        *guard = Some(SimpleCache::new(CACHE_CAPACITY));
    }
    guard
}

fn syntax_set() -> &'static SyntaxSet {
    static SYNTAX_SET: OnceLock<SyntaxSet> = OnceLock::new();
    SYNTAX_SET.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn syntect_theme() -> Option<&'static syntect::highlighting::Theme> {
    static THEME_SET: OnceLock<ThemeSet> = OnceLock::new();
    let themes = &THEME_SET.get_or_init(ThemeSet::load_defaults).themes;
    themes
        .get(SYNTECT_THEME)
        .or_else(|| FALLBACK_THEMES.iter().find_map(|name| themes.get(*name)))
}

pub(crate) fn normalize_lang_hint(s: &str) -> String {
    let t = s.trim().to_ascii_lowercase();
    match t.as_str() {
        "py" | "python" => "python".into(),
        "bash" | "sh" | "zsh" | "shell" => "bash".into(),
        "js" | "javascript" | "jsx" => "javascript".into(),
        "ts" | "tsx" | "typescript" => "typescript".into(),
        "yaml" | "yml" => "yaml".into(),
        "rust" | "rs" => "rust".into(),
        "c" | "h" => "c".into(),
        "cpp" | "c++" | "cc" | "cxx" | "hpp" | "hxx" => "cpp".into(),
        "csharp" | "c#" | "cs" => "cs".into(),
        "kotlin" | "kt" => "kotlin".into(),
        other => other.into(),
    }
}

/// Resolve a fence info word to a syntect grammar.
pub fn find_syntax(lang_hint: &str) -> Option<&'static SyntaxReference> {
    let lang_norm = normalize_lang_hint(lang_hint);
    if lang_norm.is_empty() {
        return None;
    }
    syntax_set().find_syntax_by_token(&lang_norm)
}

pub fn is_recognized_language(lang_hint: &str) -> bool {
    find_syntax(lang_hint).is_some()
}

/// Highlight `code` into class-annotated, HTML-escaped markup.
pub fn highlight_html(lang_hint: &str, code: &str) -> Option<String> {
    let syntax = find_syntax(lang_hint)?;
    let mut generator =
        ClassedHTMLGenerator::new_with_class_style(syntax, syntax_set(), HTML_CLASS_STYLE);
    for line in LinesWithEndings::from(code) {
        if let Err(err) = generator.parse_html_for_line_which_includes_newline(line) {
            warn!(language = lang_hint, error = %err, "syntax highlighting failed");
            return None;
        }
    }
    Some(generator.finalize())
}

/// Stylesheet matching the classes produced by [`highlight_html`].
pub fn highlight_stylesheet() -> String {
    syntect_theme()
        .and_then(|theme| css_for_theme_with_class_style(theme, HTML_CLASS_STYLE).ok())
        .unwrap_or_default()
}

fn to_tui_color(c: syntect::highlighting::Color) -> TuiColor {
    TuiColor::Rgb(c.r, c.g, c.b)
}

/// Highlight `code` into styled terminal lines, one per source line.
pub fn highlight_code_block(
    lang_hint: &str,
    code: &str,
    theme: &Theme,
) -> Option<Vec<Line<'static>>> {
    let syntax = find_syntax(lang_hint)?;
    let syn_theme = syntect_theme()?;

    let lang_norm = normalize_lang_hint(lang_hint);
    let key = (lang_norm.clone(), hash_code(&lang_norm, code));
    if let Some(lines) = cache().as_ref().and_then(|c| c.get(&key)) {
        return Some(lines);
    }

    let mut h = syntect::easy::HighlightLines::new(syntax, syn_theme);
    let bg = theme.md_codeblock_bg;

    let mut out: Vec<Line<'static>> = Vec::new();
    for line in LinesWithEndings::from(code) {
        let ranges = match h.highlight_line(line, syntax_set()) {
            Ok(ranges) => ranges,
            Err(err) => {
                warn!(language = lang_hint, error = %err, "syntax highlighting failed");
                return None;
            }
        };
        let mut spans: Vec<Span<'static>> = Vec::new();
        for (style, text) in ranges {
            let frag = text.strip_suffix('\n').unwrap_or(text);
            let frag = frag.strip_suffix('\r').unwrap_or(frag);
            let mut st = ratatui::style::Style::default().fg(to_tui_color(style.foreground));
            if let Some(bgcol) = bg {
                st = st.bg(bgcol);
            }
            spans.push(Span::styled(frag.replace('\t', "    "), st));
        }
        out.push(Line::from(spans));
    }

    if let Some(c) = cache().as_mut() {
        c.put(key, out.clone());
    }
    Some(out)
}
