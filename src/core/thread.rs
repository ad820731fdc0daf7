use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthChar;

use crate::core::message::Message;

const TITLE_MAX_WIDTH: usize = 28;
const UNTITLED: &str = "New thread";

/// Creation-time derived thread identifier (milliseconds since the epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(u64);

impl ThreadId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Allocate an id from `now_millis` that is strictly greater than
    /// `last`, the highest id handed out so far.
    pub fn allocate(now_millis: u64, last: Option<ThreadId>) -> Self {
        match last {
            Some(ThreadId(max)) if now_millis <= max => ThreadId(max + 1),
            _ => ThreadId(now_millis),
        }
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ThreadId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ThreadId)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Thread {
    pub fn new(id: ThreadId) -> Self {
        Self {
            id,
            messages: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Sidebar label: the first line of the first user message, truncated to
    /// a fixed display width.
    pub fn title(&self) -> String {
        let first_line = self
            .messages
            .iter()
            .find(|m| m.is_user())
            .and_then(|m| m.content.lines().map(str::trim).find(|l| !l.is_empty()));

        let Some(line) = first_line else {
            return UNTITLED.to_string();
        };

        let mut width = 0;
        let mut title = String::new();
        for ch in line.chars() {
            let w = ch.width().unwrap_or(0);
            if width + w > TITLE_MAX_WIDTH {
                title.push('…');
                return title;
            }
            width += w;
            title.push(ch);
        }
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_uses_clock_when_ahead() {
        assert_eq!(
            ThreadId::allocate(100, Some(ThreadId::new(20))),
            ThreadId::new(100)
        );
    }

    #[test]
    fn allocate_bumps_past_collisions() {
        assert_eq!(
            ThreadId::allocate(100, Some(ThreadId::new(101))),
            ThreadId::new(102)
        );
        assert_eq!(
            ThreadId::allocate(100, Some(ThreadId::new(100))),
            ThreadId::new(101)
        );
        assert_eq!(ThreadId::allocate(5, None), ThreadId::new(5));
    }

    #[test]
    fn title_prefers_first_user_line() {
        let mut thread = Thread::new(ThreadId::new(1));
        assert_eq!(thread.title(), "New thread");

        thread.messages.push(Message::user("\n  How do lifetimes work?\nmore"));
        thread.messages.push(Message::assistant("They..."));
        assert_eq!(thread.title(), "How do lifetimes work?");
    }

    #[test]
    fn long_titles_are_truncated_by_width() {
        let mut thread = Thread::new(ThreadId::new(1));
        thread
            .messages
            .push(Message::user("a very long question that keeps going and going"));
        let title = thread.title();
        assert!(title.ends_with('…'));
        assert_eq!(title.chars().count(), TITLE_MAX_WIDTH + 1);
    }

    #[test]
    fn ids_parse_from_text() {
        assert_eq!("1700000000000".parse::<ThreadId>(), Ok(ThreadId::new(1_700_000_000_000)));
        assert!("null".parse::<ThreadId>().is_err());
    }
}
