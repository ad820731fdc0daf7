//! Key handling for the chat screen.
//!
//! Keys either become [`AppAction`]s for the controller or edits applied
//! straight to the input box. Edits are dropped while a reply is in flight.

use crate::core::app::{App, AppAction};
use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tui_textarea::{CursorMove, Input as TAInput};

#[derive(Debug)]
pub enum KeyResult {
    Dispatch(Vec<AppAction>),
    /// The input box consumed the key.
    Handled,
    Exit,
    NotHandled,
}

pub fn handle_key(app: &mut App, key: &KeyEvent) -> KeyResult {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);

    match key.code {
        KeyCode::Char('c') if ctrl => {
            app.ui.exit_requested = true;
            KeyResult::Exit
        }
        KeyCode::Esc if app.is_streaming() => KeyResult::Dispatch(vec![AppAction::CancelStreaming]),
        KeyCode::Enter if alt || key.modifiers.contains(KeyModifiers::SHIFT) => {
            edit_input(app, |ta| ta.insert_newline())
        }
        KeyCode::Enter => {
            if !app.ui.input_enabled() {
                return KeyResult::NotHandled;
            }
            KeyResult::Dispatch(vec![AppAction::SubmitMessage {
                message: app.ui.get_input_text().to_string(),
            }])
        }
        KeyCode::Char('n') if ctrl => KeyResult::Dispatch(vec![AppAction::NewThread]),
        KeyCode::Char('d') if ctrl => KeyResult::Dispatch(vec![AppAction::DeleteActiveThread]),
        KeyCode::Char('b') if ctrl => KeyResult::Dispatch(vec![AppAction::ToggleSidebar]),
        KeyCode::Up if ctrl || alt => {
            KeyResult::Dispatch(vec![AppAction::SelectAdjacentThread { offset: -1 }])
        }
        KeyCode::Down if ctrl || alt => {
            KeyResult::Dispatch(vec![AppAction::SelectAdjacentThread { offset: 1 }])
        }
        KeyCode::PageUp => KeyResult::Dispatch(vec![AppAction::ScrollUp {
            lines: app.ui.page_height(),
        }]),
        KeyCode::PageDown => KeyResult::Dispatch(vec![AppAction::ScrollDown {
            lines: app.ui.page_height(),
        }]),
        KeyCode::End if ctrl => KeyResult::Dispatch(vec![AppAction::ScrollToBottom]),
        KeyCode::Home if ctrl => edit_input(app, |ta| ta.move_cursor(CursorMove::Top)),
        _ => edit_input(app, |ta| ta.input(TAInput::from(*key))),
    }
}

fn edit_input<F, R>(app: &mut App, f: F) -> KeyResult
where
    F: FnOnce(&mut tui_textarea::TextArea<'static>) -> R,
{
    if !app.ui.input_enabled() {
        return KeyResult::NotHandled;
    }
    app.ui.apply_textarea_edit(f);
    KeyResult::Handled
}

/// Normalise pasted text for the input box.
pub(crate) fn sanitize_pasted_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\t', "    ")
        .chars()
        .filter(|&c| c == '\n' || !c.is_control())
        .collect()
}
