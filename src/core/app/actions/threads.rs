use super::{App, AppAction, AppActionContext, AppCommand};

pub(super) fn handle_thread_action(
    app: &mut App,
    action: AppAction,
    _ctx: AppActionContext,
) -> Option<AppCommand> {
    match action {
        AppAction::NewThread => {
            app.threads.create_thread();
        }
        AppAction::SwitchThread { id } => {
            if !app.threads.switch_active(id) {
                return None;
            }
        }
        AppAction::SelectAdjacentThread { offset } => {
            if !select_adjacent(app, offset) {
                return None;
            }
        }
        AppAction::DeleteThread { id } => app.threads.delete_thread(id),
        AppAction::DeleteActiveThread => {
            if let Some(id) = app.threads.active_id() {
                app.threads.delete_thread(id);
            }
        }
        _ => unreachable!("non-thread action routed to thread handler"),
    }
    app.ui.after_thread_change();
    None
}

/// Move the active pointer `offset` places through the list, wrapping.
fn select_adjacent(app: &mut App, offset: isize) -> bool {
    let len = app.threads.len();
    if len < 2 || offset == 0 {
        return false;
    }
    let current = app
        .threads
        .active_id()
        .and_then(|id| app.threads.position(id))
        .unwrap_or(0);
    let next = (current as isize + offset).rem_euclid(len as isize) as usize;
    let id = app.threads.threads()[next].id;
    app.threads.switch_active(id)
}
