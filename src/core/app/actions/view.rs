use super::{App, AppAction, AppActionContext, AppCommand};

pub(super) fn handle_view_action(
    app: &mut App,
    action: AppAction,
    ctx: AppActionContext,
) -> Option<AppCommand> {
    match action {
        AppAction::ToggleSidebar => app.ui.toggle_sidebar(),
        AppAction::ScrollUp { lines } => app.ui.scroll_up(lines),
        AppAction::ScrollDown { lines } => app.ui.scroll_down(lines),
        AppAction::ScrollToBottom => app.ui.scroll_to_bottom(),
        _ => unreachable!("non-view action routed to view handler"),
    }
    if ctx.term_width > 0 {
        app.ui.set_terminal_width(ctx.term_width);
    }
    None
}
