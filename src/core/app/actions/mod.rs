mod streaming;
mod threads;
mod view;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::App;
use crate::core::chat_stream::StreamParams;
use crate::core::thread::ThreadId;

#[derive(Debug)]
pub enum AppAction {
    SubmitMessage {
        message: String,
    },
    StreamStarted {
        stream_id: u64,
    },
    AppendResponseChunk {
        content: String,
        stream_id: u64,
    },
    StreamCompleted {
        stream_id: u64,
    },
    StreamErrored {
        message: String,
        stream_id: u64,
    },
    StreamRateLimited {
        retry_after: Option<Duration>,
        stream_id: u64,
    },
    RetryDue {
        stream_id: u64,
    },
    CancelStreaming,
    NewThread,
    SwitchThread {
        id: ThreadId,
    },
    SelectAdjacentThread {
        offset: isize,
    },
    DeleteThread {
        id: ThreadId,
    },
    DeleteActiveThread,
    ToggleSidebar,
    ScrollUp {
        lines: u16,
    },
    ScrollDown {
        lines: u16,
    },
    ScrollToBottom,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AppActionContext {
    pub term_width: u16,
    pub term_height: u16,
}

pub struct AppActionEnvelope {
    pub action: AppAction,
    pub context: AppActionContext,
}

#[derive(Clone)]
pub struct AppActionDispatcher {
    tx: mpsc::UnboundedSender<AppActionEnvelope>,
}

impl AppActionDispatcher {
    pub fn new(tx: mpsc::UnboundedSender<AppActionEnvelope>) -> Self {
        Self { tx }
    }

    pub fn dispatch(&self, action: AppAction, ctx: AppActionContext) {
        self.dispatch_many([action], ctx);
    }

    pub fn dispatch_many<I>(&self, actions: I, ctx: AppActionContext)
    where
        I: IntoIterator<Item = AppAction>,
    {
        for action in actions.into_iter() {
            let _ = self.tx.send(AppActionEnvelope {
                action,
                context: ctx,
            });
        }
    }
}

/// Side effects the event loop performs on the controller's behalf.
pub enum AppCommand {
    SpawnStream(StreamParams),
    /// Dispatch `RetryDue { stream_id }` after `delay` unless `cancel_token`
    /// fires first.
    ScheduleRetry {
        delay: Duration,
        stream_id: u64,
        cancel_token: CancellationToken,
    },
}

pub fn apply_actions(
    app: &mut App,
    envelopes: impl IntoIterator<Item = AppActionEnvelope>,
) -> Vec<AppCommand> {
    let mut commands = Vec::new();
    for envelope in envelopes {
        if let Some(cmd) = apply_action(app, envelope.action, envelope.context) {
            commands.push(cmd);
        }
    }
    commands
}

pub fn apply_action(app: &mut App, action: AppAction, ctx: AppActionContext) -> Option<AppCommand> {
    let command = match action {
        AppAction::SubmitMessage { .. }
        | AppAction::StreamStarted { .. }
        | AppAction::AppendResponseChunk { .. }
        | AppAction::StreamCompleted { .. }
        | AppAction::StreamErrored { .. }
        | AppAction::StreamRateLimited { .. }
        | AppAction::RetryDue { .. }
        | AppAction::CancelStreaming => streaming::handle_streaming_action(app, action, ctx),

        AppAction::NewThread
        | AppAction::SwitchThread { .. }
        | AppAction::SelectAdjacentThread { .. }
        | AppAction::DeleteThread { .. }
        | AppAction::DeleteActiveThread => threads::handle_thread_action(app, action, ctx),

        AppAction::ToggleSidebar
        | AppAction::ScrollUp { .. }
        | AppAction::ScrollDown { .. }
        | AppAction::ScrollToBottom => view::handle_view_action(app, action, ctx),
    };

    if let Some(err) = app.threads.take_persist_error() {
        app.ui.set_status(err);
    }
    command
}
