use std::time::Duration;

use super::{App, AppAction, AppActionContext, AppCommand};
use crate::core::app::session::{StreamPhase, APOLOGY_MESSAGE};
use crate::core::message::Message;
use tracing::{debug, error, info, warn};

pub(super) fn handle_streaming_action(
    app: &mut App,
    action: AppAction,
    _ctx: AppActionContext,
) -> Option<AppCommand> {
    match action {
        AppAction::SubmitMessage { message } => submit_message(app, message),
        AppAction::StreamStarted { stream_id } => {
            if !app.is_current_stream(stream_id) {
                return None;
            }
            start_reply(app);
            None
        }
        AppAction::AppendResponseChunk { content, stream_id } => {
            if !app.is_current_stream(stream_id) {
                return None;
            }
            append_response_chunk(app, &content);
            None
        }
        AppAction::StreamCompleted { stream_id } => {
            if !app.is_current_stream(stream_id) {
                return None;
            }
            finalize_stream(app);
            None
        }
        AppAction::StreamErrored { message, stream_id } => {
            if !app.is_current_stream(stream_id) {
                return None;
            }
            handle_stream_error(app, &message);
            None
        }
        AppAction::StreamRateLimited {
            retry_after,
            stream_id,
        } => {
            if !app.is_current_stream(stream_id) {
                return None;
            }
            handle_rate_limit(app, retry_after)
        }
        AppAction::RetryDue { stream_id } => {
            if !app.is_current_stream(stream_id) {
                return None;
            }
            resend_current(app)
        }
        AppAction::CancelStreaming => {
            cancel_current_stream(app);
            None
        }
        _ => unreachable!("non-streaming action routed to streaming handler"),
    }
}

fn submit_message(app: &mut App, message: String) -> Option<AppCommand> {
    if app.is_streaming() {
        app.ui.set_status("Wait for the current reply to finish");
        return None;
    }
    if message.trim().is_empty() {
        return None;
    }
    let thread_id = app.threads.active_id()?;

    app.threads.append_message(thread_id, Message::user(message));
    app.ui.clear_input();
    app.ui.clear_status();
    app.ui.scroll_to_bottom();
    app.ui.set_input_enabled(false);

    let stream_id = app.session.begin(thread_id).stream_id;
    debug!(stream_id, thread = %thread_id, "submitting message");
    request_current(app)
}

/// Build the request for the in-flight operation from its thread's history.
fn request_current(app: &mut App) -> Option<AppCommand> {
    let thread_id = app.session.in_flight.as_ref()?.thread_id;
    let Some(thread) = app.threads.thread(thread_id) else {
        debug!(thread = %thread_id, "thread removed before request was sent");
        app.session.finish(StreamPhase::Aborted);
        app.ui.set_input_enabled(true);
        return None;
    };
    let history = thread.messages.iter().map(Message::to_api).collect();
    app.session
        .stream_params(history)
        .map(AppCommand::SpawnStream)
}

fn start_reply(app: &mut App) {
    let Some(op) = app.session.in_flight.as_mut() else {
        return;
    };
    if op.phase != StreamPhase::Sending {
        return;
    }
    op.phase = StreamPhase::Streaming;
    let thread_id = op.thread_id;
    debug!(stream_id = op.stream_id, "reply started");

    app.ui.clear_status();
    app.threads
        .append_message(thread_id, Message::assistant(String::new()));
}

fn append_response_chunk(app: &mut App, chunk: &str) {
    if chunk.is_empty() {
        return;
    }
    if app.session.phase() == StreamPhase::Sending {
        start_reply(app);
    }
    let Some(op) = app.session.in_flight.as_mut() else {
        return;
    };
    op.accumulated.push_str(chunk);
    let thread_id = op.thread_id;
    let content = op.accumulated.as_str();
    app.threads.update_last_message(thread_id, content);
}

fn finalize_stream(app: &mut App) {
    if let Some(op) = app.session.finish(StreamPhase::Completed) {
        info!(
            stream_id = op.stream_id,
            chars = op.accumulated.chars().count(),
            "reply completed"
        );
    }
    app.ui.set_input_enabled(true);
}

fn handle_stream_error(app: &mut App, message: &str) {
    let Some(op) = app.session.finish(StreamPhase::Failed) else {
        return;
    };
    error!(
        stream_id = op.stream_id,
        thread = %op.thread_id,
        error = message,
        "completion request failed"
    );
    app.threads
        .append_message(op.thread_id, Message::assistant(APOLOGY_MESSAGE));
    app.ui.set_input_enabled(true);
    app.ui.scroll_to_bottom();
}

fn handle_rate_limit(app: &mut App, retry_after: Option<Duration>) -> Option<AppCommand> {
    let policy = app.session.rate_limit.clone();
    let attempt = app.session.in_flight.as_ref()?.rate_limit_retries + 1;

    if !policy.allows(attempt) {
        warn!(attempts = attempt - 1, "giving up after repeated rate limiting");
        handle_stream_error(
            app,
            &format!("rate limited after {} retries", attempt - 1),
        );
        return None;
    }

    let delay = policy.delay_for(attempt, retry_after);
    let op = app.session.in_flight.as_mut()?;
    op.rate_limit_retries = attempt;
    op.phase = StreamPhase::Sending;
    let stream_id = op.stream_id;
    let cancel_token = op.cancel_token.clone();

    let status = match policy.max_attempts {
        Some(max) => format!(
            "Rate limited; retrying in {} (attempt {attempt}/{max})",
            format_delay(delay)
        ),
        None => format!(
            "Rate limited; retrying in {} (attempt {attempt})",
            format_delay(delay)
        ),
    };
    warn!(stream_id, attempt, ?delay, "rate limited, scheduling retry");
    app.ui.set_status(status);

    Some(AppCommand::ScheduleRetry {
        delay,
        stream_id,
        cancel_token,
    })
}

fn resend_current(app: &mut App) -> Option<AppCommand> {
    let stream_id = app.session.restart()?;
    debug!(stream_id, "re-sending after rate limit");
    request_current(app)
}

fn cancel_current_stream(app: &mut App) {
    if let Some(op) = app.session.finish(StreamPhase::Aborted) {
        debug!(
            stream_id = op.stream_id,
            kept = op.accumulated.len(),
            "reply cancelled"
        );
        app.ui.clear_status();
    }
    app.ui.set_input_enabled(true);
}

pub(crate) fn format_delay(delay: Duration) -> String {
    let millis = delay.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{:.1}s", delay.as_secs_f64())
    }
}
