//! Side effects requested by the controller.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::app::{AppAction, AppActionContext, AppActionDispatcher, AppCommand};
use crate::core::chat_stream::{ChatStreamService, StreamMessage};

pub fn execute_command(
    command: AppCommand,
    stream_service: &ChatStreamService,
    dispatcher: &AppActionDispatcher,
    ctx: AppActionContext,
) {
    match command {
        AppCommand::SpawnStream(params) => stream_service.spawn_stream(params),
        AppCommand::ScheduleRetry {
            delay,
            stream_id,
            cancel_token,
        } => {
            spawn_retry_timer(dispatcher.clone(), delay, stream_id, cancel_token, ctx);
        }
    }
}

/// Dispatch `RetryDue` once `delay` has elapsed. Cancelling the token first
/// drops the retry.
pub fn spawn_retry_timer(
    dispatcher: AppActionDispatcher,
    delay: Duration,
    stream_id: u64,
    cancel_token: CancellationToken,
    ctx: AppActionContext,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                debug!(stream_id, "retry abandoned");
            }
            _ = tokio::time::sleep(delay) => {
                dispatcher.dispatch(AppAction::RetryDue { stream_id }, ctx);
            }
        }
    })
}

pub fn stream_message_action(message: StreamMessage, stream_id: u64) -> AppAction {
    match message {
        StreamMessage::Started => AppAction::StreamStarted { stream_id },
        StreamMessage::Chunk(content) => AppAction::AppendResponseChunk { content, stream_id },
        StreamMessage::RateLimited { retry_after } => AppAction::StreamRateLimited {
            retry_after,
            stream_id,
        },
        StreamMessage::Error(message) => AppAction::StreamErrored { message, stream_id },
        StreamMessage::End => AppAction::StreamCompleted { stream_id },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::app::{apply_action, App, AppActionEnvelope, StreamPhase};
    use crate::core::message::Role;
    use crate::utils::test_utils::{
        create_test_app_with, spawn_mock_server, sse_response, status_response, test_settings,
    };
    use tokio::sync::mpsc;

    fn dispatcher() -> (AppActionDispatcher, mpsc::UnboundedReceiver<AppActionEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (AppActionDispatcher::new(tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn retry_timer_fires_after_delay() {
        let (dispatcher, mut rx) = dispatcher();
        let token = CancellationToken::new();
        spawn_retry_timer(
            dispatcher,
            Duration::from_secs(2),
            7,
            token,
            AppActionContext::default(),
        );

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert!(rx.try_recv().is_err());

        let envelope = rx.recv().await.expect("retry dispatched");
        assert!(matches!(envelope.action, AppAction::RetryDue { stream_id: 7 }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_retry_never_fires() {
        let (dispatcher, mut rx) = dispatcher();
        let token = CancellationToken::new();
        let handle = spawn_retry_timer(
            dispatcher,
            Duration::from_secs(2),
            7,
            token.clone(),
            AppActionContext::default(),
        );
        token.cancel();
        handle.await.expect("timer task");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stream_messages_map_to_actions() {
        assert!(matches!(
            stream_message_action(StreamMessage::Chunk("x".into()), 3),
            AppAction::AppendResponseChunk { ref content, stream_id: 3 } if content == "x"
        ));
        assert!(matches!(
            stream_message_action(StreamMessage::End, 3),
            AppAction::StreamCompleted { stream_id: 3 }
        ));
        assert!(matches!(
            stream_message_action(
                StreamMessage::RateLimited {
                    retry_after: Some(Duration::from_secs(1))
                },
                3
            ),
            AppAction::StreamRateLimited { stream_id: 3, .. }
        ));
    }

    /// Apply actions and run commands until the reply reaches a terminal
    /// phase.
    async fn drive(
        app: &mut App,
        first: AppAction,
        service: &ChatStreamService,
        stream_rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    ) {
        let (dispatcher, mut action_rx) = dispatcher();
        let ctx = AppActionContext::default();
        dispatcher.dispatch(first, ctx);

        loop {
            tokio::select! {
                Some(envelope) = action_rx.recv() => {
                    if let Some(cmd) = apply_action(app, envelope.action, envelope.context) {
                        execute_command(cmd, service, &dispatcher, ctx);
                    }
                }
                Some((message, stream_id)) = stream_rx.recv() => {
                    dispatcher.dispatch(stream_message_action(message, stream_id), ctx);
                }
            }
            if !app.is_streaming() && action_rx.is_empty() && stream_rx.is_empty() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn rate_limited_request_is_retried_and_completes() {
        let (base_url, server) = spawn_mock_server(vec![
            status_response("429 Too Many Requests", &[("Retry-After", "0")], "{}"),
            sse_response(&[
                r#"{"choices":[{"delta":{"content":"Hello"}}]}"#,
                r#"{"choices":[{"delta":{"content":" world"}}]}"#,
                "[DONE]",
            ]),
        ])
        .await;

        let mut app = create_test_app_with(test_settings(&base_url));
        let (service, mut stream_rx) = ChatStreamService::new();
        drive(
            &mut app,
            AppAction::SubmitMessage {
                message: "Hi".into(),
            },
            &service,
            &mut stream_rx,
        )
        .await;

        assert_eq!(app.session.last_outcome(), Some(StreamPhase::Completed));
        let thread = app.active_thread().expect("active thread");
        let transcript: Vec<(Role, &str)> = thread
            .messages
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            transcript,
            vec![(Role::User, "Hi"), (Role::Assistant, "Hello world")]
        );
        assert!(app.ui.input_enabled());

        let requests = server.await.expect("server task");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].body, requests[1].body);
    }

    #[tokio::test]
    async fn server_error_appends_apology() {
        let (base_url, _server) =
            spawn_mock_server(vec![status_response("500 Internal Server Error", &[], "{}")])
                .await;

        let mut app = create_test_app_with(test_settings(&base_url));
        let (service, mut stream_rx) = ChatStreamService::new();
        drive(
            &mut app,
            AppAction::SubmitMessage {
                message: "Hi".into(),
            },
            &service,
            &mut stream_rx,
        )
        .await;

        assert_eq!(app.session.last_outcome(), Some(StreamPhase::Failed));
        let last = app
            .active_thread()
            .and_then(|t| t.messages.last())
            .expect("apology appended");
        assert_eq!(last.content, crate::core::app::APOLOGY_MESSAGE);
    }
}
