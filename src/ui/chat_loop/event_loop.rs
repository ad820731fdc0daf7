//! Event polling, dispatching and redraws.

use std::{
    error::Error,
    io,
    time::{Duration, Instant},
};

use ratatui::crossterm::event::{self, Event, KeyEventKind};
use ratatui::prelude::Size;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::app::{
    apply_actions, App, AppActionContext, AppActionDispatcher, AppActionEnvelope,
};
use crate::core::chat_stream::{ChatStreamService, StreamMessage};
use crate::ui::renderer::ui;

use super::executors::{execute_command, stream_message_action};
use super::keybindings::{handle_key, sanitize_pasted_text, KeyResult};
use super::lifecycle::{restore_terminal, setup_terminal, SharedTerminal};
use super::AppHandle;

#[derive(Debug)]
pub enum UiEvent {
    Crossterm(Event),
}

fn action_context(size: Size) -> AppActionContext {
    AppActionContext {
        term_width: size.width,
        term_height: size.height,
    }
}

async fn current_terminal_size(terminal: &SharedTerminal) -> Size {
    let guard = terminal.lock().await;
    guard.size().unwrap_or_default()
}

async fn try_draw_frame(
    app: &AppHandle,
    terminal: &SharedTerminal,
    request_redraw: &mut bool,
    last_draw: &mut Instant,
    frame_duration: Duration,
) -> io::Result<()> {
    if !*request_redraw {
        return Ok(());
    }

    let now = Instant::now();
    if now.duration_since(*last_draw) < frame_duration {
        return Ok(());
    }

    let mut guard = terminal.lock().await;
    app.update(|app| guard.draw(|f| ui(f, app))).await?;
    *last_draw = now;
    *request_redraw = false;
    Ok(())
}

struct EventProcessingOutcome {
    events_processed: bool,
    exit_requested: bool,
}

async fn process_ui_events(
    app: &AppHandle,
    event_rx: &mut mpsc::UnboundedReceiver<UiEvent>,
    dispatcher: &AppActionDispatcher,
    term_size: Size,
) -> EventProcessingOutcome {
    let mut outcome = EventProcessingOutcome {
        events_processed: false,
        exit_requested: false,
    };
    let ctx = action_context(term_size);

    while let Ok(ev) = event_rx.try_recv() {
        outcome.events_processed = true;
        match ev {
            UiEvent::Crossterm(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                match app.update(|app| handle_key(app, &key)).await {
                    KeyResult::Dispatch(actions) => dispatcher.dispatch_many(actions, ctx),
                    KeyResult::Exit => {
                        outcome.exit_requested = true;
                        break;
                    }
                    KeyResult::Handled | KeyResult::NotHandled => {}
                }
            }
            UiEvent::Crossterm(Event::Paste(text)) => {
                let text = sanitize_pasted_text(&text);
                if !text.is_empty() {
                    app.update(|app| {
                        app.ui.apply_textarea_edit(|ta| ta.insert_str(text));
                    })
                    .await;
                }
            }
            UiEvent::Crossterm(_) => {}
        }
    }

    outcome
}

/// Forward stream messages for the live request to the controller, in
/// arrival order. Messages from superseded requests are dropped here.
fn process_stream_updates(
    dispatcher: &AppActionDispatcher,
    rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    ctx: AppActionContext,
    current_stream_id: Option<u64>,
) -> bool {
    let mut received_any = false;
    let mut actions = Vec::new();

    while let Ok((message, stream_id)) = rx.try_recv() {
        received_any = true;
        if Some(stream_id) != current_stream_id {
            debug!(stream_id, "dropping message from stale stream");
            continue;
        }
        actions.push(stream_message_action(message, stream_id));
    }

    if !actions.is_empty() {
        dispatcher.dispatch_many(actions, ctx);
    }
    received_any
}

async fn drain_action_queue(
    app: &AppHandle,
    dispatcher: &AppActionDispatcher,
    stream_service: &ChatStreamService,
    action_rx: &mut mpsc::UnboundedReceiver<AppActionEnvelope>,
    ctx: AppActionContext,
) -> bool {
    let mut pending = Vec::new();
    while let Ok(envelope) = action_rx.try_recv() {
        pending.push(envelope);
    }

    if pending.is_empty() {
        return false;
    }

    // Thread mutations write the snapshot to disk; keep that off the async
    // worker so the stream and input tasks keep running.
    let commands = app
        .update(|app| tokio::task::block_in_place(|| apply_actions(app, pending)))
        .await;
    for cmd in commands {
        execute_command(cmd, stream_service, dispatcher, ctx);
    }
    true
}

fn spawn_event_reader(event_tx: mpsc::UnboundedSender<UiEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Ok(true) = event::poll(Duration::from_millis(10)) {
                match event::read() {
                    Ok(ev) => {
                        if event_tx.send(UiEvent::Crossterm(ev)).is_err() {
                            break;
                        }
                    }
                    Err(_) => continue,
                }
            } else {
                tokio::task::yield_now().await;
            }
        }
    })
}

pub async fn run_chat(app: App) -> Result<(), Box<dyn Error>> {
    let app = AppHandle::new(app);

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<AppActionEnvelope>();
    let dispatcher = AppActionDispatcher::new(action_tx);

    let terminal = setup_terminal()?;
    info!("chat session started");

    let (stream_service, mut stream_rx) = ChatStreamService::new();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<UiEvent>();
    let event_reader_handle = spawn_event_reader(event_tx);

    const MAX_FPS: u64 = 60;
    let frame_duration = Duration::from_millis(1000 / MAX_FPS);
    let mut last_draw = Instant::now() - frame_duration;
    let mut request_redraw = true;
    let mut last_size = Size::default();

    let result: Result<(), Box<dyn Error>> = loop {
        if app.read(|app| app.ui.exit_requested).await {
            break Ok(());
        }

        if let Err(err) = try_draw_frame(
            &app,
            &terminal,
            &mut request_redraw,
            &mut last_draw,
            frame_duration,
        )
        .await
        {
            break Err(err.into());
        }

        let term_size = current_terminal_size(&terminal).await;
        if term_size != last_size {
            last_size = term_size;
            request_redraw = true;
            app.update(|app| {
                app.ui.last_term_size = term_size;
                app.ui.set_terminal_width(term_size.width);
            })
            .await;
        }
        let ctx = action_context(term_size);

        let events = process_ui_events(&app, &mut event_rx, &dispatcher, term_size).await;
        if events.exit_requested {
            break Ok(());
        }

        let current_stream_id = app.read(|app| app.session.current_stream_id()).await;
        let received_any =
            process_stream_updates(&dispatcher, &mut stream_rx, ctx, current_stream_id);

        let actions_applied =
            drain_action_queue(&app, &dispatcher, &stream_service, &mut action_rx, ctx).await;

        // Keep the pulse indicator moving while a reply is pending.
        let streaming = app.read(|app| app.is_streaming()).await;
        if events.events_processed || received_any || actions_applied || streaming {
            request_redraw = true;
        }

        if !events.events_processed && !received_any && !actions_applied {
            tokio::time::sleep(Duration::from_millis(16)).await;
        }
    };

    event_reader_handle.abort();
    app.update(|app| {
        if let Some(op) = app.session.in_flight.as_ref() {
            op.cancel_token.cancel();
        }
    })
    .await;
    restore_terminal(&terminal).await?;
    info!("chat session ended");

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::app::AppAction;

    #[test]
    fn stale_stream_messages_are_dropped() {
        let (tx, mut action_rx) = mpsc::unbounded_channel();
        let dispatcher = AppActionDispatcher::new(tx);
        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel();

        stream_tx.send((StreamMessage::Chunk("old".into()), 1)).unwrap();
        stream_tx.send((StreamMessage::Started, 2)).unwrap();
        stream_tx.send((StreamMessage::Chunk("a".into()), 2)).unwrap();
        stream_tx.send((StreamMessage::Chunk("b".into()), 2)).unwrap();
        stream_tx.send((StreamMessage::End, 2)).unwrap();

        assert!(process_stream_updates(
            &dispatcher,
            &mut stream_rx,
            AppActionContext::default(),
            Some(2),
        ));

        let mut seen = Vec::new();
        while let Ok(envelope) = action_rx.try_recv() {
            seen.push(envelope.action);
        }
        assert_eq!(seen.len(), 4);
        assert!(matches!(seen[0], AppAction::StreamStarted { stream_id: 2 }));
        assert!(
            matches!(&seen[1], AppAction::AppendResponseChunk { content, .. } if content == "a")
        );
        assert!(
            matches!(&seen[2], AppAction::AppendResponseChunk { content, .. } if content == "b")
        );
        assert!(matches!(seen[3], AppAction::StreamCompleted { stream_id: 2 }));
    }

    #[test]
    fn nothing_is_forwarded_without_a_live_stream() {
        let (tx, mut action_rx) = mpsc::unbounded_channel();
        let dispatcher = AppActionDispatcher::new(tx);
        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel();
        stream_tx.send((StreamMessage::End, 5)).unwrap();

        assert!(process_stream_updates(
            &dispatcher,
            &mut stream_rx,
            AppActionContext::default(),
            None,
        ));
        assert!(action_rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drain_applies_queued_actions() {
        let app = AppHandle::new(crate::utils::test_utils::create_test_app());
        let (tx, mut action_rx) = mpsc::unbounded_channel();
        let dispatcher = AppActionDispatcher::new(tx);
        let (service, _stream_rx) = ChatStreamService::new();

        dispatcher.dispatch(AppAction::NewThread, AppActionContext::default());
        assert!(
            drain_action_queue(
                &app,
                &dispatcher,
                &service,
                &mut action_rx,
                AppActionContext::default()
            )
            .await
        );
        assert_eq!(app.read(|app| app.threads.len()).await, 2);
        assert!(
            !drain_action_queue(
                &app,
                &dispatcher,
                &service,
                &mut action_rx,
                AppActionContext::default()
            )
            .await
        );
    }
}
