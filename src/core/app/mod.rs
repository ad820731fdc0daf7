//! Application state and the controller that mutates it.
//!
//! Everything the view reads lives in [`App`]. Input, stream events and
//! timers become [`AppAction`]s; [`apply_action`] is the only writer and
//! hands side effects back to the event loop as [`AppCommand`]s.

use crate::core::config::Config;
use crate::core::persist::KeyValueStore;
use crate::core::store::ThreadStore;
use crate::core::thread::Thread;

pub mod actions;
pub mod session;
pub mod ui_state;


pub use actions::{
    apply_action, apply_actions, AppAction, AppActionContext, AppActionDispatcher,
    AppActionEnvelope, AppCommand,
};
pub use session::{InFlight, SessionContext, StreamPhase, APOLOGY_MESSAGE};
pub use ui_state::UiState;

pub struct App {
    pub session: SessionContext,
    pub threads: ThreadStore,
    pub ui: UiState,
}

impl App {
    pub fn new(config: &Config, backend: Box<dyn KeyValueStore>) -> Self {
        let mut app = Self::from_parts(
            SessionContext::new(config),
            ThreadStore::load(backend),
            UiState::new(config),
        );
        if let Some(err) = app.threads.take_persist_error() {
            app.ui.set_status(err);
        }
        app
    }

    pub fn from_parts(session: SessionContext, threads: ThreadStore, ui: UiState) -> Self {
        Self {
            session,
            threads,
            ui,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.session.in_flight.is_some()
    }

    pub fn is_current_stream(&self, stream_id: u64) -> bool {
        self.session.is_current_stream(stream_id)
    }

    pub fn phase(&self) -> StreamPhase {
        self.session.phase()
    }

    pub fn active_thread(&self) -> Option<&Thread> {
        self.threads.active_thread()
    }

    /// Whether the active thread is the one receiving the in-flight reply.
    pub fn active_thread_is_streaming(&self) -> bool {
        match (&self.session.in_flight, self.threads.active_id()) {
            (Some(op), Some(active)) => op.thread_id == active,
            _ => false,
        }
    }
}
