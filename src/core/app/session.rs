use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::api::ChatMessage;
use crate::core::chat_stream::StreamParams;
use crate::core::config::{ApiSettings, Config, RateLimitConfig};
use crate::core::thread::ThreadId;

/// Appended as a new assistant message when a request fails.
pub const APOLOGY_MESSAGE: &str =
    "I apologize, but I encountered an error while processing your request. Please try again.";

/// Lifecycle of one user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    /// Request issued (or waiting to be re-issued after a 429).
    Sending,
    /// Success response received; deltas are arriving.
    Streaming,
    Completed,
    Aborted,
    Failed,
}

/// The operation currently in flight. There is at most one, globally.
#[derive(Debug)]
pub struct InFlight {
    /// Thread the reply belongs to, even if the user switches away.
    pub thread_id: ThreadId,
    pub stream_id: u64,
    pub cancel_token: CancellationToken,
    pub phase: StreamPhase,
    /// Full assistant text received so far.
    pub accumulated: String,
    pub rate_limit_retries: u32,
}

pub struct SessionContext {
    pub client: Client,
    pub settings: ApiSettings,
    pub rate_limit: RateLimitConfig,
    pub stream_timeout: Option<Duration>,
    pub in_flight: Option<InFlight>,
    next_stream_id: u64,
    last_outcome: Option<StreamPhase>,
}

impl SessionContext {
    pub fn new(config: &Config) -> Self {
        Self::with_settings(
            config.api_settings(),
            config.rate_limit.clone(),
            config.stream_timeout(),
        )
    }

    pub fn with_settings(
        settings: ApiSettings,
        rate_limit: RateLimitConfig,
        stream_timeout: Option<Duration>,
    ) -> Self {
        Self {
            client: Client::new(),
            settings,
            rate_limit,
            stream_timeout,
            in_flight: None,
            next_stream_id: 0,
            last_outcome: None,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.in_flight
            .as_ref()
            .map(|op| op.phase)
            .unwrap_or(StreamPhase::Idle)
    }

    /// How the previous operation ended, if any has.
    pub fn last_outcome(&self) -> Option<StreamPhase> {
        self.last_outcome
    }

    pub fn current_stream_id(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|op| op.stream_id)
    }

    pub fn is_current_stream(&self, stream_id: u64) -> bool {
        self.current_stream_id() == Some(stream_id)
    }

    fn allocate_stream_id(&mut self) -> u64 {
        self.next_stream_id = self.next_stream_id.wrapping_add(1);
        self.next_stream_id
    }

    /// Record a new operation for `thread_id` in the `Sending` phase.
    pub fn begin(&mut self, thread_id: ThreadId) -> &InFlight {
        let stream_id = self.allocate_stream_id();
        self.in_flight.insert(InFlight {
            thread_id,
            stream_id,
            cancel_token: CancellationToken::new(),
            phase: StreamPhase::Sending,
            accumulated: String::new(),
            rate_limit_retries: 0,
        })
    }

    /// Give the in-flight operation a fresh stream id for a re-sent
    /// request so anything still arriving from the old attempt is ignored.
    pub fn restart(&mut self) -> Option<u64> {
        let stream_id = self.allocate_stream_id();
        let op = self.in_flight.as_mut()?;
        op.stream_id = stream_id;
        op.phase = StreamPhase::Sending;
        op.accumulated.clear();
        Some(stream_id)
    }

    /// Drop the in-flight record, cancelling its token.
    pub fn finish(&mut self, outcome: StreamPhase) -> Option<InFlight> {
        let mut op = self.in_flight.take()?;
        op.cancel_token.cancel();
        op.phase = outcome;
        self.last_outcome = Some(outcome);
        Some(op)
    }

    pub fn stream_params(&self, messages: Vec<ChatMessage>) -> Option<StreamParams> {
        let op = self.in_flight.as_ref()?;
        Some(StreamParams {
            client: self.client.clone(),
            settings: self.settings.clone(),
            messages,
            cancel_token: op.cancel_token.clone(),
            stream_id: op.stream_id,
            timeout: self.stream_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionContext {
        SessionContext::with_settings(ApiSettings::default(), RateLimitConfig::default(), None)
    }

    #[test]
    fn begin_and_finish_walk_the_phases() {
        let mut session = session();
        assert_eq!(session.phase(), StreamPhase::Idle);

        let stream_id = session.begin(ThreadId::new(1)).stream_id;
        assert_eq!(session.phase(), StreamPhase::Sending);
        assert!(session.is_current_stream(stream_id));

        let token = session.in_flight.as_ref().expect("op").cancel_token.clone();
        let op = session.finish(StreamPhase::Aborted).expect("op");
        assert_eq!(op.phase, StreamPhase::Aborted);
        assert!(token.is_cancelled());
        assert_eq!(session.phase(), StreamPhase::Idle);
        assert_eq!(session.last_outcome(), Some(StreamPhase::Aborted));
        assert!(!session.is_current_stream(stream_id));
    }

    #[test]
    fn restart_moves_to_a_new_stream_id() {
        let mut session = session();
        let first = session.begin(ThreadId::new(1)).stream_id;
        let second = session.restart().expect("restarted");
        assert_ne!(first, second);
        assert!(session.is_current_stream(second));
        assert!(!session.is_current_stream(first));
    }

    #[test]
    fn stream_params_carry_operation_identity() {
        let mut session = session();
        assert!(session.stream_params(Vec::new()).is_none());
        let stream_id = session.begin(ThreadId::new(1)).stream_id;
        let params = session.stream_params(Vec::new()).expect("params");
        assert_eq!(params.stream_id, stream_id);
        assert!(params.timeout.is_none());
    }
}
