use std::future::Future;
use std::pin::Pin;

use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

use crate::events::{StreamEventMapped, StreamTarget};
use crate::model::Model;

/// Sampling temperature used when the caller does not pick one.
pub const DEFAULT_TEMPERATURE: f64 = 0.6;
/// Completion length cap used when the caller does not pick one.
pub const DEFAULT_MAX_TOKENS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    pub endpoint: String,
}

impl ProviderConfig {
    pub fn new(
        provider_id: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            endpoint: endpoint.into().trim().to_string(),
        }
    }
}

/// Speaker role as the completion service understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
}

impl ProviderMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Outbound payload for one streamed completion.
///
/// `history` holds every prior turn oldest first; `prompt` is the new user turn and is
/// sent exactly once, after the history.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub target: StreamTarget,
    pub model_id: String,
    pub history: Vec<ProviderMessage>,
    pub prompt: String,
    pub preamble: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl StreamRequest {
    pub fn new(
        target: StreamTarget,
        model_id: impl Into<String>,
        history: Vec<ProviderMessage>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            target,
            model_id: model_id.into(),
            history,
            prompt: prompt.into(),
            preamble: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Full conversation in send order: history first, then the new prompt.
    pub fn messages(&self) -> Vec<ProviderMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.extend(self.history.iter().cloned());
        messages.push(ProviderMessage::new(Role::User, self.prompt.clone()));
        messages
    }
}

pub type ProviderWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("missing API key for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' is not supported"))]
    UnsupportedProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("stream request for {target} has no model identifier"))]
    MissingModel {
        stage: &'static str,
        target: StreamTarget,
    },
    #[snafu(display("stream request for {target} has no user or assistant messages"))]
    EmptyMessageSet {
        stage: &'static str,
        target: StreamTarget,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
}

/// Receiving half of one provider stream.
///
/// Events arrive in provider order and end with at most one terminal payload.
pub struct ProviderEventStream {
    target: StreamTarget,
    events: mpsc::UnboundedReceiver<StreamEventMapped>,
}

impl ProviderEventStream {
    pub(crate) fn new(
        target: StreamTarget,
        events: mpsc::UnboundedReceiver<StreamEventMapped>,
    ) -> Self {
        Self { target, events }
    }

    pub fn target(&self) -> StreamTarget {
        self.target
    }

    pub async fn recv(&mut self) -> Option<StreamEventMapped> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StreamEventMapped> {
        self.events.try_recv().ok()
    }
}

/// Signals the provider worker to stop producing events.
///
/// Dropping the handle cancels as well, so a forgotten stream never keeps provider IO alive.
#[derive(Debug)]
pub struct CancelHandle {
    target: StreamTarget,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl CancelHandle {
    pub(crate) fn new(target: StreamTarget, cancel_tx: oneshot::Sender<()>) -> Self {
        Self {
            target,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn target(&self) -> StreamTarget {
        self.target
    }

    /// Returns true only for the call that actually delivered the signal.
    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_tx.is_none()
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

pub struct ProviderStreamHandle {
    pub stream: ProviderEventStream,
    pub cancel: CancelHandle,
    pub worker: ProviderWorker,
}

pub trait LlmProvider: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    fn models(&self) -> &[Model];
    /// Opens one stream. Returning an error means the request was rejected before any IO.
    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle>;
}

/// Channel plumbing shared by every provider implementation.
pub struct EventChannel {
    pub event_tx: mpsc::UnboundedSender<StreamEventMapped>,
    pub cancel_rx: oneshot::Receiver<()>,
    pub stream: ProviderEventStream,
    pub cancel: CancelHandle,
}

pub fn make_event_stream(target: StreamTarget) -> EventChannel {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    EventChannel {
        event_tx,
        cancel_rx,
        stream: ProviderEventStream::new(target, event_rx),
        cancel: CancelHandle::new(target, cancel_tx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{SessionId, StreamGeneration};

    fn target() -> StreamTarget {
        StreamTarget::new(SessionId::new_v4(), StreamGeneration::new(1))
    }

    #[test]
    fn messages_append_prompt_once_after_history() {
        let request = StreamRequest::new(
            target(),
            "gpt-4",
            vec![
                ProviderMessage::new(Role::User, "first"),
                ProviderMessage::new(Role::Assistant, "reply"),
            ],
            "second",
        );

        let messages = request.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2], ProviderMessage::new(Role::User, "second"));
        assert_eq!(
            messages
                .iter()
                .filter(|message| message.content == "second")
                .count(),
            1
        );
    }

    #[test]
    fn cancel_handle_fires_once() {
        let mut channel = make_event_stream(target());
        assert!(channel.cancel.cancel());
        assert!(!channel.cancel.cancel());
        assert!(channel.cancel.is_cancelled());
        assert_eq!(channel.cancel_rx.try_recv(), Ok(()));
    }

    #[test]
    fn dropping_cancel_handle_signals_worker() {
        let EventChannel {
            cancel,
            mut cancel_rx,
            ..
        } = make_event_stream(target());
        drop(cancel);
        assert_eq!(cancel_rx.try_recv(), Ok(()));
    }

    #[test]
    fn provider_config_trims_inputs() {
        let config = ProviderConfig::new(" openai ", " key\n", " https://example.test/v1 ");
        assert_eq!(config.provider_id, "openai");
        assert_eq!(config.api_key, "key");
        assert_eq!(config.endpoint, "https://example.test/v1");
    }
}
