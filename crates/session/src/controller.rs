use std::sync::Arc;

use parley_llm::{
    CancelHandle, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE, LlmProvider,
    ProviderEventStream, ProviderWorker, SessionId, StreamEventMapped, StreamEventPayload,
    StreamGeneration, StreamRequest, StreamTarget,
};
use snafu::ResultExt;
use tokio::sync::watch;

use crate::buffer::{BufferStatus, LiveBuffer, TransitionRejection};
use crate::error::{RequestRejectedSnafu, SessionResult};
use crate::history::{History, HistorySnapshot, Turn};

/// Per-session request knobs forwarded to the provider on every submit.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub model_id: String,
    pub preamble: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL.to_string(),
            preamble: None,
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
        }
    }
}

impl SessionOptions {
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }
}

/// How one stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Natural end of stream. `committed` is false when the answer was empty.
    Completed { committed: bool },
    /// Stopped by the caller, or replaced by a newer submit when `superseded` is set.
    Cancelled { superseded: bool },
    /// Transport failure; the partial answer was discarded.
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub target: StreamTarget,
    pub kind: OutcomeKind,
}

impl StreamOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.kind, OutcomeKind::Failed { .. })
    }
}

/// Consistent, render-ready view of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub history: HistorySnapshot,
    /// Present if and only if `status` is `Streaming`.
    pub live_answer: Option<String>,
    pub status: BufferStatus,
    pub last_outcome: Option<StreamOutcome>,
}

/// Everything the caller needs to drive a freshly opened stream.
pub struct StreamLaunch {
    pub target: StreamTarget,
    pub stream: ProviderEventStream,
    pub worker: ProviderWorker,
}

/// Coordinator-level stream metadata kept outside the buffer.
struct ActiveStream {
    target: StreamTarget,
    cancel: CancelHandle,
}

/// Owns the history and the live buffer for one conversation.
///
/// All methods are synchronous and non-blocking; provider events are pushed in by whoever
/// drives the stream. Every state change is published to `subscribe()` receivers as one
/// `ViewState`, so readers never observe an answer both live and committed.
pub struct SessionController {
    session_id: SessionId,
    provider: Arc<dyn LlmProvider>,
    options: SessionOptions,
    history: History,
    buffer: LiveBuffer,
    generation: StreamGeneration,
    active: Option<ActiveStream>,
    outcomes: Vec<StreamOutcome>,
    view_tx: watch::Sender<ViewState>,
}

impl SessionController {
    pub fn new(provider: Arc<dyn LlmProvider>, options: SessionOptions) -> Self {
        let (view_tx, _) = watch::channel(ViewState::default());
        Self {
            session_id: SessionId::new_v4(),
            provider,
            options,
            history: History::new(),
            buffer: LiveBuffer::default(),
            generation: StreamGeneration::new(0),
            active: None,
            outcomes: Vec::new(),
            view_tx,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn model_id(&self) -> &str {
        &self.options.model_id
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Applies to the next submit; an in-flight stream keeps its model.
    pub fn set_model(&mut self, model_id: impl Into<String>) {
        self.options.model_id = model_id.into();
    }

    pub fn history(&self) -> HistorySnapshot {
        self.history.snapshot()
    }

    pub fn status(&self) -> BufferStatus {
        self.buffer.status()
    }

    pub fn active_target(&self) -> Option<StreamTarget> {
        self.buffer.active_target()
    }

    /// Returns true when events for `target` would still be applied.
    pub fn is_current(&self, target: StreamTarget) -> bool {
        self.buffer.accepts(target)
    }

    pub fn outcome(&self, target: StreamTarget) -> Option<&StreamOutcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|outcome| outcome.target == target)
    }

    pub fn view_state(&self) -> ViewState {
        ViewState {
            history: self.history.snapshot(),
            live_answer: self.buffer.live_text().map(str::to_string),
            status: self.buffer.status(),
            last_outcome: self.outcomes.last().cloned(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.view_tx.subscribe()
    }

    /// Appends the user turn and opens a new stream seeded with the prior history.
    ///
    /// A stream still in flight is cancelled first. When the provider rejects the request,
    /// neither the history nor the live buffer are touched.
    pub fn submit(&mut self, prompt: impl Into<String>) -> SessionResult<StreamLaunch> {
        let prompt = prompt.into();
        // Reserve the generation up front so a rejected request never shares a target.
        self.generation = self.generation.next();
        let target = StreamTarget::new(self.session_id, self.generation);

        let request = self.build_request(target, &prompt);
        let handle = self
            .provider
            .stream_chat(request)
            .context(RequestRejectedSnafu {
                stage: "submit-open-stream",
                target,
            })?;

        if self.active_target().is_some() {
            self.cancel_active(true);
        }

        self.history.append(Turn::user(prompt));
        if let Err(rejection) = self.buffer.start(target) {
            tracing::error!(?rejection, "live buffer refused a fresh stream");
        }
        self.active = Some(ActiveStream {
            target,
            cancel: handle.cancel,
        });

        tracing::debug!(
            target = %target,
            model_id = %self.options.model_id,
            history_len = self.history.len(),
            "stream opened"
        );
        self.publish();

        Ok(StreamLaunch {
            target,
            stream: handle.stream,
            worker: handle.worker,
        })
    }

    /// Dispatches one provider event to the matching handler.
    pub fn apply_event(&mut self, event: StreamEventMapped) {
        let target = event.target;
        let _ = match event.payload {
            StreamEventPayload::Delta(fragment) => self.on_delta(target, &fragment),
            // Reasoning text is not part of the answer.
            StreamEventPayload::ReasoningDelta(_) => Ok(()),
            StreamEventPayload::Done => self.on_stream_end(target).map(|_| ()),
            StreamEventPayload::Error(message) => {
                self.on_stream_failed(target, message).map(|_| ())
            }
        };
    }

    pub fn on_delta(
        &mut self,
        target: StreamTarget,
        fragment: &str,
    ) -> Result<(), TransitionRejection> {
        match self.buffer.push(target, fragment) {
            Ok(()) => {
                self.publish();
                Ok(())
            }
            Err(rejection) => {
                // Late deltas from a cancelled or superseded stream are expected.
                tracing::debug!(?rejection, "discarding stale delta");
                Err(rejection)
            }
        }
    }

    /// The single commit point for a stream.
    pub fn on_stream_end(
        &mut self,
        target: StreamTarget,
    ) -> Result<StreamOutcome, TransitionRejection> {
        let text = self
            .buffer
            .commit(target)
            .inspect_err(|rejection| Self::log_contract_violation("stream end", rejection))?;

        let committed = !text.is_empty();
        if committed {
            self.history.append(Turn::assistant(text));
        }
        let outcome = self.finish(target, OutcomeKind::Completed { committed });

        tracing::debug!(target = %target, committed, "stream completed");
        Ok(outcome)
    }

    /// Transport failure: handled like a cancel, but reported as a distinct outcome.
    pub fn on_stream_failed(
        &mut self,
        target: StreamTarget,
        message: impl Into<String>,
    ) -> Result<StreamOutcome, TransitionRejection> {
        self.buffer
            .fail(target)
            .inspect_err(|rejection| Self::log_contract_violation("stream failure", rejection))?;

        let message = message.into();
        tracing::warn!(target = %target, error = %message, "stream failed");
        self.signal_cancel(target);
        Ok(self.finish(target, OutcomeKind::Failed { message }))
    }

    /// Stops the stream in flight and discards its partial answer.
    pub fn cancel(&mut self) -> Result<StreamOutcome, TransitionRejection> {
        if self.active_target().is_none() {
            let rejection = TransitionRejection::NoActiveStream { attempted: None };
            tracing::debug!(?rejection, "cancel requested without an active stream");
            return Err(rejection);
        }

        self.cancel_active(false)
            .ok_or(TransitionRejection::NoActiveStream { attempted: None })
    }

    fn cancel_active(&mut self, superseded: bool) -> Option<StreamOutcome> {
        let target = match self.buffer.cancel(None) {
            Ok(target) => target,
            Err(rejection) => {
                Self::log_contract_violation("cancel", &rejection);
                return None;
            }
        };

        self.signal_cancel(target);
        tracing::debug!(target = %target, superseded, "stream cancelled");
        Some(self.finish(target, OutcomeKind::Cancelled { superseded }))
    }

    fn signal_cancel(&mut self, target: StreamTarget) {
        if let Some(mut active) = self.active.take() {
            if active.target != target {
                tracing::warn!(
                    target = %target,
                    active = %active.target,
                    "cancel handle does not match the buffer target"
                );
            }
            active.cancel.cancel();
        }
    }

    fn finish(&mut self, target: StreamTarget, kind: OutcomeKind) -> StreamOutcome {
        // Dropping a finished stream's handle is harmless: its worker has already exited.
        self.active = None;
        self.buffer.reset();
        let outcome = StreamOutcome { target, kind };
        self.outcomes.push(outcome.clone());
        self.publish();
        outcome
    }

    fn build_request(&self, target: StreamTarget, prompt: &str) -> StreamRequest {
        let mut request = StreamRequest::new(
            target,
            self.options.model_id.clone(),
            self.history.snapshot().to_provider_messages(),
            prompt,
        );
        if let Some(preamble) = &self.options.preamble {
            request = request.with_preamble(preamble.clone());
        }
        if let Some(temperature) = self.options.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.options.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view_state());
    }

    fn log_contract_violation(operation: &'static str, rejection: &TransitionRejection) {
        match rejection {
            TransitionRejection::StaleTarget { .. } => {
                tracing::debug!(operation, ?rejection, "ignoring event for a stale stream");
            }
            TransitionRejection::NoActiveStream { .. }
            | TransitionRejection::AlreadyStreaming { .. } => {
                tracing::warn!(operation, ?rejection, "ignoring out-of-order stream event");
            }
        }
    }
}
