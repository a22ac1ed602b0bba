use std::sync::Arc;

use parley_llm::{LlmProvider, ProviderEventStream, SessionId, StreamTarget};
use tokio::sync::{Mutex, watch};

use crate::controller::{SessionController, SessionOptions, StreamLaunch, StreamOutcome, ViewState};
use crate::error::{SessionError, SessionResult};

pub const STREAM_CLOSED_EARLY_MESSAGE: &str = "provider stream ended before a terminal event";

/// Async driver around [`SessionController`].
///
/// `submit` spawns the provider worker and a reader task on the current tokio runtime; the
/// reader feeds events into the controller in arrival order.
#[derive(Clone)]
pub struct Session {
    session_id: SessionId,
    controller: Arc<Mutex<SessionController>>,
    view_rx: watch::Receiver<ViewState>,
}

impl Session {
    pub fn new(provider: Arc<dyn LlmProvider>, options: SessionOptions) -> Self {
        Self::from_controller(SessionController::new(provider, options))
    }

    pub fn from_controller(controller: SessionController) -> Self {
        let session_id = controller.session_id();
        let view_rx = controller.subscribe();
        Self {
            session_id,
            controller: Arc::new(Mutex::new(controller)),
            view_rx,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Latest published view. Never blocks.
    pub fn view_state(&self) -> ViewState {
        self.view_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.view_rx.clone()
    }

    pub async fn model_id(&self) -> String {
        self.controller.lock().await.model_id().to_string()
    }

    pub async fn set_model(&self, model_id: impl Into<String>) {
        self.controller.lock().await.set_model(model_id);
    }

    pub async fn submit(&self, prompt: impl Into<String>) -> SessionResult<StreamTarget> {
        let StreamLaunch {
            target,
            stream,
            worker,
        } = self.controller.lock().await.submit(prompt)?;

        tokio::spawn(worker);
        tokio::spawn(Self::pump_events(Arc::clone(&self.controller), stream));
        Ok(target)
    }

    /// Returns the outcome when a stream was actually stopped.
    pub async fn cancel(&self) -> Option<StreamOutcome> {
        self.controller.lock().await.cancel().ok()
    }

    /// Resolves once `target` has reached a terminal outcome.
    pub async fn wait_for_outcome(&self, target: StreamTarget) -> SessionResult<StreamOutcome> {
        let mut view_rx = self.view_rx.clone();
        loop {
            let _ = view_rx.borrow_and_update();
            if let Some(outcome) = self.controller.lock().await.outcome(target) {
                return Ok(outcome.clone());
            }
            view_rx
                .changed()
                .await
                .map_err(|_| SessionError::ViewClosed {
                    stage: "wait-for-outcome",
                })?;
        }
    }

    async fn pump_events(controller: Arc<Mutex<SessionController>>, mut stream: ProviderEventStream) {
        let target = stream.target();
        while let Some(event) = stream.recv().await {
            let terminal = event.payload.is_terminal();
            let mut controller = controller.lock().await;
            if !controller.is_current(target) {
                // Strict target equality keeps a superseded stream away from the live buffer.
                tracing::debug!(target = %target, "stream reader stopping for stale target");
                return;
            }
            controller.apply_event(event);
            if terminal {
                return;
            }
        }

        let mut controller = controller.lock().await;
        if controller.is_current(target) {
            let _ = controller.on_stream_failed(target, STREAM_CLOSED_EARLY_MESSAGE);
        }
    }
}
