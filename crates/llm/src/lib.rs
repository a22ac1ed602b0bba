//! Completion-service client layer: provider contract, stream plumbing and the rig-backed
//! OpenAI adapter.
use std::sync::Arc;

pub mod events;
mod model;
mod provider;
mod rig_adapter;

pub use events::{SessionId, StreamEventMapped, StreamEventPayload, StreamGeneration, StreamTarget};
pub use model::{DEFAULT_MODEL, Model, is_known_model, known_models};
pub use provider::{
    CancelHandle, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, EventChannel, LlmProvider,
    ProviderConfig, ProviderError, ProviderEventStream, ProviderMessage, ProviderResult,
    ProviderStreamHandle, ProviderWorker, Role, StreamRequest, make_event_stream,
};
pub use rig_adapter::{RIG_OPENAI_PROVIDER_ID, RigProviderAdapter};

pub fn create_provider(mut config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_OPENAI_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "openai" | "rig-openai" => {
            config.provider_id = RIG_OPENAI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigProviderAdapter::new(config)?))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-provider",
            provider_id: config.provider_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_provider_id_defaults_to_openai() {
        let provider = create_provider(ProviderConfig::new("", "sk-test", ""));
        assert!(matches!(provider, Ok(provider) if provider.id() == RIG_OPENAI_PROVIDER_ID));
    }

    #[test]
    fn rig_alias_is_normalized() {
        let provider = create_provider(ProviderConfig::new("rig-openai", "sk-test", ""));
        assert!(matches!(provider, Ok(provider) if provider.id() == RIG_OPENAI_PROVIDER_ID));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let provider = create_provider(ProviderConfig::new("mystery", "sk-test", ""));
        assert!(matches!(
            provider,
            Err(ProviderError::UnsupportedProvider { provider_id, .. }) if provider_id == "mystery"
        ));
    }
}
