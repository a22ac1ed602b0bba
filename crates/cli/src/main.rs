use std::process::ExitCode;
use std::sync::Arc;

use parley_llm::create_provider;
use parley_session::Session;
use snafu::{OptionExt, ResultExt};

mod chat;
mod error;
mod render;
mod settings;

use chat::ChatLoop;
use error::{CliResult, MissingApiKeySnafu, ProviderSnafu};
use settings::SettingsStore;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so they never interleave with the streamed transcript on stdout.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "parley exited with an error");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CliResult<()> {
    let settings_store = Arc::new(SettingsStore::load());
    let settings = settings_store.settings();

    let config = settings.to_provider_config().context(MissingApiKeySnafu {
        stage: "load-provider-config",
        path: settings_store.config_path().display().to_string(),
    })?;
    let provider = create_provider(config).context(ProviderSnafu {
        stage: "create-provider",
    })?;
    tracing::info!(
        provider_id = %provider.id(),
        model_id = %settings.model,
        "initialized provider from settings"
    );

    let session = Session::new(Arc::clone(&provider), settings.to_session_options());
    ChatLoop::new(session, provider, settings_store).run().await
}
