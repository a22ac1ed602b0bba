use std::io::Write;
use std::sync::Arc;

use parley_llm::{LlmProvider, is_known_model};
use parley_session::{Session, SessionError};
use snafu::ResultExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{CliResult, ReadInputSnafu, SettingsSnafu, WriteOutputSnafu};
use crate::render::{TranscriptPrinter, write_history};
use crate::settings::{Settings, SettingsStore};

const HELP: &str = "\
commands:
  /cancel        stop the answer being streamed
  /model [id]    show or switch the model
  /models        list known models
  /history       print the conversation so far
  /quit          exit
anything else is sent as a prompt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Prompt(String),
    Cancel,
    Model(Option<String>),
    Models,
    History,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let Some(rest) = line.trim_end_matches(['\r', '\n']).strip_prefix('/') else {
            return Self::Prompt(line.trim_end_matches(['\r', '\n']).to_string());
        };

        let mut parts = rest.trim().splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let argument = parts
            .next()
            .map(str::trim)
            .filter(|argument| !argument.is_empty())
            .map(str::to_string);

        match name {
            "cancel" | "stop" => Self::Cancel,
            "model" => Self::Model(argument),
            "models" => Self::Models,
            "history" => Self::History,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct ChatLoop {
    session: Session,
    provider: Arc<dyn LlmProvider>,
    settings: Arc<SettingsStore>,
    printer: TranscriptPrinter,
}

impl ChatLoop {
    pub fn new(
        session: Session,
        provider: Arc<dyn LlmProvider>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            session,
            provider,
            settings,
            printer: TranscriptPrinter::default(),
        }
    }

    pub async fn run(mut self) -> CliResult<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut view_rx = self.session.subscribe();

        tracing::info!(
            session_id = %self.session.session_id(),
            provider_id = %self.provider.id(),
            "chat session started"
        );
        self.println(&format!(
            "parley: chatting with {} via {} (/help for commands)",
            self.session.model_id().await,
            self.provider.name()
        ))?;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = line.context(ReadInputSnafu { stage: "read-stdin-line" })?;
                    let Some(line) = line else {
                        break;
                    };
                    if self.handle_command(Command::parse(&line)).await? == Flow::Quit {
                        break;
                    }
                }
                changed = view_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = view_rx.borrow_and_update().clone();
                    let mut stdout = std::io::stdout().lock();
                    self.printer
                        .render(&view, &mut stdout)
                        .context(WriteOutputSnafu { stage: "render-view" })?;
                }
                _ = tokio::signal::ctrl_c() => {
                    // Ctrl-C stops an answer in flight; at the prompt it exits.
                    if self.session.cancel().await.is_none() && !self.printer.is_streaming() {
                        break;
                    }
                }
            }
        }

        let _ = self.session.cancel().await;
        tracing::info!(session_id = %self.session.session_id(), "chat session ended");
        Ok(())
    }

    async fn handle_command(&mut self, command: Command) -> CliResult<Flow> {
        match command {
            Command::Prompt(prompt) => self.submit(prompt).await?,
            Command::Cancel => {
                if self.session.cancel().await.is_none() {
                    self.println("(nothing to cancel)")?;
                }
            }
            Command::Model(None) => {
                let model_id = self.session.model_id().await;
                self.println(&format!("model: {model_id}"))?;
            }
            Command::Model(Some(model_id)) => self.switch_model(model_id).await?,
            Command::Models => {
                let listing = self
                    .provider
                    .models()
                    .iter()
                    .map(|model| match &model.description {
                        Some(description) => format!("  {} ({description})", model.id),
                        None => format!("  {}", model.id),
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                self.println(&listing)?;
            }
            Command::History => {
                let view = self.session.view_state();
                let mut stdout = std::io::stdout().lock();
                write_history(&view.history, &mut stdout)
                    .context(WriteOutputSnafu { stage: "write-history" })?;
            }
            Command::Help => self.println(HELP)?,
            Command::Quit => return Ok(Flow::Quit),
            Command::Unknown(name) => self.println(&format!("unknown command `/{name}`"))?,
        }
        Ok(Flow::Continue)
    }

    async fn submit(&mut self, prompt: String) -> CliResult<()> {
        match self.session.submit(prompt).await {
            Ok(target) => {
                let mut stdout = std::io::stdout().lock();
                self.printer
                    .begin(target, &mut stdout)
                    .context(WriteOutputSnafu { stage: "begin-answer" })?;
            }
            Err(error @ SessionError::RequestRejected { .. }) => {
                tracing::warn!(error = %error, "prompt was rejected");
                self.println(&format!("rejected: {error}"))?;
            }
            Err(error) => return Err(error).context(crate::error::SessionSnafu { stage: "submit" }),
        }
        Ok(())
    }

    async fn switch_model(&mut self, model_id: String) -> CliResult<()> {
        if !is_known_model(&model_id) {
            // The transport validates model ids; this is only a hint.
            tracing::warn!(model_id = %model_id, "model is not in the known catalog");
        }
        self.session.set_model(model_id.clone()).await;

        let updated = Settings {
            model: model_id.clone(),
            ..Settings::clone(&self.settings.settings())
        };
        self.settings
            .update(updated)
            .context(SettingsSnafu { stage: "persist-model" })?;
        self.println(&format!("model: {model_id}"))
    }

    fn println(&self, line: &str) -> CliResult<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}").context(WriteOutputSnafu { stage: "write-line" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_prompts() {
        assert_eq!(Command::parse("hello there\n"), Command::Prompt("hello there".into()));
        assert_eq!(Command::parse(""), Command::Prompt(String::new()));
    }

    #[test]
    fn slash_commands_parse_arguments() {
        assert_eq!(Command::parse("/cancel"), Command::Cancel);
        assert_eq!(Command::parse("/model"), Command::Model(None));
        assert_eq!(
            Command::parse("/model  gpt-4 "),
            Command::Model(Some("gpt-4".into()))
        );
        assert_eq!(Command::parse("/models"), Command::Models);
        assert_eq!(Command::parse("/history"), Command::History);
        assert_eq!(Command::parse("/exit"), Command::Quit);
        assert_eq!(Command::parse("/frobnicate"), Command::Unknown("frobnicate".into()));
    }
}
