use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use parley_llm::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE, ProviderConfig};
use parley_session::SessionOptions;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_PROVIDER_ID: &str = "openai";
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const SETTINGS_DIRECTORY_NAME: &str = "parley";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "PARLEY_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub preamble: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f64>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            api_key: String::new(),
            endpoint: default_endpoint(),
            model: default_model(),
            preamble: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Settings {
    pub fn to_provider_config(&self) -> Option<ProviderConfig> {
        if self.api_key.trim().is_empty() {
            return None;
        }

        Some(ProviderConfig::new(
            &self.provider_id,
            &self.api_key,
            &self.endpoint,
        ))
    }

    pub fn to_session_options(&self) -> SessionOptions {
        SessionOptions {
            model_id: self.model.clone(),
            preamble: self.preamble.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn normalized(mut self) -> Self {
        self.provider_id = non_blank_or(self.provider_id, default_provider_id);
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = non_blank_or(self.endpoint, default_endpoint);
        self.model = non_blank_or(self.model, default_model);
        self.preamble = self
            .preamble
            .map(|preamble| preamble.trim().to_string())
            .filter(|preamble| !preamble.is_empty());
        self
    }

    /// Fills gaps from the conventional `OPENAI_*` variables.
    ///
    /// Only values still at their defaults are replaced, so file and `PARLEY_*` settings win.
    pub fn with_openai_fallbacks(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if self.api_key.is_empty()
            && let Some(api_key) = lookup("OPENAI_API_KEY")
        {
            self.api_key = api_key;
        }
        if self.endpoint == DEFAULT_ENDPOINT
            && let Some(endpoint) = lookup("OPENAI_BASE_URL")
        {
            self.endpoint = endpoint;
        }
        if self.model == DEFAULT_MODEL
            && let Some(model) = lookup("OPENAI_MODEL")
        {
            self.model = model;
        }
        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<Settings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".parley"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_figment(Self::figment(&config_path), &config_path)
            .with_openai_fallbacks(|key| std::env::var(key).ok())
            .normalized();
        Self::with_settings(settings, config_path)
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn with_settings(settings: Settings, config_path: PathBuf) -> Self {
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: Settings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    fn load_from_figment(figment: Figment, path: &Path) -> Settings {
        match figment.extract::<Settings>() {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                Settings::default()
            }
        }
    }

    fn persist(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn non_blank_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_provider_id() -> String {
    DEFAULT_PROVIDER_ID.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> Option<f64> {
    Some(DEFAULT_TEMPERATURE)
}

fn default_max_tokens() -> Option<u64> {
    Some(DEFAULT_MAX_TOKENS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("parley-settings-{}", uuid::Uuid::new_v4()))
            .join(SETTINGS_FILE_NAME)
    }

    #[test]
    fn json_layer_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(Settings::default())).merge(
            Json::string(r#"{ "api_key": " sk-file ", "model": "gpt-4", "max_tokens": 256 }"#),
        );
        let settings = SettingsStore::load_from_figment(figment, Path::new("inline")).normalized();

        assert_eq!(settings.api_key, "sk-file");
        assert_eq!(settings.model, "gpt-4");
        assert_eq!(settings.max_tokens, Some(256));
        assert_eq!(settings.temperature, Some(DEFAULT_TEMPERATURE));
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn malformed_json_falls_back_to_defaults() {
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::string(r#"{ "max_tokens": [1, 2] }"#));
        let settings = SettingsStore::load_from_figment(figment, Path::new("inline"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn normalization_restores_blank_fields() {
        let settings = Settings {
            provider_id: "  ".to_string(),
            endpoint: String::new(),
            model: " ".to_string(),
            preamble: Some("   ".to_string()),
            ..Settings::default()
        }
        .normalized();

        assert_eq!(settings.provider_id, DEFAULT_PROVIDER_ID);
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.preamble, None);
        assert!(settings.to_provider_config().is_none());
    }

    #[test]
    fn openai_fallbacks_only_fill_defaults() {
        let lookup = |key: &str| match key {
            "OPENAI_API_KEY" => Some("sk-env".to_string()),
            "OPENAI_BASE_URL" => Some("https://proxy.test/v1".to_string()),
            "OPENAI_MODEL" => Some("gpt-4".to_string()),
            _ => None,
        };

        let filled = Settings::default().with_openai_fallbacks(lookup);
        assert_eq!(filled.api_key, "sk-env");
        assert_eq!(filled.endpoint, "https://proxy.test/v1");
        assert_eq!(filled.model, "gpt-4");

        let explicit = Settings {
            api_key: "sk-file".to_string(),
            model: "gpt-4-32k".to_string(),
            ..Settings::default()
        }
        .with_openai_fallbacks(lookup);
        assert_eq!(explicit.api_key, "sk-file");
        assert_eq!(explicit.model, "gpt-4-32k");
    }

    #[test]
    fn update_persists_and_reloads() {
        let path = scratch_path();
        let store = SettingsStore::with_settings(Settings::default(), path.clone());

        let updated = Settings {
            api_key: "sk-saved".to_string(),
            model: "gpt-4".to_string(),
            ..Settings::default()
        };
        store.update(updated).expect("persist settings");
        assert_eq!(store.settings().model, "gpt-4");

        let figment = Figment::from(Serialized::defaults(Settings::default())).merge(Json::file(&path));
        let reloaded = SettingsStore::load_from_figment(figment, &path);
        assert_eq!(reloaded.api_key, "sk-saved");
        assert_eq!(reloaded.model, "gpt-4");
        assert!(!path.with_extension("json.tmp").exists());

        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn session_options_follow_settings() {
        let settings = Settings {
            model: "gpt-4".to_string(),
            preamble: Some("be brief".to_string()),
            temperature: None,
            ..Settings::default()
        };
        let options = settings.to_session_options();
        assert_eq!(options.model_id, "gpt-4");
        assert_eq!(options.preamble.as_deref(), Some("be brief"));
        assert_eq!(options.temperature, None);
        assert_eq!(options.max_tokens, Some(DEFAULT_MAX_TOKENS));
    }
}
