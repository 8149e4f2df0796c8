pub mod bootstrap;

pub use bootstrap::{Configurator, ConfigureArgs, ModelRunner, OllamaCli};

use log::{debug, info, warn};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub static APP_FOLDER_NAME: &str = ".techsage";
pub static CONFIG_FILE_NAME: &str = "config.json";
pub static MODELS_FOLDER_NAME: &str = "models";

pub static DEFAULT_MODEL: &str = "llama3:8b";
pub static DEFAULT_LOCAL_URL: &str = "http://localhost:11434/v1";
/// Written in place of an unset key.
pub static UNSET: &str = "NA";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not locate the home directory")]
    NoHomeDirectory,
    #[error("Could not read configuration at {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Configuration at {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Could not write configuration at {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("OPENAI_API_KEY environment variable not set.")]
    MissingApiKey,
    #[error("'ollama' is not installed. Please install it first.")]
    RunnerNotInstalled,
    #[error("Failed to pull model {model}: {reason}")]
    PullFailed { model: String, reason: String },
    #[error("Failed to create model {model}: {reason}")]
    CreateFailed { model: String, reason: String },
    #[error("Failed to create model configuration file: {0}")]
    ModelFile(io::Error),
}

/// `true` unless the value is empty or one of the unset sentinels.
pub fn is_set(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "" | "na" | "none"
    )
}

/// Resolved settings of the model and the search tool.
///
/// Persisted as a flat JSON object with upper-case keys; keys missing from
/// the file take their default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    #[serde(
        rename = "LOCAL",
        serialize_with = "bool_as_string",
        deserialize_with = "bool_from_string"
    )]
    pub local: bool,
    #[serde(rename = "OPENAI_API_BASE")]
    pub model_base_url: String,
    #[serde(rename = "OPENAI_MODEL_NAME")]
    pub model_name: String,
    #[serde(rename = "OPENAI_API_KEY")]
    pub api_key: String,
    #[serde(rename = "GOOGLE_SEARCH_API_KEY")]
    pub search_api_key: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            local: true,
            model_base_url: DEFAULT_LOCAL_URL.to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            api_key: UNSET.to_string(),
            search_api_key: UNSET.to_string(),
        }
    }
}

impl Configuration {
    /// Hosted mode cannot run without a model API key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.local && !is_set(&self.api_key) {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }

    /// Memory needs a hosted key, even when the model itself runs locally.
    pub fn has_hosted_key(&self) -> bool {
        is_set(&self.api_key)
    }

    /// Copy safe to print, with keys masked.
    pub fn masked(&self) -> Self {
        Configuration {
            api_key: mask(&self.api_key),
            search_api_key: mask(&self.search_api_key),
            ..self.clone()
        }
    }
}

fn mask(key: &str) -> String {
    if !is_set(key) {
        return key.to_string();
    }
    let visible: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{}", visible)
}

fn bool_as_string<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(if *value { "true" } else { "false" })
}

fn bool_from_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s.trim().eq_ignore_ascii_case("true"),
    })
}

/// The JSON file holding the configuration, inside the application folder.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    folder: PathBuf,
}

impl ConfigStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        ConfigStore {
            folder: folder.into(),
        }
    }

    /// `~/.techsage`
    pub fn default_location() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
        Ok(Self::new(home.join(APP_FOLDER_NAME)))
    }

    pub fn path(&self) -> PathBuf {
        self.folder.join(CONFIG_FILE_NAME)
    }

    pub fn models_folder(&self) -> PathBuf {
        self.folder.join(MODELS_FOLDER_NAME)
    }

    /// Creates the application and model folders if missing.
    pub fn ensure_folders(&self) -> Result<(), ConfigError> {
        let models = self.models_folder();
        fs::create_dir_all(&models).map_err(|source| ConfigError::Write {
            path: models,
            source,
        })
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    pub fn load(&self) -> Result<Configuration, ConfigError> {
        let path = self.path();
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = serde_json::from_str(&content)
            .map_err(|source| ConfigError::Parse { path, source })?;
        debug!("Loaded configuration from {}", self.path().display());
        Ok(config)
    }

    /// Writes the whole file at once; an existing file is only replaced once
    /// the new content has been written next to it.
    pub fn save(&self, config: &Configuration) -> Result<(), ConfigError> {
        self.ensure_folders()?;
        let path = self.path();
        let content = serde_json::to_string_pretty(config).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, content)
            .and_then(|_| fs::rename(&staging, &path))
            .map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
        info!("Configuration saved in {}", self.folder.display());
        Ok(())
    }

    /// Loads the configuration, running `configure` first when the file is
    /// missing or unreadable, then loading again.
    pub async fn load_or_configure<R: ModelRunner>(
        &self,
        configurator: &Configurator<R>,
        args: &ConfigureArgs,
    ) -> Result<Configuration, ConfigError> {
        match self.load() {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("{}, running the configuration with defaults", e);
                configurator.configure(self, args).await?;
                self.load()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();
        assert!(config.local);
        assert_eq!(config.model_name, "llama3:8b");
        assert_eq!(config.model_base_url, "http://localhost:11434/v1");
        assert_eq!(config.api_key, "NA");
        assert_eq!(config.search_api_key, "NA");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_keys() {
        let value = serde_json::to_value(Configuration::default()).expect("should serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "LOCAL": "true",
                "OPENAI_API_BASE": "http://localhost:11434/v1",
                "OPENAI_MODEL_NAME": "llama3:8b",
                "OPENAI_API_KEY": "NA",
                "GOOGLE_SEARCH_API_KEY": "NA"
            })
        );
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let config: Configuration =
            serde_json::from_str(r#"{"LOCAL": "False", "OPENAI_MODEL_NAME": "gpt-4o"}"#)
                .expect("should deserialize");
        assert!(!config.local);
        assert_eq!(config.model_name, "gpt-4o");
        assert_eq!(config.model_base_url, DEFAULT_LOCAL_URL);
        assert_eq!(config.api_key, UNSET);

        let config: Configuration =
            serde_json::from_str(r#"{"LOCAL": true}"#).expect("should accept booleans");
        assert!(config.local);
    }

    #[test]
    fn test_validate_requires_hosted_key() {
        let mut config = Configuration {
            local: false,
            ..Configuration::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingApiKey)));

        config.api_key = "".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::MissingApiKey)));

        config.api_key = "sk-test".to_string();
        assert!(config.validate().is_ok());
        assert!(config.has_hosted_key());
    }

    #[test]
    fn test_is_set() {
        assert!(!is_set(""));
        assert!(!is_set("NA"));
        assert!(!is_set(" na "));
        assert!(!is_set("None"));
        assert!(is_set("sk-123"));
    }

    #[test]
    fn test_masked() {
        let config = Configuration {
            api_key: "sk-abcdef1234".to_string(),
            ..Configuration::default()
        };
        let masked = config.masked();
        assert_eq!(masked.api_key, "****1234");
        assert_eq!(masked.search_api_key, "NA");
    }

    #[test]
    fn test_store_round_trip_and_idempotent_load() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let store = ConfigStore::new(dir.path().join(APP_FOLDER_NAME));
        assert!(!store.exists());
        assert!(matches!(store.load(), Err(ConfigError::Read { .. })));

        let config = Configuration {
            local: false,
            model_base_url: "".to_string(),
            model_name: "gpt-4o".to_string(),
            api_key: "sk-test".to_string(),
            search_api_key: "NA".to_string(),
        };
        store.save(&config).expect("should save");
        assert!(store.exists());
        assert!(store.models_folder().is_dir());

        let first = store.load().expect("should load");
        let second = store.load().expect("should load again");
        assert_eq!(first, config);
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let store = ConfigStore::new(dir.path());
        fs::write(store.path(), "{not json").expect("should write");
        assert!(matches!(store.load(), Err(ConfigError::Parse { .. })));
    }
}
