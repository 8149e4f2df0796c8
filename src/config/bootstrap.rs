use super::{
    is_set, ConfigError, ConfigStore, Configuration, DEFAULT_LOCAL_URL, DEFAULT_MODEL, UNSET,
};
use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

pub static API_KEY_ENV: &str = "OPENAI_API_KEY";
pub static SEARCH_API_KEY_ENV: &str = "GOOGLE_SEARCH_API_KEY";
/// Suffix of the derived model created from the base model.
pub static DERIVED_MODEL_SUFFIX: &str = "_crewai";

/// Local model runner used to prepare a model before the first run.
#[async_trait]
pub trait ModelRunner: Send + Sync {
    async fn check_installed(&self) -> Result<(), ConfigError>;

    async fn pull(&self, model: &str) -> Result<(), ConfigError>;

    async fn create(&self, name: &str, model_file: &Path) -> Result<(), ConfigError>;
}

/// Drives the `ollama` command line.
pub struct OllamaCli {
    binary: String,
    verbose: bool,
}

impl OllamaCli {
    pub fn new(verbose: bool) -> Self {
        OllamaCli {
            binary: "ollama".to_string(),
            verbose,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        if !self.verbose {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        command
    }
}

#[async_trait]
impl ModelRunner for OllamaCli {
    async fn check_installed(&self) -> Result<(), ConfigError> {
        let status = self.command().arg("--version").status().await;
        match status {
            Ok(status) if status.success() => {
                info!("Ollama is available");
                Ok(())
            }
            _ => Err(ConfigError::RunnerNotInstalled),
        }
    }

    async fn pull(&self, model: &str) -> Result<(), ConfigError> {
        info!("Pulling model {}, this may take a while.", model);
        let status = self
            .command()
            .args(["pull", model])
            .status()
            .await
            .map_err(|e| ConfigError::PullFailed {
                model: model.to_string(),
                reason: e.to_string(),
            })?;
        if !status.success() {
            return Err(ConfigError::PullFailed {
                model: model.to_string(),
                reason: status.to_string(),
            });
        }
        info!("Base model is ready");
        Ok(())
    }

    async fn create(&self, name: &str, model_file: &Path) -> Result<(), ConfigError> {
        let status = self
            .command()
            .arg("create")
            .arg(name)
            .arg("-f")
            .arg(model_file)
            .status()
            .await
            .map_err(|e| ConfigError::CreateFailed {
                model: name.to_string(),
                reason: e.to_string(),
            })?;
        if !status.success() {
            return Err(ConfigError::CreateFailed {
                model: name.to_string(),
                reason: status.to_string(),
            });
        }
        info!("Custom model {} is ready", name);
        Ok(())
    }
}

/// Values given to `configure`, as typed on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureArgs {
    pub model: String,
    pub api_key: String,
    pub search_api_key: String,
    /// `"true"` or `"false"`.
    pub local: String,
    pub verbose: u8,
    pub model_url: Option<String>,
}

impl Default for ConfigureArgs {
    fn default() -> Self {
        ConfigureArgs {
            model: DEFAULT_MODEL.to_string(),
            api_key: String::new(),
            search_api_key: String::new(),
            local: "true".to_string(),
            verbose: 0,
            model_url: None,
        }
    }
}

impl ConfigureArgs {
    pub fn is_local(&self) -> bool {
        self.local.trim().eq_ignore_ascii_case("true")
    }
}

/// Runs the configuration flow: resolve keys, prepare the local model when
/// needed and persist the result.
pub struct Configurator<R: ModelRunner> {
    runner: R,
    env: HashMap<String, String>,
}

impl<R: ModelRunner> Configurator<R> {
    /// Captures the API key environment variables once.
    pub fn new(runner: R) -> Self {
        let env = [API_KEY_ENV, SEARCH_API_KEY_ENV]
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();
        Configurator { runner, env }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Returns the value when set, else the environment value, else `NA`.
    pub fn fallback_on_env(&self, value: &str, env_name: &str) -> String {
        if is_set(value) {
            return value.to_string();
        }
        self.env
            .get(env_name)
            .filter(|v| is_set(v))
            .cloned()
            .unwrap_or_else(|| UNSET.to_string())
    }

    /// Builds the configuration the arguments describe, without side effects.
    pub fn resolve(&self, args: &ConfigureArgs) -> Result<Configuration, ConfigError> {
        let local = args.is_local();
        let model_base_url = match &args.model_url {
            Some(url) if is_set(url) => url.clone(),
            _ if local => DEFAULT_LOCAL_URL.to_string(),
            _ => String::new(),
        };
        let config = Configuration {
            local,
            model_base_url,
            model_name: args.model.clone(),
            api_key: self.fallback_on_env(&args.api_key, API_KEY_ENV),
            search_api_key: self.fallback_on_env(&args.search_api_key, SEARCH_API_KEY_ENV),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates first so that nothing is written for an invalid request.
    pub async fn configure(
        &self,
        store: &ConfigStore,
        args: &ConfigureArgs,
    ) -> Result<Configuration, ConfigError> {
        info!("Configuration started..");
        let mut config = self.resolve(args)?;
        store.ensure_folders()?;

        if config.local {
            self.runner.check_installed().await?;
            let model_file = create_model_file(&args.model, &store.models_folder())?;
            self.runner.pull(&args.model).await?;
            let derived = format!("{}{}", args.model, DERIVED_MODEL_SUFFIX);
            self.runner.create(&derived, &model_file).await?;
            config.model_name = derived;
        }

        store.save(&config)?;
        if args.verbose > 0 {
            debug!(
                "{}",
                serde_json::to_string_pretty(&config.masked()).unwrap_or_default()
            );
        }
        Ok(config)
    }
}

/// Writes the definition of the derived model and returns its path.
pub fn create_model_file(model: &str, folder: &Path) -> Result<PathBuf, ConfigError> {
    let content = format!(
        "FROM {}\nPARAMETER temperature 0.8\nPARAMETER stop Result\nSYSTEM \"\"\"\"\"\"",
        model
    );
    let file_name = format!("{}_Modelfile", model.replace([':', '/'], ""));
    let path = folder.join(file_name);
    fs::create_dir_all(folder).map_err(ConfigError::ModelFile)?;
    fs::write(&path, content).map_err(ConfigError::ModelFile)?;
    info!("Model configuration file created at {}", path.display());
    Ok(path)
}
