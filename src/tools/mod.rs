pub mod ollama_compat;
pub mod scrape;
pub mod search;

pub use self::ollama_compat::OllamaToolCompat;
pub use self::scrape::ScrapeTool;
pub use self::search::{SearchStrategy, SearchTool};

use crate::memory::ToolCache;
use crate::program::atomics::Observation;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// A capability an agent may invoke while reasoning.
///
/// `invoke` never fails: network and parse errors come back as text so the
/// model can read them like any other observation.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> String;

    fn description(&self) -> String;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    async fn invoke(&self, input: Value) -> String;
}

/// Name of a tool as sent to function calling APIs.
pub fn function_name(tool: &dyn AgentTool) -> String {
    tool.name().to_lowercase().replace(' ', "_")
}

/// Single string argument of a tool call, falling back to the raw value when
/// the model did not send an object.
pub(crate) fn string_argument(input: &Value, key: &str) -> Option<String> {
    match input {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get(key).and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

/// Serves repeated invocations from a [`ToolCache`].
pub struct CachedTool {
    inner: Arc<dyn AgentTool>,
    cache: Arc<ToolCache>,
}

impl CachedTool {
    pub fn new(inner: Arc<dyn AgentTool>, cache: Arc<ToolCache>) -> Self {
        CachedTool { inner, cache }
    }
}

#[async_trait]
impl AgentTool for CachedTool {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn description(&self) -> String {
        self.inner.description()
    }

    fn parameters(&self) -> Value {
        self.inner.parameters()
    }

    async fn invoke(&self, input: Value) -> String {
        let key = input.to_string();
        if let Some(hit) = self.cache.get(&self.inner.name(), &key) {
            log::debug!("Cache hit for [{}] with {}", self.inner.name(), key);
            return hit;
        }
        let output = self.inner.invoke(input).await;
        self.cache.set(&self.inner.name(), &key, output.clone());
        output
    }
}

/// Keeps a log of every invocation so the caller can report what the agent
/// observed, whichever model backend ran the tool.
pub struct RecordingTool {
    inner: Arc<dyn AgentTool>,
    log: Arc<Mutex<Vec<Observation>>>,
}

impl RecordingTool {
    pub fn new(inner: Arc<dyn AgentTool>, log: Arc<Mutex<Vec<Observation>>>) -> Self {
        RecordingTool { inner, log }
    }
}

#[async_trait]
impl AgentTool for RecordingTool {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn description(&self) -> String {
        self.inner.description()
    }

    fn parameters(&self) -> Value {
        self.inner.parameters()
    }

    async fn invoke(&self, input: Value) -> String {
        let rendered = match &input {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let output = self.inner.invoke(input).await;
        self.log.lock().push(Observation {
            tool: self.inner.name(),
            input: rendered,
            output: output.clone(),
        });
        output
    }
}
