use std::{error::Error, sync::Arc};

use async_trait::async_trait;
use ollama_rs::generation::functions::tools::Tool as OllamaTool;
use serde_json::Value;

use super::AgentTool;

// we cant implement OllamaTool for every AgentTool as it is out-of-crate,
// so we use a wrapper tuple-struct
pub struct OllamaToolCompat(Arc<dyn AgentTool>);

impl OllamaToolCompat {
    pub fn new(tool: Arc<dyn AgentTool>) -> Self {
        OllamaToolCompat(tool)
    }
}

#[async_trait]
impl OllamaTool for OllamaToolCompat {
    fn name(&self) -> String {
        self.0.name()
    }

    fn description(&self) -> String {
        self.0.description()
    }

    fn parameters(&self) -> Value {
        self.0.parameters()
    }

    async fn run(&self, input: Value) -> Result<String, Box<dyn Error>> {
        Ok(self.0.invoke(input).await)
    }
}
