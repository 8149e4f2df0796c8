use crate::tools::{function_name, AgentTool};
use ollama_rs::error::OllamaError;
use openai_dive::v1::api::Client;
use openai_dive::v1::resources::chat::*;
use serde_json::Value;
use std::sync::Arc;

pub struct OpenAIExecutor {
    model: String,
    client: Client,
}

impl OpenAIExecutor {
    pub fn new(model: String, api_key: String) -> Self {
        Self {
            model,
            client: Client::new(api_key),
        }
    }

    fn user_message(prompt: &str) -> Result<ChatMessage, OllamaError> {
        ChatMessageBuilder::default()
            .content(ChatMessageContent::Text(prompt.to_string()))
            .build()
            .map_err(|e| OllamaError::from(format!("OpenAI message build error: {}", e)))
    }

    async fn complete(
        &self,
        parameters: ChatCompletionParameters,
    ) -> Result<ChatMessage, OllamaError> {
        let result = self
            .client
            .chat()
            .create(parameters)
            .await
            .map_err(|e| OllamaError::from(format!("OpenAI request failed: {:?}", e)))?;
        result
            .choices
            .first()
            .map(|choice| choice.message.clone())
            .ok_or_else(|| OllamaError::from("No response generated".to_string()))
    }

    pub async fn generate_text(&self, prompt: &str) -> Result<String, OllamaError> {
        let parameters = ChatCompletionParametersBuilder::default()
            .model(self.model.clone())
            .messages(vec![Self::user_message(prompt)?])
            .build()
            .map_err(|e| OllamaError::from(format!("Error while building request: {}", e)))?;

        match self.complete(parameters).await?.content {
            ChatMessageContent::Text(text) => Ok(text),
            _ => Err(OllamaError::from("No content in response".to_string())),
        }
    }

    /// Lets the model pick tool calls for the prompt and runs them, returning
    /// their outputs joined by newlines.
    pub async fn function_call(
        &self,
        prompt: &str,
        tools: &[Arc<dyn AgentTool>],
    ) -> Result<String, OllamaError> {
        let openai_tools: Vec<_> = tools
            .iter()
            .map(|tool| ChatCompletionTool {
                r#type: ChatCompletionToolType::Function,
                function: ChatCompletionFunction {
                    name: function_name(tool.as_ref()),
                    description: Some(tool.description()),
                    parameters: tool.parameters(),
                },
            })
            .collect();

        let parameters = ChatCompletionParametersBuilder::default()
            .model(self.model.clone())
            .messages(vec![Self::user_message(prompt)?])
            .tools(openai_tools)
            .build()
            .map_err(|e| OllamaError::from(format!("Error while building tools: {}", e)))?;

        let message = self.complete(parameters).await?;

        let mut results = Vec::<String>::new();
        if let Some(tool_calls) = message.tool_calls {
            for tool_call in tool_calls {
                for tool in tools {
                    if function_name(tool.as_ref()) == tool_call.function.name {
                        let tool_params: Value =
                            serde_json::from_str(&tool_call.function.arguments)?;
                        results.push(tool.invoke(tool_params).await);
                    }
                }
            }
        }
        Ok(results.join("\n"))
    }
}
