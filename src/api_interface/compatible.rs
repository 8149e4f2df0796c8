use crate::tools::{function_name, AgentTool};
use ollama_rs::error::OllamaError;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct CompatibleRequest {
    model: String,
    messages: Vec<CompatibleMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<CompatibleTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CompatibleTool {
    r#type: String,
    function: CompatibleFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct CompatibleFunction {
    name: String,
    description: Option<String>,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct CompatibleMessage {
    role: String,
    content: Option<String>, // `Option` since it can be null
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<CompatibleToolCall>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct CompatibleToolCall {
    #[serde(default)]
    id: String,
    function: CompatibleToolCallFunction,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct CompatibleToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct CompatibleResponse {
    choices: Vec<CompatibleChoice>,
}

#[derive(Debug, Deserialize)]
struct CompatibleChoice {
    message: CompatibleMessage,
}

/// Chat completions against any server exposing the OpenAI API under a
/// custom base URL.
pub struct CompatibleExecutor {
    model: String,
    api_key: String,
    base_url: String,
    client: Client,
}

impl CompatibleExecutor {
    pub fn new(model: String, api_key: String, base_url: String) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    async fn complete(
        &self,
        request: &CompatibleRequest,
    ) -> Result<CompatibleMessage, OllamaError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "Authorization",
            header::HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| OllamaError::from(format!("Invalid header value: {}", e)))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .headers(headers)
            .json(request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OllamaError::from(format!("Failed to send request: {}", e)))?;

        let response_text = response
            .text()
            .await
            .map_err(|e| OllamaError::from(format!("Failed to get response text: {}", e)))?;

        let response_body: CompatibleResponse =
            serde_json::from_str(&response_text).map_err(|e| {
                OllamaError::from(format!(
                    "Failed to parse response: {} for text: {}",
                    e, response_text
                ))
            })?;

        response_body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| OllamaError::from("No response generated".to_string()))
    }

    fn user_message(prompt: &str) -> CompatibleMessage {
        CompatibleMessage {
            role: "user".to_string(),
            content: Some(prompt.to_string()),
            tool_calls: None,
        }
    }

    pub async fn generate_text(&self, prompt: &str) -> Result<String, OllamaError> {
        let request = CompatibleRequest {
            model: self.model.clone(),
            messages: vec![Self::user_message(prompt)],
            tools: None,
        };
        self.complete(&request)
            .await?
            .content
            .ok_or_else(|| OllamaError::from("No content in response".to_string()))
    }

    /// Lets the model pick tool calls for the prompt and runs them, returning
    /// their outputs joined by newlines.
    pub async fn function_call(
        &self,
        prompt: &str,
        tools: &[Arc<dyn AgentTool>],
    ) -> Result<String, OllamaError> {
        let compatible_tools: Vec<_> = tools
            .iter()
            .map(|tool| CompatibleTool {
                r#type: "function".to_string(),
                function: CompatibleFunction {
                    name: function_name(tool.as_ref()),
                    description: Some(tool.description()),
                    parameters: tool.parameters(),
                },
            })
            .collect();

        let request = CompatibleRequest {
            model: self.model.clone(),
            messages: vec![Self::user_message(prompt)],
            tools: Some(compatible_tools),
        };
        let message = self.complete(&request).await?;

        let mut results = Vec::<String>::new();
        for tool_call in message.tool_calls.unwrap_or_default() {
            for tool in tools {
                if function_name(tool.as_ref()) == tool_call.function.name {
                    let tool_params: Value = serde_json::from_str(&tool_call.function.arguments)?;
                    results.push(tool.invoke(tool_params).await);
                }
            }
        }
        Ok(results.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::EchoTool;
    use mockito::Matcher;
    use serde_json::json;

    fn executor(url: &str) -> CompatibleExecutor {
        CompatibleExecutor::new(
            "mistral".to_string(),
            "sk-local".to_string(),
            format!("{}/v1/", url),
        )
    }

    #[tokio::test]
    async fn test_generate_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-local")
            .match_body(Matcher::PartialJson(json!({
                "model": "mistral",
                "messages": [{"role": "user", "content": "Hi!"}]
            })))
            .with_status(200)
            .with_body(
                json!({
                    "choices": [{"message": {"role": "assistant", "content": "Hello there"}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let result = executor(&server.url())
            .generate_text("Hi!")
            .await
            .expect("should generate");
        assert_eq!(result, "Hello there");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_function_call_runs_matching_tools() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .match_body(Matcher::PartialJson(json!({
                "tools": [{"type": "function", "function": {"name": "echo_tool"}}]
            })))
            .with_status(200)
            .with_body(
                json!({
                    "choices": [{"message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [
                            {"id": "1", "type": "function", "function": {"name": "echo_tool", "arguments": "{\"text\":\"one\"}"}},
                            {"id": "2", "type": "function", "function": {"name": "unknown", "arguments": "{}"}},
                            {"id": "3", "type": "function", "function": {"name": "echo_tool", "arguments": "{\"text\":\"two\"}"}}
                        ]
                    }}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let echo = Arc::new(EchoTool::new());
        let tools: Vec<Arc<dyn AgentTool>> = vec![echo.clone()];
        let result = executor(&server.url())
            .function_call("use the tool", &tools)
            .await
            .expect("should call");
        assert_eq!(result, "echo: one\necho: two");
        assert_eq!(echo.calls(), 2);
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .create_async()
            .await;

        let result = executor(&server.url()).generate_text("Hi!").await;
        assert!(result.is_err());
    }
}
