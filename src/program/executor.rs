use super::atomics::*;
use super::errors::ExecutionError;
use super::models::*;
use super::tasks::render_prompt;
use crate::api_interface::compatible::CompatibleExecutor;
use crate::api_interface::openai_api::OpenAIExecutor;
use crate::config::Configuration;
use crate::tools::{AgentTool, OllamaToolCompat, RecordingTool};

use async_trait::async_trait;
use colored::*;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ollama_rs::{
    error::OllamaError,
    generation::chat::request::ChatMessageRequest,
    generation::chat::ChatMessage,
    generation::functions::tools::Tool,
    generation::functions::{FunctionCallRequest, LlamaFunctionCall, OpenAIFunctionCall},
    generation::options::GenerationOptions,
    Ollama,
};

pub static DEFAULT_MAX_TOKENS: i32 = 2048;

fn log_colored(msg: &str) {
    let colors = ["red", "green", "yellow", "blue", "magenta", "cyan"];

    let color = colors.choose(&mut rand::thread_rng()).unwrap_or(&"green");
    let colored_msg = match *color {
        "red" => msg.red(),
        "green" => msg.green(),
        "yellow" => msg.yellow(),
        "blue" => msg.blue(),
        "magenta" => msg.magenta(),
        "cyan" => msg.cyan(),
        _ => msg.green(),
    };
    warn!("{}", colored_msg);
}

/// Bounds how many model requests start within any sliding minute.
#[derive(Default)]
pub struct RateLimiter {
    started: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long to wait before a request may start, or `None` once the
    /// request has been counted.
    fn reserve(&self, max_rpm: u32, now: Instant) -> Option<Duration> {
        let window = Duration::from_secs(60);
        let mut started = self.started.lock();
        while started
            .front()
            .is_some_and(|t| now.duration_since(*t) >= window)
        {
            started.pop_front();
        }
        if started.len() < max_rpm as usize {
            started.push_back(now);
            return None;
        }
        started
            .front()
            .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
    }

    pub async fn acquire(&self, max_rpm: Option<u32>) {
        let Some(max_rpm) = max_rpm.filter(|m| *m > 0) else {
            return;
        };
        while let Some(wait) = self.reserve(max_rpm, Instant::now()) {
            info!("Rate limit of {} requests per minute reached, waiting {:?}", max_rpm, wait);
            tokio::time::sleep(wait).await;
        }
    }
}

/// Executor, runs the tasks of a crew against the configured model.
pub struct Executor {
    model: Model,
    llm: Ollama,
    api_key: String,
    limiter: RateLimiter,
}

impl Executor {
    /// Create a new Executor, talking to Ollama at its default location for local models.
    pub fn new(model: Model, api_key: impl Into<String>) -> Self {
        let llm = match model.ollama_endpoint() {
            Some((host, port)) => Ollama::new(host, port),
            None => Ollama::default(),
        };
        info!("Running {} through {}", model, model.provider);
        Self {
            model,
            llm,
            api_key: api_key.into(),
            limiter: RateLimiter::new(),
        }
    }

    pub fn from_config(config: &Configuration) -> Result<Self, ExecutionError> {
        config
            .validate()
            .map_err(|e| ExecutionError::InvalidConfiguration(e.to_string()))?;
        Ok(Self::new(Model::from_config(config), config.api_key.clone()))
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    async fn generate_text(&self, prompt: &str) -> Result<String, OllamaError> {
        let response = match self.model.provider {
            ModelProvider::Ollama => {
                let user_message = ChatMessage::user(prompt.to_string());
                let mut msg = ChatMessageRequest::new(self.model.to_string(), vec![user_message]);
                let ops = GenerationOptions::default().num_predict(DEFAULT_MAX_TOKENS);
                msg = msg.options(ops);

                let result = self.llm.send_chat_messages(msg).await?;
                result
                    .message
                    .map(|m| m.content)
                    .ok_or_else(|| OllamaError::from("No message in response".to_string()))?
            }
            ModelProvider::OpenAI => {
                let executor = OpenAIExecutor::new(self.model.to_string(), self.api_key.clone());
                executor.generate_text(prompt).await?
            }
            ModelProvider::Compatible => {
                let executor = CompatibleExecutor::new(
                    self.model.to_string(),
                    self.api_key.clone(),
                    self.model.base_url.clone(),
                );
                executor.generate_text(prompt).await?
            }
        };

        Ok(response)
    }

    async fn function_call(
        &self,
        prompt: &str,
        tools: &[Arc<dyn AgentTool>],
    ) -> Result<String, OllamaError> {
        let result = match self.model.provider {
            ModelProvider::Ollama => {
                let oai_parser = Arc::new(OpenAIFunctionCall {});
                let llama_parser = Arc::new(LlamaFunctionCall {});
                let ollama_tools: Vec<Arc<dyn Tool>> = tools
                    .iter()
                    .map(|tool| Arc::new(OllamaToolCompat::new(tool.clone())) as Arc<dyn Tool>)
                    .collect();
                let request = FunctionCallRequest::new(
                    self.model.to_string(),
                    ollama_tools,
                    vec![ChatMessage::user(prompt.to_string())],
                );

                let res = if self.model.uses_llama_tool_format() {
                    self.llm
                        .send_function_call(request, llama_parser.clone())
                        .await?
                } else {
                    self.llm.send_function_call(request, oai_parser.clone()).await?
                };
                res.message.map(|m| m.content).unwrap_or_default()
            }
            ModelProvider::OpenAI => {
                let executor = OpenAIExecutor::new(self.model.to_string(), self.api_key.clone());
                executor.function_call(prompt, tools).await?
            }
            ModelProvider::Compatible => {
                let executor = CompatibleExecutor::new(
                    self.model.to_string(),
                    self.api_key.clone(),
                    self.model.base_url.clone(),
                );
                executor.function_call(prompt, tools).await?
            }
        };

        Ok(result)
    }
}

/// Appends what the tools returned to the task prompt.
fn with_observations(prompt: &str, observations: &[Observation], failure: Option<&str>) -> String {
    if observations.is_empty() && failure.is_none() {
        return prompt.to_string();
    }
    let mut filled_prompt = format!("{}\n\nTools you used and what they returned:\n", prompt);
    for observation in observations {
        filled_prompt.push_str(&format!(
            "\n- {} with input {}:\n{}\n",
            observation.tool, observation.input, observation.output
        ));
    }
    if let Some(failure) = failure {
        filled_prompt.push_str(&format!("\nTool calling failed: {}\n", failure));
    }
    filled_prompt.push_str("\nNow give your final answer.");
    filled_prompt
}

#[async_trait]
impl Reasoner for Executor {
    /// One tool calling round when the agent has tools, then a final answer
    /// generated from the prompt and the tool observations.
    async fn perform(
        &self,
        request: ReasoningRequest<'_>,
    ) -> Result<ReasoningOutcome, ExecutionError> {
        let prompt = render_prompt(&request);
        debug!("Prompt: {}", &prompt);

        let log = Arc::new(Mutex::new(Vec::new()));
        let tools: Vec<Arc<dyn AgentTool>> = request
            .tools
            .iter()
            .map(|tool| {
                Arc::new(RecordingTool::new(tool.clone(), log.clone())) as Arc<dyn AgentTool>
            })
            .collect();

        let mut failure = None;
        if !tools.is_empty() {
            self.limiter.acquire(request.options.max_rpm).await;
            match self.function_call(&prompt, &tools).await {
                Ok(result) => log_colored(
                    format!(
                        "[{}] function calling output: {:?}",
                        request.task.name, result
                    )
                    .as_str(),
                ),
                Err(e) => {
                    warn!("[{}] function calling failed: {}", request.task.name, e);
                    failure = Some(e.to_string());
                }
            }
        }

        let observations: Vec<Observation> = log.lock().clone();
        let final_prompt = with_observations(&prompt, &observations, failure.as_deref());

        self.limiter.acquire(request.options.max_rpm).await;
        let answer = match self.generate_text(&final_prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Error generating text for [{}]", request.task.name);
                return Err(ExecutionError::GenerationFailed(e.to_string()));
            }
        };
        log_colored(format!("[{}] output: {:?}", request.task.name, &answer).as_str());

        Ok(ReasoningOutcome {
            answer,
            observations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::agents::roster;
    use crate::program::crew::Crew;
    use crate::program::tasks::{for_crew, kickoff_inputs};
    use crate::tools::testing::EchoTool;
    use mockito::Matcher;
    use serde_json::json;

    fn compatible_executor(server: &mockito::ServerGuard) -> Executor {
        let model = Model::new("mistral", ModelProvider::Compatible, server.url());
        Executor::new(model, "sk-local")
    }

    fn tasks_with_echo(model: &Model, echo: Arc<EchoTool>) -> Vec<TaskSpec> {
        let agents = roster(CrewKind::TechSage, echo.clone(), echo, model);
        for_crew(CrewKind::TechSage, "Rust", &agents)
    }

    fn tools_request() -> Matcher {
        Matcher::PartialJson(json!({
            "tools": [{"type": "function", "function": {"name": "echo_tool"}}]
        }))
    }

    fn answer(content: &str) -> String {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string()
    }

    #[test]
    fn test_rate_limiter_window() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        assert_eq!(limiter.reserve(2, start), None);
        assert_eq!(limiter.reserve(2, start + Duration::from_secs(10)), None);

        let wait = limiter
            .reserve(2, start + Duration::from_secs(20))
            .expect("should be limited");
        assert_eq!(wait, Duration::from_secs(40));

        // the first request left the window
        assert_eq!(limiter.reserve(2, start + Duration::from_secs(61)), None);
    }

    #[tokio::test]
    async fn test_rate_limiter_disabled() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            limiter.acquire(None).await;
            limiter.acquire(Some(0)).await;
        }
        assert!(limiter.started.lock().is_empty());
    }

    #[test]
    fn test_with_observations() {
        assert_eq!(with_observations("task", &[], None), "task");

        let observations = vec![Observation {
            tool: "Scraping tool".to_string(),
            input: "https://example.com".to_string(),
            output: "Example Domain".to_string(),
        }];
        let prompt = with_observations("task", &observations, Some("no tool call found"));
        assert!(prompt.starts_with("task\n\nTools you used"));
        assert!(prompt.contains("- Scraping tool with input https://example.com:\nExample Domain"));
        assert!(prompt.contains("Tool calling failed: no tool call found"));
    }

    #[test]
    fn test_from_config() {
        let executor = Executor::from_config(&Configuration::default()).expect("should build");
        assert_eq!(executor.model().provider, ModelProvider::Ollama);
        assert_eq!(executor.model().name, "llama3:8b");

        let hosted = Configuration {
            local: false,
            ..Configuration::default()
        };
        assert!(matches!(
            Executor::from_config(&hosted),
            Err(ExecutionError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_tool_round_feeds_the_final_answer() {
        let mut server = mockito::Server::new_async().await;
        let tool_round = server
            .mock("POST", "/chat/completions")
            .match_body(tools_request())
            .with_status(200)
            .with_body(
                json!({
                    "choices": [{"message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{"id": "1", "type": "function", "function": {
                            "name": "echo_tool",
                            "arguments": "{\"text\":\"Rust\"}"
                        }}]
                    }}]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let final_round = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("Tools you used".to_string()),
                Matcher::Regex("echo: Rust".to_string()),
            ]))
            .with_status(200)
            .with_body(answer("Rust is a systems language"))
            .create_async()
            .await;

        let executor = compatible_executor(&server);
        let echo = Arc::new(EchoTool::new());
        let tasks = tasks_with_echo(executor.model(), echo.clone());
        let inputs = kickoff_inputs(CrewKind::TechSage, "Rust");
        let options = CrewOptions {
            max_rpm: None,
            ..CrewOptions::default()
        };
        let request = ReasoningRequest {
            task: &tasks[0],
            inputs: &inputs,
            context: &[],
            tools: &tasks[0].agent.tools,
            options: &options,
        };

        let outcome = executor.perform(request).await.expect("should perform");
        tool_round.assert_async().await;
        final_round.assert_async().await;
        assert_eq!(outcome.answer, "Rust is a systems language");
        assert_eq!(
            outcome.observations,
            vec![Observation {
                tool: "Echo tool".to_string(),
                input: r#"{"text":"Rust"}"#.to_string(),
                output: "echo: Rust".to_string(),
            }]
        );
        assert_eq!(echo.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_tool_round_is_reported_to_the_model() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .match_body(tools_request())
            .with_status(500)
            .create_async()
            .await;
        let final_round = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("Tool calling failed".to_string()))
            .with_status(200)
            .with_body(answer("answered without tools"))
            .create_async()
            .await;

        let executor = compatible_executor(&server);
        let tasks = tasks_with_echo(executor.model(), Arc::new(EchoTool::new()));
        let inputs = kickoff_inputs(CrewKind::TechSage, "Rust");
        let options = CrewOptions::default();
        let request = ReasoningRequest {
            task: &tasks[1],
            inputs: &inputs,
            context: &[],
            tools: &tasks[1].agent.tools,
            options: &options,
        };

        let outcome = executor.perform(request).await.expect("should perform");
        final_round.assert_async().await;
        assert_eq!(outcome.answer, "answered without tools");
        assert!(outcome.observations.is_empty());
    }

    #[tokio::test]
    async fn test_generation_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .create_async()
            .await;

        let executor = compatible_executor(&server);
        let tasks = tasks_with_echo(executor.model(), Arc::new(EchoTool::new()));
        let inputs = kickoff_inputs(CrewKind::TechSage, "Rust");
        let options = CrewOptions::default();
        // the content generator has no tools, so only the final round runs
        let request = ReasoningRequest {
            task: &tasks[2],
            inputs: &inputs,
            context: &[],
            tools: &tasks[2].agent.tools,
            options: &options,
        };

        let result = executor.perform(request).await;
        assert!(matches!(result, Err(ExecutionError::GenerationFailed(_))));
    }

    #[tokio::test]
    #[ignore = "run this manually, requires a running Ollama"]
    async fn test_local_crew() {
        let config = Configuration::default();
        let executor = Executor::from_config(&config).expect("should build");
        let crew = Crew::new(CrewKind::TechSage, "Rust async runtimes", &config)
            .expect("should assemble");

        let result = crew.kickoff(&executor).await.expect("should run");
        println!("{}", result);
        assert!(!result.is_empty());
    }
}
