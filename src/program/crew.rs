use super::agents;
use super::atomics::*;
use super::errors::ExecutionError;
use super::models::Model;
use super::tasks;
use crate::config::Configuration;
use crate::memory::ToolCache;
use crate::tools::{AgentTool, CachedTool, ScrapeTool, SearchTool};

use log::{debug, error, info, warn};
use std::sync::Arc;

/// An ordered list of tasks, each bound to one agent, executed one after the
/// other. Task `i` sees the outputs of tasks `0..i` as its context.
pub struct Crew {
    kind: CrewKind,
    inputs: KickoffInputs,
    tasks: Vec<TaskSpec>,
    options: CrewOptions,
    step_callback: Option<StepCallback>,
}

impl Crew {
    /// Assembles the crew of `kind` for `subject` with the tools resolved
    /// from the configuration.
    pub fn new(
        kind: CrewKind,
        subject: &str,
        config: &Configuration,
    ) -> Result<Self, ExecutionError> {
        config
            .validate()
            .map_err(|e| ExecutionError::InvalidConfiguration(e.to_string()))?;

        let search: Arc<dyn AgentTool> = Arc::new(SearchTool::from_config(config));
        let scrape: Arc<dyn AgentTool> = Arc::new(ScrapeTool::new());
        let crew = Self::with_tools(kind, subject, &Model::from_config(config), search, scrape)?;
        Ok(crew.with_options(CrewOptions::for_config(config)))
    }

    /// Assembles the crew around the given tools.
    pub fn with_tools(
        kind: CrewKind,
        subject: &str,
        model: &Model,
        search: Arc<dyn AgentTool>,
        scrape: Arc<dyn AgentTool>,
    ) -> Result<Self, ExecutionError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(ExecutionError::InvalidInput(
                "the subject of a crew cannot be empty".to_string(),
            ));
        }

        let roster = agents::roster(kind, search, scrape, model);
        let tasks = tasks::for_crew(kind, subject, &roster);
        debug!("Assembled {} crew with {:?}", kind, roster);

        Ok(Crew {
            kind,
            inputs: tasks::kickoff_inputs(kind, subject),
            tasks,
            options: CrewOptions::default(),
            step_callback: None,
        })
    }

    pub fn with_options(mut self, options: CrewOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_step_callback(mut self, callback: StepCallback) -> Self {
        self.step_callback = Some(callback);
        self
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn options(&self) -> &CrewOptions {
        &self.options
    }

    fn emit(&self, event: StepEvent) {
        if let Some(callback) = &self.step_callback {
            callback(event);
        }
    }

    fn tools_for(&self, agent: &AgentSpec, cache: &Arc<ToolCache>) -> Vec<Arc<dyn AgentTool>> {
        agent
            .tools
            .iter()
            .map(|tool| {
                if self.options.cache {
                    Arc::new(CachedTool::new(tool.clone(), cache.clone())) as Arc<dyn AgentTool>
                } else {
                    tool.clone()
                }
            })
            .collect()
    }

    /// Runs every task in order and returns all their outputs.
    pub async fn run_tasks(
        &self,
        reasoner: &dyn Reasoner,
    ) -> Result<Vec<TaskOutput>, ExecutionError> {
        warn!("------------------");
        warn!("Kicking off the {} crew", self.kind);
        info!(
            "Cache: {}, max rpm: {:?}, memory: {}",
            self.options.cache, self.options.max_rpm, self.options.memory
        );

        let cache = Arc::new(ToolCache::new());
        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(self.tasks.len());

        for task in &self.tasks {
            let agent = &task.agent;
            info!("Executing task: {} with agent {}", task.name, agent.role);
            self.emit(StepEvent::TaskStarted {
                task: task.name.clone(),
                agent: agent.role.clone(),
                avatar: agent.avatar.clone(),
            });

            let tools = self.tools_for(agent, &cache);
            let request = ReasoningRequest {
                task,
                inputs: &self.inputs,
                context: &outputs,
                tools: &tools,
                options: &self.options,
            };
            let outcome = match reasoner.perform(request).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Task [{}] failed: {}", task.name, e);
                    return Err(e);
                }
            };

            for observation in &outcome.observations {
                self.emit(StepEvent::ToolUsed {
                    agent: agent.role.clone(),
                    avatar: agent.avatar.clone(),
                    observation: observation.clone(),
                });
            }
            self.emit(StepEvent::TaskCompleted {
                agent: agent.role.clone(),
                avatar: agent.avatar.clone(),
                output: outcome.answer.clone(),
            });
            warn!("[{}] completed successfully", task.name);

            outputs.push(TaskOutput {
                task: task.name.clone(),
                agent: agent.role.clone(),
                raw: outcome.answer,
                observations: outcome.observations,
            });
        }

        warn!("Successfully completed the crew");
        Ok(outputs)
    }

    /// Runs the crew and returns the raw text of its last task.
    pub async fn kickoff(&self, reasoner: &dyn Reasoner) -> Result<String, ExecutionError> {
        let mut outputs = self.run_tasks(reasoner).await?;
        outputs
            .pop()
            .map(|output| output.raw)
            .ok_or_else(|| ExecutionError::CrewFailed("the crew has no task".to_string()))
    }
}

/// Given a subject, returns the result of the crew of `kind` working on it.
pub async fn run(
    kind: CrewKind,
    subject: &str,
    config: &Configuration,
    reasoner: &dyn Reasoner,
) -> Result<String, ExecutionError> {
    Crew::new(kind, subject, config)?.kickoff(reasoner).await
}
