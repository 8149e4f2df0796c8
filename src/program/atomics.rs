use super::errors::ExecutionError;
use super::models::Model;
use crate::config::Configuration;
use crate::tools::AgentTool;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub static DEFAULT_MAX_RPM: u32 = 100;

/// Which crew to assemble for a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CrewKind {
    /// Searcher, scraper and content generator working on a topic.
    #[value(name = "techsage")]
    TechSage,
    /// Searcher, scraper and validator gathering public data on a company.
    Company,
}

impl fmt::Display for CrewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrewKind::TechSage => write!(f, "techsage"),
            CrewKind::Company => write!(f, "company"),
        }
    }
}

/// A role bound to the model, with a goal, a backstory and its tools.
#[derive(Clone)]
pub struct AgentSpec {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub avatar: String,
    pub tools: Vec<Arc<dyn AgentTool>>,
    /// Crews never let an agent hand its work to another one.
    pub delegation_allowed: bool,
    pub model: Model,
}

impl fmt::Debug for AgentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSpec")
            .field("role", &self.role)
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("delegation_allowed", &self.delegation_allowed)
            .field("model", &self.model.name)
            .finish()
    }
}

/// One templated unit of work assigned to exactly one agent.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    pub agent: Arc<AgentSpec>,
}

/// Values every prompt of a run is filled with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KickoffInputs {
    pub topic: String,
    pub quality_standard: String,
    pub goal: String,
}

/// A tool call made while performing a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub tool: String,
    pub input: String,
    pub output: String,
}

/// The text a task produced, kept as context for the following tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput {
    pub task: String,
    pub agent: String,
    pub raw: String,
    pub observations: Vec<Observation>,
}

/// Knobs of a crew run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrewOptions {
    /// Reuse tool results for identical calls within the run.
    pub cache: bool,
    /// Upper bound of model requests started per minute.
    pub max_rpm: Option<u32>,
    /// Carry tool observations of earlier tasks into later contexts.
    pub memory: bool,
}

impl Default for CrewOptions {
    fn default() -> Self {
        CrewOptions {
            cache: true,
            max_rpm: Some(DEFAULT_MAX_RPM),
            memory: false,
        }
    }
}

impl CrewOptions {
    pub fn for_config(config: &Configuration) -> Self {
        CrewOptions {
            memory: config.has_hosted_key(),
            ..CrewOptions::default()
        }
    }
}

/// Progress of a run, reported to the step callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    TaskStarted {
        task: String,
        agent: String,
        avatar: String,
    },
    ToolUsed {
        agent: String,
        avatar: String,
        observation: Observation,
    },
    TaskCompleted {
        agent: String,
        avatar: String,
        output: String,
    },
}

pub type StepCallback = Arc<dyn Fn(StepEvent) + Send + Sync>;

/// Everything the model needs to perform one task.
pub struct ReasoningRequest<'a> {
    pub task: &'a TaskSpec,
    pub inputs: &'a KickoffInputs,
    /// Outputs of all previous tasks, in execution order.
    pub context: &'a [TaskOutput],
    /// The agent's tools, possibly wrapped by the crew.
    pub tools: &'a [Arc<dyn AgentTool>],
    pub options: &'a CrewOptions,
}

impl ReasoningRequest<'_> {
    pub fn agent(&self) -> &AgentSpec {
        &self.task.agent
    }
}

/// What an agent answered and the tools it used to get there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReasoningOutcome {
    pub answer: String,
    pub observations: Vec<Observation>,
}

/// The reasoning capability a crew runs on: given a task, its context and
/// its tools, produce the task's answer, calling the tools zero or more times.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn perform(
        &self,
        request: ReasoningRequest<'_>,
    ) -> Result<ReasoningOutcome, ExecutionError>;
}
