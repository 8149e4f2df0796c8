mod api_interface;
pub mod config;
mod memory;
pub mod program;
pub mod shell;
pub mod tools;

pub use config::{
    ConfigError, ConfigStore, Configuration, Configurator, ConfigureArgs, ModelRunner, OllamaCli,
    DEFAULT_MODEL,
};
pub use memory::ToolCache;
pub use program::{
    atomics::{
        AgentSpec, CrewKind, CrewOptions, KickoffInputs, Observation, Reasoner, ReasoningOutcome,
        ReasoningRequest, StepCallback, StepEvent, TaskOutput, TaskSpec,
    },
    crew::{run, Crew},
    errors::ExecutionError,
    executor::Executor,
    models::{Model, ModelProvider},
};
pub use shell::{error_report, run_terminal, ChatMessage, ChatSession, ShellState, Submission};
pub use tools::{AgentTool, ScrapeTool, SearchStrategy, SearchTool};
