use thiserror::Error;

/// Errors raised while building or running a crew.
///
/// Tool failures are not part of this enum, tools report them as text.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Text generation failed: {0}")]
    GenerationFailed(String),
    #[error("Crew run failed: {0}")]
    CrewFailed(String),
}
