//! Conversational front end of the crews.
//!
//! A [`ChatSession`] keeps the transcript and moves through
//! `Idle -> AwaitingResult -> Display | Failed` for every submitted topic.
//! [`run_terminal`] drives a session from the standard input.

pub mod format;

use crate::config::{ConfigStore, Configuration};
use crate::program::atomics::{CrewKind, Reasoner, StepEvent};
use crate::program::crew::Crew;
use crate::program::errors::ExecutionError;

use colored::*;
use log::{info, warn};
use parking_lot::Mutex;
use std::error::Error;
use std::fmt::Write as _;
use std::future::Future;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::task::{JoinError, JoinHandle};

pub static ASSISTANT_NAME: &str = "TechSage";
pub static THINKING: &str = "🤔 Thinking...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub author: String,
    pub avatar: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            author: "You".to_string(),
            avatar: "👤".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            author: ASSISTANT_NAME.to_string(),
            avatar: "🤖".to_string(),
            content: content.into(),
        }
    }

    fn agent(role: &str, avatar: &str, content: String) -> Self {
        ChatMessage {
            author: role.to_string(),
            avatar: avatar.to_string(),
            content,
        }
    }
}

impl From<StepEvent> for ChatMessage {
    fn from(event: StepEvent) -> Self {
        match event {
            StepEvent::TaskStarted {
                task,
                agent,
                avatar,
            } => ChatMessage::agent(&agent, &avatar, format!("Working on `{}`", task)),
            StepEvent::ToolUsed {
                agent,
                avatar,
                observation,
            } => ChatMessage::agent(
                &agent,
                &avatar,
                format!(
                    " - **Tool** : `{}`\n - **Tool Input** : `{}`\n\n**Output** :\n\n```\n{}\n```",
                    observation.tool,
                    observation.input.replace('\n', " "),
                    observation.output
                ),
            ),
            StepEvent::TaskCompleted {
                agent,
                avatar,
                output,
            } => ChatMessage::agent(&agent, &avatar, format!("```\n{}\n```", output)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Idle,
    AwaitingResult,
    Display,
    Failed,
}

/// The error with every error it was caused by, one per line.
pub fn error_report(error: &dyn Error) -> String {
    let mut report = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(report, "\nCaused by: {}", cause);
        source = cause.source();
    }
    report
}

pub type PendingResult = JoinHandle<Result<String, ExecutionError>>;

/// A topic handed to a crew.
pub struct Submission {
    pub pending: PendingResult,
    /// Length of the transcript before the crew started, the echoed topic
    /// included. Messages from this index on come from the crew.
    pub transcript_len: usize,
}

pub struct ChatSession {
    kind: CrewKind,
    config: Configuration,
    reasoner: Arc<dyn Reasoner>,
    messages: Arc<Mutex<Vec<ChatMessage>>>,
    state: ShellState,
}

impl ChatSession {
    pub fn new(kind: CrewKind, config: Configuration, reasoner: Arc<dyn Reasoner>) -> Self {
        ChatSession {
            kind,
            config,
            reasoner,
            messages: Arc::new(Mutex::new(Vec::new())),
            state: ShellState::Idle,
        }
    }

    pub fn state(&self) -> ShellState {
        self.state
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().clone()
    }

    /// Messages from index `from` onwards.
    pub fn messages_since(&self, from: usize) -> Vec<ChatMessage> {
        self.messages.lock().iter().skip(from).cloned().collect()
    }

    fn push(&self, message: ChatMessage) {
        self.messages.lock().push(message);
    }

    /// Echoes the topic and starts a crew on it in the background. Progress of
    /// the agents lands in the transcript while it runs.
    pub fn submit(&mut self, topic: &str) -> Result<Submission, ExecutionError> {
        if self.state == ShellState::AwaitingResult {
            return Err(ExecutionError::InvalidInput(
                "a topic is already being processed".to_string(),
            ));
        }
        self.push(ChatMessage::user(topic));
        self.state = ShellState::AwaitingResult;
        info!("Submitting \"{}\" to the {} crew", topic, self.kind);

        let kind = self.kind;
        let topic = topic.to_string();
        let config = self.config.clone();
        let reasoner = self.reasoner.clone();
        let transcript = self.messages.clone();
        let transcript_len = transcript.lock().len();

        let pending = tokio::spawn(async move {
            let crew = Crew::new(kind, &topic, &config)?.with_step_callback(Arc::new(
                move |event: StepEvent| transcript.lock().push(ChatMessage::from(event)),
            ));
            crew.kickoff(reasoner.as_ref()).await
        });
        Ok(Submission {
            pending,
            transcript_len,
        })
    }

    /// Records the outcome of a submitted topic.
    pub fn finish(
        &mut self,
        outcome: Result<Result<String, ExecutionError>, JoinError>,
    ) -> ShellState {
        let failure = match outcome {
            Ok(Ok(result)) => {
                self.push(ChatMessage::assistant(result));
                self.state = ShellState::Display;
                return self.state;
            }
            Ok(Err(e)) => error_report(&e),
            Err(e) => error_report(&e),
        };
        warn!("Crew run failed: {}", failure);
        self.push(ChatMessage::assistant(format!(
            "❌ An error occurred during the search:\n{}",
            failure
        )));
        self.state = ShellState::Failed;
        self.state
    }

    /// Waits for a submitted topic and records its outcome.
    pub async fn resolve(&mut self, pending: PendingResult) -> ShellState {
        let outcome = pending.await;
        self.finish(outcome)
    }
}

fn render(message: &ChatMessage) {
    println!(
        "\n{} {}:\n{}",
        message.avatar,
        message.author.bold(),
        message.content
    );
}

fn save_transcript(session: &ChatSession, path: &str) {
    let html = format::transcript_html(&session.messages());
    match std::fs::write(path, html) {
        Ok(()) => println!(" 💾 Transcript saved in {}", path),
        Err(e) => println!(" ❌ Could not save the transcript: {}", e),
    }
}

fn show_config(session: &ChatSession, store: &ConfigStore) {
    match serde_json::to_string_pretty(&session.config().masked()) {
        Ok(json) => println!(" ⚙️  {}\n{}", store.path().display(), json),
        Err(e) => println!(" ❌ Could not display the configuration: {}", e),
    }
}

/// Next line of input, or `None` at end of input or once `interrupt` completes.
async fn next_input<R, F>(lines: &mut Lines<R>, interrupt: F) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => Ok(None),
    }
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        // no signal handling, never interrupt
        std::future::pending::<()>().await;
    }
}

/// Reads topics from the standard input until `/quit`, end of input or Ctrl-C.
pub async fn run_terminal(mut session: ChatSession, store: &ConfigStore) -> std::io::Result<()> {
    println!("\n 👋 Welcome to TechSage Information Gatherer");
    println!("---------------------------------------------");
    println!(" Type a topic, or /save <file>, /config, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = next_input(&mut lines, ctrl_c()).await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/config" => {
                show_config(&session, store);
                continue;
            }
            _ => {}
        }
        if let Some(path) = line.strip_prefix("/save") {
            let path = path.trim();
            if path.is_empty() {
                println!(" Usage: /save <file>");
            } else {
                save_transcript(&session, path);
            }
            continue;
        }

        let Submission {
            mut pending,
            transcript_len,
        } = match session.submit(line) {
            Ok(submission) => submission,
            Err(e) => {
                println!(" ❌ {}", e);
                continue;
            }
        };
        // the echoed topic is already on screen
        let mut shown = transcript_len;
        println!("{}", THINKING.italic());

        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        loop {
            tokio::select! {
                outcome = &mut pending => {
                    session.finish(outcome);
                    break;
                }
                _ = ctrl_c() => {
                    warn!("Interrupted, abandoning the current topic");
                    pending.abort();
                    let outcome = (&mut pending).await;
                    session.finish(outcome);
                    break;
                }
                _ = ticker.tick() => {
                    for message in session.messages_since(shown) {
                        render(&message);
                        shown += 1;
                    }
                }
            }
        }
        for message in session.messages_since(shown) {
            render(&message);
            shown += 1;
        }
    }

    println!("\n 👋 Bye");
    Ok(())
}
