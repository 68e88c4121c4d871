// Console front end: maps typed lines onto the agent handle and prints
// outbound events.
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::agent_engine::state::{AgentCommand, AgentEvent};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::AgentHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Resume,
    Quit,
    Status,
    Task(String),
    Empty,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.to_lowercase().as_str() {
            "" => Self::Empty,
            "continue" | "c" | "resume" => Self::Resume,
            "quit" | "exit" => Self::Quit,
            "status" => Self::Status,
            _ => Self::Task(line.to_string()),
        }
    }
}

/// One-line rendering of an event for the terminal.
pub fn format_event(event: &AgentEvent) -> String {
    match event {
        AgentEvent::TaskStarted { task_id, task } => format!("[{}] started: {task}", short(task_id)),
        AgentEvent::StepStarted { task_id, step, description } => {
            format!("[{}] step {step}: {description}", short(task_id))
        }
        AgentEvent::StepLabeled { task_id, step, label } => format!("[{}] step {step} ({label})", short(task_id)),
        AgentEvent::TaskPaused { task_id, message, guidance } => format!(
            "[{}] paused: {message}\n  {guidance}\n  Type 'continue' when done.",
            short(task_id)
        ),
        AgentEvent::TaskResumed { task_id } => format!("[{}] resumed", short(task_id)),
        AgentEvent::TaskComplete { task_id, message } => format!("[{}] complete: {message}", short(task_id)),
        AgentEvent::TaskFailed { task_id, message } => format!("[{}] failed: {message}", short(task_id)),
    }
}

fn short(task_id: &str) -> &str {
    task_id.get(..8).unwrap_or(task_id)
}

async fn submit(handle: &AgentHandle, task: String) -> DeskPilotResult<()> {
    handle
        .tx
        .send(AgentCommand::StartTask(task))
        .await
        .map_err(|e| DeskPilotError::Agent(format!("agent worker is gone: {e}")))
}

/// Reads console lines until `quit` or end of input.
pub async fn run_console(handle: AgentHandle, initial_task: Option<String>) -> DeskPilotResult<()> {
    let mut events = handle.events.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", format_event(&event)),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "console fell behind on events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    if let Some(task) = initial_task {
        submit(&handle, task).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match ConsoleCommand::parse(&line) {
            ConsoleCommand::Empty => {}
            ConsoleCommand::Resume => {
                if !handle.gate.release() {
                    println!("nothing to resume");
                }
            }
            ConsoleCommand::Status => {
                let state = handle.gate.snapshot();
                if state.is_paused {
                    println!("paused: {}", state.reason);
                } else {
                    println!("running");
                }
            }
            ConsoleCommand::Quit => break,
            ConsoleCommand::Task(task) => submit(&handle, task).await?,
        }
    }

    let _ = handle.tx.send(AgentCommand::Stop).await;
    printer.abort();
    Ok(())
}
