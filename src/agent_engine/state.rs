use serde::{Deserialize, Serialize};

use crate::executor::dispatcher::ExecutionReport;
use crate::llm::tool_parser::ToolCall;
use crate::perception::types::Point;

/// Lifecycle states of one task run.
#[derive(Debug, Clone)]
pub enum LoopState {
    Init,
    Perceiving,
    AwaitingModel,
    Parsing { response: String },
    Executing { calls: Vec<ToolCall> },
    Paused { reason: String, source: PauseSource },
    Completed { message: String, explicit: bool },
    Failed { error: String },
}

impl LoopState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Perceiving => "perceiving",
            Self::AwaitingModel => "awaiting_model",
            Self::Parsing { .. } => "parsing",
            Self::Executing { .. } => "executing",
            Self::Paused { .. } => "paused",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// What put the loop into `Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseSource {
    PauseTool,
    Intervention,
    CaptureFailure,
}

/// How a task run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// `explicit` is false when completion was inferred from a reply with no tool call.
    Completed { message: String, explicit: bool },
    MaxStepsReached { steps: u32 },
    Failed { error: String },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseState {
    pub is_paused: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub action_type: String,
    pub position: Option<Point>,
    pub success: bool,
    pub result_text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl OperationRecord {
    pub fn new(action_type: impl Into<String>, position: Option<Point>, success: bool, result_text: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            position,
            success,
            result_text: result_text.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn from_report(report: &ExecutionReport) -> Vec<Self> {
        report
            .entries
            .iter()
            .map(|e| Self::new(e.tool.clone(), e.position, e.success, e.text.clone()))
            .collect()
    }
}

/// Outbound progress events for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    TaskStarted { task_id: String, task: String },
    StepStarted { task_id: String, step: u32, description: String },
    StepLabeled { task_id: String, step: u32, label: String },
    TaskPaused { task_id: String, message: String, guidance: String },
    TaskResumed { task_id: String },
    TaskComplete { task_id: String, message: String },
    TaskFailed { task_id: String, message: String },
}

/// Commands sent from the front end to the worker.
#[derive(Debug, Clone)]
pub enum AgentCommand {
    StartTask(String),
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialise_with_snake_case_tag() {
        let ev = AgentEvent::TaskPaused {
            task_id: "t1".into(),
            message: "验证码".into(),
            guidance: "solve it".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "task_paused");
        assert_eq!(json["task_id"], "t1");
        assert_eq!(json["message"], "验证码");
    }

    #[test]
    fn outcome_success() {
        assert!(TaskOutcome::Completed { message: "ok".into(), explicit: true }.is_success());
        assert!(!TaskOutcome::MaxStepsReached { steps: 3 }.is_success());
    }
}
