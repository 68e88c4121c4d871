use std::sync::Arc;

use crate::agent_engine::event_bus::EventBus;
use crate::agent_engine::gate::PauseGate;
use crate::agent_engine::history::OperationHistory;
use crate::agent_engine::intervention::{InterventionCategory, InterventionClassifier};
use crate::agent_engine::labeler::{describe_step, StepLabeler};
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::prompt::{screen_size, PromptBuilder};
use crate::agent_engine::state::{AgentEvent, LoopState, OperationRecord, PauseSource, TaskOutcome};
use crate::agent_engine::transcript::Transcript;
use crate::config::AgentConfig;
use crate::errors::DeskPilotResult;
use crate::executor::dispatcher::{ActionExecutor, ControlSignal};
use crate::llm::provider::LlmProvider;
use crate::llm::tool_parser::ToolCallParser;
use crate::llm::types::{CallConfig, ChatMessage};
use crate::perception::screenshot::ScreenCapturer;
use crate::perception::types::ScreenGeometry;

pub const CAPTURE_FAILURE_REASON: &str = "capture failure";
pub const RESULTS_LEAD_IN: &str = "Tool execution results:";

const CONTINUE_PROMPT: &str = "This is the current screen state, continue the task";
const NUDGE_PROMPT: &str = "No tool call was found in your last reply. If the task is finished call complete_task, \
otherwise issue the next tool call.";
const CAPTURE_GUIDANCE: &str = "Screen capture failed. Check the screen-recording permission for this program, then continue.";

/// Everything the loop needs, built once at startup.
pub struct EngineParts {
    pub capturer: Arc<dyn ScreenCapturer>,
    pub executor: ActionExecutor,
    pub provider: Arc<dyn LlmProvider>,
    pub call_config: CallConfig,
    pub gate: Arc<PauseGate>,
    pub events: EventBus,
    pub prompt: PromptBuilder,
    pub config: AgentConfig,
}

pub struct AgentEngine {
    state: LoopState,
    capturer: Arc<dyn ScreenCapturer>,
    executor: ActionExecutor,
    provider: Arc<dyn LlmProvider>,
    call_config: CallConfig,
    labeler: Option<StepLabeler>,
    gate: Arc<PauseGate>,
    events: EventBus,
    classifier: InterventionClassifier,
    parser: ToolCallParser,
    prompt: PromptBuilder,
    config: AgentConfig,
    loop_ctrl: LoopController,
    history: OperationHistory,

    // ── Per-task context ──────────────────────────────────────────────────
    transcript: Transcript,
    task_id: String,
    task: String,
    introduced: bool,
    /// Text of the next user turn, replacing the default "continue" prompt.
    next_prompt: Option<String>,
    pause_guidance: Option<&'static str>,
    last_geometry: Option<ScreenGeometry>,
}

impl AgentEngine {
    pub fn new(parts: EngineParts) -> DeskPilotResult<Self> {
        let parser = ToolCallParser::new(&parts.config.tool_call_marker)?;
        Ok(Self {
            state: LoopState::Init,
            capturer: parts.capturer,
            executor: parts.executor,
            provider: parts.provider,
            call_config: parts.call_config,
            labeler: None,
            gate: parts.gate,
            events: parts.events,
            classifier: InterventionClassifier::builtin(),
            parser,
            prompt: parts.prompt,
            loop_ctrl: LoopController::new(parts.config.max_steps),
            config: parts.config,
            history: OperationHistory::new(),
            transcript: Transcript::new(),
            task_id: String::new(),
            task: String::new(),
            introduced: false,
            next_prompt: None,
            pause_guidance: None,
            last_geometry: None,
        })
    }

    pub fn with_labeler(mut self, labeler: StepLabeler) -> Self {
        self.labeler = Some(labeler);
        self
    }

    pub fn gate(&self) -> Arc<PauseGate> {
        self.gate.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn history(&self) -> &OperationHistory {
        &self.history
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Drives one task from the first screenshot to a terminal outcome.
    pub async fn run_task(&mut self, task: &str) -> TaskOutcome {
        self.task_id = uuid::Uuid::new_v4().to_string();
        self.task = task.to_string();
        self.state = LoopState::Init;
        tracing::info!(task_id = %self.task_id, task = %task, "task started");
        self.events.publish(AgentEvent::TaskStarted {
            task_id: self.task_id.clone(),
            task: task.to_string(),
        });

        loop {
            tracing::debug!(state = self.state.name(), step = self.loop_ctrl.steps(), "loop state");

            match self.state.clone() {
                // ── Init: fresh transcript with the system instruction ────
                LoopState::Init => {
                    self.loop_ctrl = LoopController::new(self.config.max_steps);
                    self.introduced = false;
                    self.next_prompt = None;
                    self.pause_guidance = None;
                    let system = self.prompt.build(screen_size(self.last_geometry), &self.history);
                    self.transcript.reset(system);
                    self.state = LoopState::Perceiving;
                }

                // ── Perceiving: screenshot + geometry → user turn ─────────
                LoopState::Perceiving => {
                    let Some(step) = self.loop_ctrl.begin_step() else {
                        let steps = self.loop_ctrl.steps();
                        self.events.publish(AgentEvent::TaskFailed {
                            task_id: self.task_id.clone(),
                            message: format!("maximum of {steps} steps reached"),
                        });
                        return TaskOutcome::MaxStepsReached { steps };
                    };
                    tracing::info!(step, "capturing screen");

                    match self.capturer.capture().await {
                        Ok(shot) => {
                            self.executor.set_geometry(shot.geometry);
                            self.last_geometry = Some(shot.geometry);
                            let text = if !self.introduced {
                                self.introduced = true;
                                self.next_prompt = None;
                                let (w, h) = screen_size(Some(shot.geometry));
                                self.transcript.set_system(self.prompt.build((w, h), &self.history));
                                format!("Please complete the following task: {}", self.task)
                            } else {
                                self.next_prompt.take().unwrap_or_else(|| CONTINUE_PROMPT.to_string())
                            };
                            tracing::debug!(
                                original = %format!("{}x{}", shot.geometry.original_width, shot.geometry.original_height),
                                scaled = %format!("{}x{}", shot.geometry.scaled_width, shot.geometry.scaled_height),
                                "screenshot ready"
                            );
                            self.transcript.push(ChatMessage::user_with_image(text, shot.data_url()));
                            self.state = LoopState::AwaitingModel;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, step, "screen capture failed → Paused");
                            self.history
                                .record(OperationRecord::new("screenshot", None, false, e.to_string()));
                            self.pause_guidance = Some(CAPTURE_GUIDANCE);
                            self.state = LoopState::Paused {
                                reason: CAPTURE_FAILURE_REASON.to_string(),
                                source: PauseSource::CaptureFailure,
                            };
                        }
                    }
                }

                // ── AwaitingModel: one request, no retry ──────────────────
                LoopState::AwaitingModel => {
                    let messages = self.transcript.request_messages();
                    tracing::info!(
                        messages = messages.len(),
                        model = %self.call_config.model,
                        provider = self.provider.name(),
                        "calling vision model"
                    );
                    match self.provider.chat(messages, &self.call_config).await {
                        Ok(response) => {
                            let step = self.loop_ctrl.steps();
                            tracing::info!(step, chars = response.content.len(), "model replied");
                            self.transcript.push(ChatMessage::assistant(response.content.clone()));
                            self.events.publish(AgentEvent::StepStarted {
                                task_id: self.task_id.clone(),
                                step,
                                description: describe_step(&response.content, self.parser.marker()),
                            });
                            if let Some(labeler) = &self.labeler {
                                labeler.spawn(&self.task_id, step, response.content.clone());
                            }
                            self.state = LoopState::Parsing {
                                response: response.content,
                            };
                        }
                        Err(e) => {
                            tracing::error!(error = %e, transport = e.is_model_failure(), "model call failed → Failed");
                            self.state = LoopState::Failed { error: e.to_string() };
                        }
                    }
                }

                // ── Parsing: calls, or intervention scan ──────────────────
                LoopState::Parsing { response } => {
                    let calls = self.parser.parse(&response);
                    if !calls.is_empty() {
                        tracing::info!(calls = calls.len(), "tool calls parsed");
                        self.state = LoopState::Executing { calls };
                        continue;
                    }

                    if let Some(hit) = self.classifier.classify(&response) {
                        tracing::info!(category = %hit.category, reason = %hit.reason, "intervention detected → Paused");
                        self.pause_guidance = Some(hit.guidance());
                        self.state = LoopState::Paused {
                            reason: hit.reason,
                            source: PauseSource::Intervention,
                        };
                    } else if self.config.finish_without_tool_call {
                        tracing::info!("reply without tool call → treating task as finished");
                        self.state = LoopState::Completed {
                            message: response.trim().to_string(),
                            explicit: false,
                        };
                    } else {
                        tracing::info!("reply without tool call → nudging model");
                        self.next_prompt = Some(NUDGE_PROMPT.to_string());
                        self.state = LoopState::Perceiving;
                    }
                }

                // ── Executing: run the batch, feed results back ───────────
                LoopState::Executing { calls } => {
                    let report = self.executor.execute(&calls).await;
                    for record in OperationRecord::from_report(&report) {
                        self.history.record(record);
                    }
                    tracing::info!(
                        entries = report.entries.len(),
                        failures = report.failures(),
                        "batch executed"
                    );
                    self.transcript
                        .push(ChatMessage::user(format!("{RESULTS_LEAD_IN}\n{report}")));

                    self.state = match report.signal {
                        Some(ControlSignal::Complete { message }) => LoopState::Completed { message, explicit: true },
                        Some(ControlSignal::Pause { reason }) => {
                            self.pause_guidance = None;
                            LoopState::Paused {
                                reason,
                                source: PauseSource::PauseTool,
                            }
                        }
                        None => {
                            if self.config.post_batch_delay_ms > 0 {
                                tokio::time::sleep(std::time::Duration::from_millis(self.config.post_batch_delay_ms))
                                    .await;
                            }
                            LoopState::Perceiving
                        }
                    };
                }

                // ── Paused: block on the gate until the user releases ─────
                LoopState::Paused { reason, source } => {
                    let guidance = self
                        .pause_guidance
                        .take()
                        .unwrap_or_else(|| InterventionCategory::NeedsUserInput.guidance());
                    tracing::info!(reason = %reason, ?source, "waiting for user");
                    self.gate.pause(reason.clone());
                    self.events.publish(AgentEvent::TaskPaused {
                        task_id: self.task_id.clone(),
                        message: reason.clone(),
                        guidance: guidance.to_string(),
                    });

                    self.gate.wait_for_release().await;

                    tracing::info!(reason = %reason, "resumed by user");
                    self.events.publish(AgentEvent::TaskResumed {
                        task_id: self.task_id.clone(),
                    });
                    self.history
                        .record(OperationRecord::new("manual_intervention", None, true, reason.clone()));
                    if self.introduced {
                        self.next_prompt = Some(format!(
                            "The user has completed the '{reason}' action, please continue the task"
                        ));
                    }
                    self.state = LoopState::Perceiving;
                }

                LoopState::Completed { message, explicit } => {
                    tracing::info!(explicit, message = %message, "task complete");
                    self.events.publish(AgentEvent::TaskComplete {
                        task_id: self.task_id.clone(),
                        message: message.clone(),
                    });
                    return TaskOutcome::Completed { message, explicit };
                }

                LoopState::Failed { error } => {
                    self.events.publish(AgentEvent::TaskFailed {
                        task_id: self.task_id.clone(),
                        message: error.clone(),
                    });
                    return TaskOutcome::Failed { error };
                }
            }
        }
    }
}
