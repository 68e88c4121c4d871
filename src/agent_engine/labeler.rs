// Short step labels for the front end. Runs beside the loop on a copy of
// the model reply and never writes to the transcript.
use std::sync::Arc;

use crate::agent_engine::event_bus::EventBus;
use crate::agent_engine::state::AgentEvent;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage};

const DESCRIPTION_MAX_CHARS: usize = 80;
const LABEL_MAX_CHARS: usize = 40;

const LABEL_PROMPT: &str = "Summarise the following desktop-automation step as a label of at most eight words. \
Reply with the label only.";

/// First line of a reply that is not a tool call, trimmed to a readable length.
pub fn describe_step(response: &str, marker: &str) -> String {
    let line = response
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.contains(marker))
        .unwrap_or("Executing actions");
    truncate_chars(line, DESCRIPTION_MAX_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

pub struct StepLabeler {
    provider: Arc<dyn LlmProvider>,
    config: CallConfig,
    events: EventBus,
}

impl StepLabeler {
    pub fn new(provider: Arc<dyn LlmProvider>, config: CallConfig, events: EventBus) -> Self {
        Self { provider, config, events }
    }

    /// Spawns the classification on the current runtime; the result is
    /// published as `step_labeled` and failures are only logged.
    pub fn spawn(&self, task_id: &str, step: u32, response: String) -> tokio::task::JoinHandle<()> {
        let provider = self.provider.clone();
        let config = self.config.clone();
        let events = self.events.clone();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            let messages = vec![ChatMessage::system(LABEL_PROMPT), ChatMessage::user(response)];
            match provider.chat(messages, &config).await {
                Ok(reply) => {
                    let label = reply.content.lines().next().unwrap_or("").trim();
                    if label.is_empty() {
                        return;
                    }
                    events.publish(AgentEvent::StepLabeled {
                        task_id,
                        step,
                        label: truncate_chars(label, LABEL_MAX_CHARS),
                    });
                }
                Err(e) => tracing::debug!(error = %e, step, "step labeling failed"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DeskPilotResult;
    use crate::llm::types::LlmResponse;

    struct Echo;

    #[async_trait::async_trait]
    impl LlmProvider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn chat(&self, _messages: Vec<ChatMessage>, _config: &CallConfig) -> DeskPilotResult<LlmResponse> {
            Ok(LlmResponse {
                content: "Open the browser\nextra".into(),
                reasoning: String::new(),
            })
        }
    }

    #[test]
    fn description_skips_tool_call_lines() {
        let reply = "\n<|tool_call|>mouse_click(x=0.5, y=0.5)<|tool_call|>\nClicking the search box";
        assert_eq!(describe_step(reply, "<|tool_call|>"), "Clicking the search box");
        assert_eq!(describe_step("", "<|tool_call|>"), "Executing actions");
    }

    #[test]
    fn long_descriptions_are_truncated() {
        let long = "a".repeat(200);
        assert_eq!(describe_step(&long, "<|tool_call|>").chars().count(), DESCRIPTION_MAX_CHARS + 1);
    }

    #[tokio::test]
    async fn publishes_label() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let config = CallConfig {
            model: "m".into(),
            stream: false,
            temperature: 0.0,
            max_tokens: 32,
        };
        StepLabeler::new(Arc::new(Echo), config, bus.clone())
            .spawn("t1", 3, "reply".into())
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            AgentEvent::StepLabeled {
                task_id: "t1".into(),
                step: 3,
                label: "Open the browser".into(),
            }
        );
    }
}
