pub mod agent_engine;
pub mod commands;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::agent_engine::engine::{AgentEngine, EngineParts};
use crate::agent_engine::event_bus::EventBus;
use crate::agent_engine::gate::PauseGate;
use crate::agent_engine::labeler::StepLabeler;
use crate::agent_engine::prompt::{Platform, PromptBuilder};
use crate::agent_engine::state::AgentCommand;
use crate::config::AppConfig;
use crate::errors::DeskPilotResult;
use crate::executor::adapter::AdapterRegistry;
use crate::executor::dispatcher::ActionExecutor;
use crate::executor::input::EnigoInput;
use crate::llm::registry::{ProviderRegistry, ROLE_CLASSIFICATION, ROLE_VISION};
use crate::perception::screenshot::XcapCapturer;

/// Front-end side of the agent: command channel, pause gate and event bus.
pub struct AgentHandle {
    pub tx: mpsc::Sender<AgentCommand>,
    pub gate: Arc<PauseGate>,
    pub events: EventBus,
}

/// Builds the engine from config. Must run on the worker thread: the input
/// backend is not `Send`.
fn build_engine(config: &AppConfig, gate: Arc<PauseGate>, events: EventBus) -> DeskPilotResult<AgentEngine> {
    let registry = ProviderRegistry::from_config(config);
    let (provider, call_config) = registry.call_config_for_role(ROLE_VISION)?;

    let adapters = AdapterRegistry::load_dir(&config.adapters.dir)?;
    let executor = ActionExecutor::new(
        Box::new(EnigoInput::new()?),
        adapters,
        config.executor.clone(),
        config.motion.clone(),
        config.safety.clone(),
    );
    let capturer = Arc::new(XcapCapturer::new(
        config.agent.screenshot_max_size,
        config.agent.scale_threshold,
    ));

    let platform = Platform::from_name(config.agent.platform.as_deref());
    let mut prompt = PromptBuilder::new(platform, config.agent.tool_call_marker.clone())?;
    if let Some(path) = &config.prompts.system_template {
        prompt = prompt.with_template_file(path)?;
    }

    let mut engine = AgentEngine::new(EngineParts {
        capturer,
        executor,
        provider,
        call_config,
        gate,
        events: events.clone(),
        prompt,
        config: config.agent.clone(),
    })?;

    if registry.has_role(ROLE_CLASSIFICATION) {
        let (provider, call_config) = registry.call_config_for_role(ROLE_CLASSIFICATION)?;
        engine = engine.with_labeler(StepLabeler::new(provider, call_config, events));
    }
    tracing::info!(platform = platform.display_name(), "agent engine ready");
    Ok(engine)
}

/// Starts the agent worker on its own OS thread with a current-thread runtime.
pub fn spawn_agent(config: AppConfig) -> DeskPilotResult<(AgentHandle, std::thread::JoinHandle<()>)> {
    let gate = Arc::new(PauseGate::new());
    let events = EventBus::new();
    let (tx, mut rx) = mpsc::channel::<AgentCommand>(32);

    let worker_gate = gate.clone();
    let worker_events = events.clone();
    let worker = std::thread::Builder::new()
        .name("deskpilot-agent".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!(error = %e, "failed to build agent runtime");
                    return;
                }
            };
            runtime.block_on(async move {
                let mut engine = match build_engine(&config, worker_gate, worker_events) {
                    Ok(engine) => engine,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to start agent engine");
                        return;
                    }
                };
                while let Some(cmd) = rx.recv().await {
                    match cmd {
                        AgentCommand::StartTask(task) => {
                            let outcome = engine.run_task(&task).await;
                            tracing::info!(?outcome, "task finished");
                        }
                        AgentCommand::Stop => break,
                    }
                }
                tracing::info!("agent worker exited");
            });
        })?;

    Ok((AgentHandle { tx, gate, events }, worker))
}

pub async fn run(initial_task: Option<String>) -> DeskPilotResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let config = config::load_config()?;
    let (handle, _worker) = spawn_agent(config)?;
    commands::run_console(handle, initial_task).await
}
