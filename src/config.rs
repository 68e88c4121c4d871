use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::motion::MotionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub adapters: AdaptersConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions endpoint, e.g. `https://host/v1/chat/completions`.
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key; the env var DESKPILOT_<ID>_API_KEY takes precedence.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Maps agent roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Vision model that reads the screenshot and answers with tool calls.
    pub vision: Option<RoleEntry>,
    /// Cheap text model used to label steps for display. Optional.
    pub classification: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f64 {
    0.3
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_screenshot_max_size")]
    pub screenshot_max_size: u32,
    /// Screens whose longer side is at most this many pixels are sent unscaled.
    #[serde(default = "default_scale_threshold")]
    pub scale_threshold: u32,
    #[serde(default = "default_post_batch_delay_ms")]
    pub post_batch_delay_ms: u64,
    /// Treat a reply with no tool call and no intervention hint as task completion.
    #[serde(default = "default_true")]
    pub finish_without_tool_call: bool,
    #[serde(default = "default_marker")]
    pub tool_call_marker: String,
    /// "windows", "macos" or "linux". Detected from the build target when absent.
    #[serde(default)]
    pub platform: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            screenshot_max_size: default_screenshot_max_size(),
            scale_threshold: default_scale_threshold(),
            post_batch_delay_ms: default_post_batch_delay_ms(),
            finish_without_tool_call: true,
            tool_call_marker: default_marker(),
            platform: None,
        }
    }
}

fn default_max_steps() -> u32 {
    50
}

fn default_screenshot_max_size() -> u32 {
    1024
}

fn default_scale_threshold() -> u32 {
    1920
}

fn default_post_batch_delay_ms() -> u64 {
    500
}

fn default_marker() -> String {
    crate::llm::tool_parser::DEFAULT_MARKER.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Sleep between input events so the UI can react. Disable for tests.
    #[serde(default = "default_true")]
    pub pacing: bool,
    #[serde(default = "default_scroll_notches")]
    pub scroll_notches: i32,
    #[serde(default = "default_max_wait_seconds")]
    pub max_wait_seconds: f64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pacing: true,
            scroll_notches: default_scroll_notches(),
            max_wait_seconds: default_max_wait_seconds(),
        }
    }
}

fn default_scroll_notches() -> i32 {
    5
}

fn default_max_wait_seconds() -> f64 {
    60.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_true")]
    pub allow_terminal_commands: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            allow_terminal_commands: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptersConfig {
    #[serde(default = "default_adapters_dir")]
    pub dir: PathBuf,
}

impl Default for AdaptersConfig {
    fn default() -> Self {
        Self {
            dir: default_adapters_dir(),
        }
    }
}

fn default_adapters_dir() -> PathBuf {
    PathBuf::from("adapters")
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptsConfig {
    /// Text file replacing the built-in platform prompt.
    #[serde(default)]
    pub system_template: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn resolve_config_path() -> DeskPilotResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("deskpilot").join("config.toml");
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(candidate);
        }
    }

    Err(DeskPilotError::Config(
        "config.toml not found next to executable, in working directory or user config dir".into(),
    ))
}

pub fn parse_config(content: &str) -> DeskPilotResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    let max_wait = config.executor.max_wait_seconds;
    if !max_wait.is_finite() || max_wait < 0.0 {
        return Err(DeskPilotError::Config(format!(
            "executor.max_wait_seconds must be a non-negative number, got {max_wait}"
        )));
    }
    Ok(config)
}

pub fn load_config() -> DeskPilotResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}
