use std::path::Path;

use crate::agent_engine::history::OperationHistory;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::tools::{load_builtin_tools, render_catalog};
use crate::llm::types::ToolSpec;
use crate::perception::types::ScreenGeometry;

const BASE_TEMPLATE: &str = include_str!("../../prompts/system/base.md");

const ADJUSTMENT_ADVICE: &str = "If this action has the same type as an earlier one at a nearby position, \
start from the last successful position and fine-tune it. If an earlier action failed, shift the coordinates slightly.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Unknown names fall back to the running platform.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::to_ascii_lowercase).as_deref() {
            Some("windows") => Self::Windows,
            Some("macos") | Some("mac") | Some("darwin") => Self::MacOs,
            Some("linux") => Self::Linux,
            _ => Self::current(),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::MacOs => "macOS",
            Self::Linux => "Linux",
        }
    }

    fn notes(&self) -> &'static str {
        match self {
            Self::Windows => "Platform notes:\n\
- The taskbar is at the bottom; press_windows_key opens the Start menu search.\n\
- Close windows with close_window on the X button at the top-right corner.",
            Self::MacOs => "Platform notes:\n\
- The menu bar is at the top and the Dock at the bottom; press_hotkey(hotkey=\"cmd+space\") opens Spotlight.\n\
- The close button is the red circle at the top-left of a window.",
            Self::Linux => "Platform notes:\n\
- Desktop layouts vary; read the screenshot for panels and launchers before acting.\n\
- open_terminal starts the default terminal emulator.",
        }
    }
}

/// Builds the system message shown at the start of every task.
pub struct PromptBuilder {
    platform: Platform,
    marker: String,
    tools: Vec<ToolSpec>,
    template: Option<String>,
}

impl PromptBuilder {
    pub fn new(platform: Platform, marker: impl Into<String>) -> DeskPilotResult<Self> {
        Ok(Self {
            platform,
            marker: marker.into(),
            tools: load_builtin_tools()?,
            template: None,
        })
    }

    /// Replaces the built-in body with a template file. The file may use
    /// `{screen_width}` and `{screen_height}`.
    pub fn with_template_file(mut self, path: &Path) -> DeskPilotResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DeskPilotError::Config(format!("cannot read prompt template {}: {e}", path.display()))
        })?;
        tracing::info!(path = %path.display(), "using custom system prompt template");
        self.template = Some(text);
        Ok(self)
    }

    fn body(&self, width: u32, height: u32) -> String {
        let size = |t: &str| {
            t.replace("{screen_width}", &width.to_string())
                .replace("{screen_height}", &height.to_string())
        };
        match &self.template {
            Some(t) => size(t),
            None => size(BASE_TEMPLATE)
                .replace("{platform}", self.platform.display_name())
                .replace("{tools}", &render_catalog(&self.tools))
                .replace("{platform_notes}", self.platform.notes())
                .replace("{marker}", &self.marker),
        }
    }

    /// History context first, then the body sized to `screen`.
    pub fn build(&self, screen: (u32, u32), history: &OperationHistory) -> String {
        let positions = history.successful_positions_summary();
        let positions = if positions.is_empty() { "none".to_string() } else { positions };
        format!(
            "Operation history:\nRecent operations: {}\nLast successful positions:\n{}\nAdjustment advice: {}\n\n{}",
            history.summary(),
            positions,
            ADJUSTMENT_ADVICE,
            self.body(screen.0, screen.1)
        )
        .trim()
        .to_string()
    }
}

/// Screen size to advertise, in input-device pixels.
pub fn screen_size(geometry: Option<ScreenGeometry>) -> (u32, u32) {
    geometry
        .map(|g| (g.original_width, g.original_height))
        .unwrap_or((1920, 1080))
}
