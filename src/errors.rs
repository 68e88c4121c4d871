use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeskPilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Screen capture failed: {0}")]
    Capture(String),

    #[error("Input simulation error: {0}")]
    Input(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("Safety violation: {0}")]
    SafetyViolation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Agent error: {0}")]
    Agent(String),
}

impl DeskPilotError {
    /// Errors raised while talking to the vision model end the current task.
    pub fn is_model_failure(&self) -> bool {
        matches!(self, Self::LlmProvider(_) | Self::SseParsing(_) | Self::Http(_))
    }
}

impl serde::Serialize for DeskPilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type DeskPilotResult<T> = Result<T, DeskPilotError>;
