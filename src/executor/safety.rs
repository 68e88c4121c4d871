// Gatekeeping for actions that reach beyond the GUI.
use crate::config::SafetyConfig;
use crate::errors::{DeskPilotError, DeskPilotResult};

/// Refuses terminal commands unless the config allows them. Opening an empty
/// terminal is always allowed.
pub fn check_terminal_command(command: Option<&str>, safety: &SafetyConfig) -> DeskPilotResult<()> {
    match command.map(str::trim) {
        Some(cmd) if !cmd.is_empty() && !safety.allow_terminal_commands => {
            tracing::warn!(command = %cmd, "terminal command refused by safety policy");
            Err(DeskPilotError::SafetyViolation(format!(
                "running terminal commands is disabled (requested: {cmd})"
            )))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_refused_when_disabled() {
        let strict = SafetyConfig {
            allow_terminal_commands: false,
        };
        assert!(check_terminal_command(Some("rm -rf /tmp/x"), &strict).is_err());
        assert!(check_terminal_command(Some("  "), &strict).is_ok());
        assert!(check_terminal_command(None, &strict).is_ok());
        assert!(check_terminal_command(Some("ls"), &SafetyConfig::default()).is_ok());
    }
}
