use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::types::ToolSpec;

/// Loads built-in tool definitions from the prompts/tools/builtin.json file.
/// The JSON is embedded at compile time via include_str!.
pub fn load_builtin_tools() -> DeskPilotResult<Vec<ToolSpec>> {
    let json = include_str!("../../prompts/tools/builtin.json");
    serde_json::from_str(json).map_err(|e| DeskPilotError::Config(format!("Failed to parse builtin tools: {e}")))
}

/// One line per tool, as shown to the model.
pub fn render_catalog(tools: &[ToolSpec]) -> String {
    tools
        .iter()
        .map(|t| format!("- {}: {}", t.signature, t.description))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::dispatcher::Action;
    use crate::llm::tool_parser::{ToolArgs, ToolCall};

    #[test]
    fn builtin_catalog_parses() {
        let tools = load_builtin_tools().unwrap();
        assert!(tools.len() >= 20);
        assert!(tools.iter().any(|t| t.name == "pause_task"));
        assert!(tools.iter().all(|t| t.signature.starts_with(&t.name)));
    }

    #[test]
    fn every_catalog_tool_is_executable() {
        for tool in load_builtin_tools().unwrap() {
            let call = ToolCall {
                name: tool.name.clone(),
                arguments: ToolArgs::new(),
            };
            assert!(
                !matches!(Action::from_call(&call), Ok(Action::Unknown { .. })),
                "{} has no action",
                tool.name
            );
        }
    }

    #[test]
    fn catalog_renders_one_line_per_tool() {
        let tools = load_builtin_tools().unwrap();
        assert_eq!(render_catalog(&tools).lines().count(), tools.len());
    }
}
