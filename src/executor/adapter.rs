// Per-application coordinate correction rules, one JSON file per adapter, keyed
// by file stem:
// { "name": "Browser", "rules": [ { "target": "click", "adjustment": { "x": 0.0, "y": -0.01 } } ] }
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{DeskPilotError, DeskPilotResult};

/// Kind of pointer target a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Click,
    Scroll,
    Type,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Scroll => "scroll",
            Self::Type => "type",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adapter {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rules: Vec<AdapterRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterRule {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub adjustment: Adjustment,
}

impl AdapterRule {
    fn applies_to(&self, target: TargetType) -> bool {
        let t = target.as_str();
        self.kind.as_deref() == Some(t) || self.target.as_deref() == Some(t)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Adjustment {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// Read-only set of loaded adapters.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Adapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, adapter: Adapter) {
        self.adapters.insert(id.into(), adapter);
    }

    pub fn get(&self, id: &str) -> Option<&Adapter> {
        self.adapters.get(id)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Loads every `*.json` file in `dir`. A missing directory yields an empty
    /// registry; unreadable files are skipped with a warning.
    pub fn load_dir(dir: &Path) -> DeskPilotResult<Self> {
        let mut registry = Self::new();
        if !dir.exists() {
            tracing::warn!(dir = %dir.display(), "adapter directory does not exist");
            return Ok(registry);
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let Some(id) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let parsed = std::fs::read_to_string(&path)
                .map_err(DeskPilotError::from)
                .and_then(|s| serde_json::from_str::<Adapter>(&s).map_err(Into::into));
            match parsed {
                Ok(adapter) => {
                    tracing::info!(adapter = %id, name = %adapter.name, rules = adapter.rules.len(), "adapter loaded");
                    registry.insert(id, adapter);
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to load adapter"),
            }
        }
        tracing::info!(count = registry.len(), "adapters loaded");
        Ok(registry)
    }

    /// Applies the first matching rule of `adapter_id` to a proportional
    /// position. Unknown adapters and unmatched targets leave it unchanged.
    pub fn apply(&self, x: f64, y: f64, adapter_id: Option<&str>, target: TargetType) -> (f64, f64) {
        let Some(adapter) = adapter_id.and_then(|id| self.adapters.get(id)) else {
            return (x, y);
        };
        let Some(rule) = adapter.rules.iter().find(|r| r.applies_to(target)) else {
            return (x, y);
        };

        let adjusted = (
            (x + rule.adjustment.x).clamp(0.0, 1.0),
            (y + rule.adjustment.y).clamp(0.0, 1.0),
        );
        tracing::info!(
            adapter = adapter_id.unwrap_or_default(),
            target = %target,
            from = %format!("({x:.3}, {y:.3})"),
            to = %format!("({:.3}, {:.3})", adjusted.0, adjusted.1),
            "adapter adjustment applied"
        );
        adjusted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AdapterRegistry {
        let adapter: Adapter = serde_json::from_str(
            r#"{
                "name": "Browser",
                "rules": [
                    { "target": "address_bar", "adjustment": { "x": 0.5 } },
                    { "type": "click", "adjustment": { "x": 0.01, "y": -0.02 } },
                    { "target": "click", "adjustment": { "x": 0.4, "y": 0.4 } },
                    { "target": "scroll", "adjustment": { "y": 0.9 } }
                ]
            }"#,
        )
        .unwrap();
        let mut reg = AdapterRegistry::new();
        reg.insert("browser", adapter);
        reg
    }

    #[test]
    fn unknown_adapter_is_identity() {
        let reg = registry();
        assert_eq!(reg.apply(0.3, 0.4, Some("editor"), TargetType::Click), (0.3, 0.4));
        assert_eq!(reg.apply(0.3, 0.4, None, TargetType::Click), (0.3, 0.4));
    }

    #[test]
    fn first_matching_rule_wins() {
        let (x, y) = registry().apply(0.5, 0.5, Some("browser"), TargetType::Click);
        assert!((x - 0.51).abs() < 1e-9);
        assert!((y - 0.48).abs() < 1e-9);
    }

    #[test]
    fn result_is_reclamped() {
        assert_eq!(registry().apply(0.5, 0.5, Some("browser"), TargetType::Scroll), (0.5, 1.0));
    }

    #[test]
    fn unmatched_target_is_identity() {
        assert_eq!(registry().apply(0.2, 0.2, Some("browser"), TargetType::Type), (0.2, 0.2));
    }

    #[test]
    fn loads_json_files_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("notepad.json"),
            r#"{"name":"Notepad","rules":[{"type":"type","adjustment":{"x":0.1,"y":0.0}}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "ignored").unwrap();

        let reg = AdapterRegistry::load_dir(dir.path()).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("notepad").unwrap().name, "Notepad");
        let (x, _) = reg.apply(0.2, 0.2, Some("notepad"), TargetType::Type);
        assert!((x - 0.3).abs() < 1e-9);
    }

    #[test]
    fn missing_directory_is_empty() {
        let reg = AdapterRegistry::load_dir(Path::new("/definitely/not/here")).unwrap();
        assert!(reg.is_empty());
    }
}
