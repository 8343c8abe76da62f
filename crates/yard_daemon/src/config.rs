use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Scheduler tuning. Every field is optional in the JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Wall-clock time a background unit may spend before deferring the
    /// remaining handlers to the next unit.
    pub budget_ms: u64,
    pub action_interval_ms: u64,
    pub cargo_interval_ms: u64,
    pub discovery_interval_ms: u64,
    pub status_interval_ms: u64,
    /// Re-raise handler faults instead of logging them.
    pub debug: bool,
    pub authoritative: bool,
    pub observer: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            budget_ms: 8,
            action_interval_ms: 500,
            cargo_interval_ms: 5000,
            discovery_interval_ms: 5000,
            status_interval_ms: 250,
            debug: false,
            authoritative: true,
            observer: true,
        }
    }
}

impl SchedulerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading scheduler config {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("parsing scheduler config {}", path.display()))
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"budget_ms": 2, "debug": true}"#).unwrap();
        assert_eq!(config.budget_ms, 2);
        assert!(config.debug);
        assert_eq!(config.action_interval_ms, 500);
        assert_eq!(config.discovery_interval_ms, 5000);
        assert!(config.authoritative && config.observer);
    }

    #[test]
    fn load_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = SchedulerConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing scheduler config"));
    }
}
