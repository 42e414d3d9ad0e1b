//! History configuration.
//!
//! Every field has a serde default, so a config file only needs the keys it changes.

use anyhow::Context;
use retrace_core::{ExtraProps, MutationKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::HistoryError;

/// File extension recommended for saved configs.
pub const CONFIG_FILE_EXT: &str = "history.json";

fn default_events() -> Vec<MutationKind> {
    MutationKind::HISTORY.to_vec()
}

fn default_restore_timeout_ms() -> Option<u64> {
    Some(10_000)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Custom object properties kept in snapshots.
    #[serde(default)]
    pub extra_props: ExtraProps,

    /// Notifications that trigger a capture.
    #[serde(default = "default_events")]
    pub events: Vec<MutationKind>,

    /// Oldest undo entries past this depth are dropped. `None` keeps everything.
    #[serde(default)]
    pub max_depth: Option<usize>,

    /// A pending restore older than this is abandoned. `None` waits forever.
    #[serde(default = "default_restore_timeout_ms")]
    pub restore_timeout_ms: Option<u64>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            extra_props: ExtraProps::default(),
            events: default_events(),
            max_depth: None,
            restore_timeout_ms: default_restore_timeout_ms(),
        }
    }
}

impl HistoryConfig {
    pub fn with_extra_props(mut self, extra_props: ExtraProps) -> Self {
        self.extra_props = extra_props;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_restore_timeout(mut self, timeout: Option<Duration>) -> Self {
        // Saturates at u64::MAX milliseconds.
        self.restore_timeout_ms =
            timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn restore_timeout(&self) -> Option<Duration> {
        self.restore_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), HistoryError> {
        if self.max_depth == Some(0) {
            tracing::error!(max_depth = 0, "history depth cap must be positive");
            return Err(HistoryError::InvalidConfig {
                reason: "max_depth must be at least 1".into(),
            });
        }

        let mut seen = BTreeSet::new();
        for kind in &self.events {
            if !seen.insert(*kind) {
                return Err(HistoryError::InvalidConfig {
                    reason: format!("event '{}' listed twice", kind.name()),
                });
            }
        }

        if self.events.is_empty() {
            tracing::warn!("history config subscribes to no events; only manual undo points will be recorded");
        }

        Ok(())
    }
}

/// Save a config to disk as pretty JSON.
pub fn save_config(path: impl AsRef<Path>, config: &HistoryConfig) -> anyhow::Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create parent dir: {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(config).context("serialize history config to json")?;
    fs::write(path, json).with_context(|| format!("write config file: {}", path.display()))?;
    Ok(())
}

/// Load and validate a config from disk.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<HistoryConfig> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config file: {}", path.display()))?;
    let config: HistoryConfig = serde_json::from_str(&data).context("parse history config json")?;
    config
        .validate()
        .with_context(|| format!("validate config file: {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_subscribes_to_all_history_events() {
        let config = HistoryConfig::default();
        assert_eq!(config.events, MutationKind::HISTORY.to_vec());
        assert_eq!(config.max_depth, None);
        assert_eq!(config.restore_timeout(), Some(Duration::from_secs(10)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: HistoryConfig =
            serde_json::from_str(r#"{ "extra_props": ["name", "selectable"] }"#).unwrap();
        assert!(config.extra_props.contains("name"));
        assert_eq!(config.events.len(), 4);
        assert_eq!(config.restore_timeout_ms, Some(10_000));
    }

    #[test]
    fn test_null_timeout_disables_it() {
        let config: HistoryConfig =
            serde_json::from_str(r#"{ "restore_timeout_ms": null }"#).unwrap();
        assert_eq!(config.restore_timeout(), None);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let config = HistoryConfig::default().with_max_depth(0);
        assert!(matches!(
            config.validate(),
            Err(HistoryError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_duplicate_events_rejected() {
        let config = HistoryConfig {
            events: vec![MutationKind::ObjectAdded, MutationKind::ObjectAdded],
            ..HistoryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let config = HistoryConfig::default().with_restore_timeout(Some(Duration::MAX));
        assert_eq!(config.restore_timeout_ms, Some(u64::MAX));

        let config =
            HistoryConfig::default().with_restore_timeout(Some(Duration::from_millis(1500)));
        assert_eq!(config.restore_timeout_ms, Some(1500));
    }

    #[test]
    fn test_duplicate_events_rejected_anywhere_in_list() {
        let config = HistoryConfig {
            events: vec![
                MutationKind::ObjectSkewing,
                MutationKind::ObjectAdded,
                MutationKind::ObjectRemoved,
                MutationKind::ObjectSkewing,
            ],
            ..HistoryConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("object-skewing"));
    }
}
