//! `--config` file handling

use std::path::Path;

use anyhow::{Context, Result};
use frames_core::{EmitConfig, FramesConfig};
use serde::{Deserialize, Serialize};

/// Everything `framec` reads from a JSON config file.
///
/// Both sections are optional:
///
/// ```json
/// { "runtime": { "gc": "manual" }, "emit": { "derive_debug": false } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub runtime: FramesConfig,
    pub emit: EmitConfig,
}

impl CliConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    /// The file at `path`, or defaults when none was given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frames_core::GcPolicy;

    #[test]
    fn test_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framec.json");
        std::fs::write(&path, r#"{"runtime": {"gc": "manual"}}"#).unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.runtime.gc, GcPolicy::Manual);
        assert_eq!(config.emit, EmitConfig::default());
    }

    #[test]
    fn test_missing_config_file() {
        let err = CliConfig::load("/nonexistent/framec.json").unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
        assert_eq!(CliConfig::load_or_default(None).unwrap(), CliConfig::default());
    }
}
