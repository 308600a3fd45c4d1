//! TOML configuration.
//!
//! ```toml
//! resolution = 2048
//! output_dir = "exports"
//!
//! [parameters]
//! is_metal = false
//! roughness_estimate = 0.5
//! ao_intensity = 1.0
//! displacement_contrast = 0.5
//!
//! [analyzer]
//! kind = "command"
//! command = "my-analyzer"
//! args = ["--model", "vision"]
//! timeout_secs = 60
//! ```
//!
//! Every field is optional. `AOMRD_ANALYZER_COMMAND` overrides the analyzer
//! with a command analyzer.

use crate::analysis::{CommandAnalyzer, ConfiguredAnalyzer, HeuristicAnalyzer, DEFAULT_ANALYZER_TIMEOUT};
use crate::packing::ExportResolution;
use crate::synthesis::PbrParameters;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable selecting an external analyzer command.
pub const ANALYZER_COMMAND_ENV: &str = "AOMRD_ANALYZER_COMMAND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    None,
    #[default]
    Heuristic,
    Command,
}

impl FromStr for AnalyzerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(AnalyzerKind::None),
            "heuristic" => Ok(AnalyzerKind::Heuristic),
            "command" => Ok(AnalyzerKind::Command),
            _ => Err(Error::Other(format!(
                "Unknown analyzer: {}. Use none, heuristic, or command.",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub kind: AnalyzerKind,
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Seconds a command analyzer may run before it is killed
    pub timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            kind: AnalyzerKind::default(),
            command: None,
            args: Vec::new(),
            timeout_secs: DEFAULT_ANALYZER_TIMEOUT.as_secs(),
        }
    }
}

impl AnalyzerConfig {
    /// Apply `AOMRD_ANALYZER_COMMAND` when it is set and non-empty.
    pub fn with_env_override(self) -> Self {
        self.with_command_override(std::env::var(ANALYZER_COMMAND_ENV).ok())
    }

    fn with_command_override(mut self, command: Option<String>) -> Self {
        if let Some(command) = command.filter(|c| !c.trim().is_empty()) {
            self.kind = AnalyzerKind::Command;
            self.command = Some(command);
        }
        self
    }

    /// Build the configured analyzer; `None` when analysis is disabled.
    pub fn build(&self) -> Result<Option<ConfiguredAnalyzer>> {
        match self.kind {
            AnalyzerKind::None => Ok(None),
            AnalyzerKind::Heuristic => Ok(Some(ConfiguredAnalyzer::Heuristic(HeuristicAnalyzer))),
            AnalyzerKind::Command => {
                let command = self.command.as_deref().filter(|c| !c.trim().is_empty()).ok_or_else(|| {
                    Error::Other(format!(
                        "Analyzer kind \"command\" needs a command (set [analyzer].command or {})",
                        ANALYZER_COMMAND_ENV
                    ))
                })?;
                if self.timeout_secs == 0 {
                    return Err(Error::Other("[analyzer].timeout_secs must be at least 1".into()));
                }
                Ok(Some(ConfiguredAnalyzer::Command(
                    CommandAnalyzer::new(command, self.args.clone())
                        .with_timeout(Duration::from_secs(self.timeout_secs)),
                )))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackerConfig {
    pub resolution: ExportResolution,
    pub output_dir: PathBuf,
    /// Parameters used when analysis is skipped or fails
    pub parameters: PbrParameters,
    pub analyzer: AnalyzerConfig,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            resolution: ExportResolution::default(),
            output_dir: PathBuf::from("exports"),
            parameters: PbrParameters::default(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl PackerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut config: PackerConfig = toml::from_str(s)?;
        config.parameters = config.parameters.clamped();
        Ok(config)
    }

    /// Load from a TOML file and apply the environment override.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&s)?;
        config.analyzer = config.analyzer.with_env_override();
        tracing::debug!(path = %path.display(), resolution = %config.resolution, "loaded config");
        Ok(config)
    }

    /// Defaults plus the environment override, for runs without a file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.analyzer = config.analyzer.with_env_override();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = PackerConfig::from_toml_str("").unwrap();
        assert_eq!(config, PackerConfig::default());
        assert_eq!(config.resolution, ExportResolution::Res2K);
        assert_eq!(config.analyzer.kind, AnalyzerKind::Heuristic);
        assert_eq!(config.analyzer.timeout_secs, 60);
    }

    #[test]
    fn full_config_parses() {
        let config = PackerConfig::from_toml_str(
            r#"
resolution = 4096
output_dir = "out/textures"

[parameters]
is_metal = true
roughness_estimate = 1.4
ao_intensity = 0.8

[analyzer]
kind = "command"
command = "vision-analyzer"
args = ["--fast"]
timeout_secs = 15
"#,
        )
        .unwrap();
        assert_eq!(config.resolution, ExportResolution::Res4K);
        assert_eq!(config.output_dir, PathBuf::from("out/textures"));
        assert!(config.parameters.is_metal);
        assert_eq!(config.parameters.roughness_estimate, 1.0);
        assert_eq!(config.parameters.displacement_contrast, 0.5);

        match config.analyzer.build().unwrap() {
            Some(ConfiguredAnalyzer::Command(c)) => {
                assert_eq!(c.command, "vision-analyzer");
                assert_eq!(c.args, vec!["--fast".to_string()]);
                assert_eq!(c.timeout, Duration::from_secs(15));
            }
            other => panic!("expected command analyzer, got {:?}", other),
        }
    }

    #[test]
    fn invalid_resolution_is_rejected() {
        let err = PackerConfig::from_toml_str("resolution = 3000").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn command_kind_without_command_fails_to_build() {
        let analyzer = AnalyzerConfig {
            kind: AnalyzerKind::Command,
            ..Default::default()
        };
        assert!(analyzer.build().is_err());
        let none = AnalyzerConfig {
            kind: AnalyzerKind::None,
            ..Default::default()
        };
        assert!(none.build().unwrap().is_none());

        let zero_timeout = AnalyzerConfig {
            kind: AnalyzerKind::Command,
            command: Some("my-analyzer".into()),
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(zero_timeout.build().is_err());
    }

    #[test]
    fn command_override_switches_kind() {
        let analyzer = AnalyzerConfig::default().with_command_override(Some("my-analyzer".into()));
        assert_eq!(analyzer.kind, AnalyzerKind::Command);
        assert_eq!(analyzer.command.as_deref(), Some("my-analyzer"));

        let untouched = AnalyzerConfig::default().with_command_override(Some("  ".into()));
        assert_eq!(untouched.kind, AnalyzerKind::Heuristic);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aomrd.toml");
        std::fs::write(&path, "resolution = 512\n[analyzer]\nkind = \"none\"\n").unwrap();
        let config = PackerConfig::load(&path).unwrap();
        assert_eq!(config.resolution, ExportResolution::Res512);
        assert!(PackerConfig::load(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn analyzer_kind_parses() {
        assert_eq!("none".parse::<AnalyzerKind>().unwrap(), AnalyzerKind::None);
        assert_eq!("Command".parse::<AnalyzerKind>().unwrap(), AnalyzerKind::Command);
        assert!("gpt".parse::<AnalyzerKind>().is_err());
    }
}
