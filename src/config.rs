use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

use crate::codegen::DEFAULT_CODE_LENGTH;

pub const CONFIG_FILE_NAME: &str = "lernova.json";
pub const DEFAULT_ROTATION_INTERVAL_SECS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    File,
    Sqlite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::File => "file",
            BackendKind::Sqlite => "sqlite",
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(BackendKind::File),
            "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(anyhow!("unsupported backend type: {}", other)),
        }
    }
}

/// Per-workspace settings. Every field has a default, so an absent or
/// partial `lernova.json` is fine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,
    pub default_rotation_interval: u32,
    pub code_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            default_rotation_interval: DEFAULT_ROTATION_INTERVAL_SECS,
            code_length: DEFAULT_CODE_LENGTH,
        }
    }
}

impl Config {
    /// Reads `<workspace>/lernova.json` when present, then applies
    /// `LERNOVA_BACKEND`.
    pub fn load(workspace: &Path) -> anyhow::Result<Self> {
        let path = workspace.join(CONFIG_FILE_NAME);
        let mut config = if path.is_file() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Config::default()
        };
        if let Ok(raw) = std::env::var("LERNOVA_BACKEND") {
            if !raw.trim().is_empty() {
                config.backend = raw.parse()?;
            }
        }
        Ok(config)
    }
}
