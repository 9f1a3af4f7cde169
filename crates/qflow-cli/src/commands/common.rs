//! Shared helpers for CLI commands.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use qflow_nodes::FlowConfig;
use qflow_shell::{InterpreterSession, ShellConfig};

/// Contents of the `--config` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QflowConfig {
    pub shell: ShellConfig,
    pub flow: FlowConfig,
}

/// Load the configuration file, if any, then apply environment overrides.
pub fn load_config(path: Option<&str>) -> Result<QflowConfig> {
    let config = match path {
        Some(path) => {
            if !Path::new(path).exists() {
                anyhow::bail!("Config file not found: {path}");
            }
            let source = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {path}"))?;
            serde_yaml_ng::from_str(&source)
                .with_context(|| format!("Invalid config file: {path}"))?
        }
        None => QflowConfig::default(),
    };

    Ok(QflowConfig {
        shell: config.shell.apply_env(),
        flow: config.flow,
    })
}

/// Script text from `--file` or `--code`.
pub fn read_script(file: Option<&str>, code: Option<&str>) -> Result<String> {
    match (file, code) {
        (Some(path), _) => {
            fs::read_to_string(path).with_context(|| format!("Failed to read script: {path}"))
        }
        (None, Some(code)) => Ok(code.to_string()),
        (None, None) => anyhow::bail!("Nothing to run: pass --file or --code"),
    }
}

/// A session for `config`, started.
pub async fn started_session(config: &QflowConfig) -> Result<(InterpreterSession, String)> {
    let session = InterpreterSession::new(config.shell.clone());
    let banner = session.start().await.with_context(|| {
        format!(
            "Failed to start interpreter {}",
            config.shell.interpreter.display()
        )
    })?;
    Ok((session, banner.unwrap_or_default()))
}
