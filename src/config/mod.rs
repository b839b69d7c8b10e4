//! Demo configuration: an optional JSON file plus command-line overrides.
//!
//! Every field is optional in the file. The CLI builds a [`DemoConfig`] of
//! its own flags and [`DemoConfig::merge`]s it over the file, so flags win.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::adapter::AdapterOptions;
use crate::consts::{DEFAULT_HOST, DEFAULT_INTERPRETER, DEFAULT_PORT, DEFAULT_TEMPLATE};
use crate::runner::process::ProcessConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    pub task: Option<String>,
    pub url: Option<String>,
    pub data_config: Option<Value>,
    pub checkpoint: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub python: Option<String>,
    pub python_args: Vec<String>,
    pub template: Option<String>,
    pub template_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
    pub warm_up: Option<bool>,
}

impl DemoConfig {
    /// Read a config file. A missing file is an error; use
    /// [`DemoConfig::load_optional`] for the default location.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Like [`DemoConfig::load`], but a missing file yields the empty config.
    pub fn load_optional(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Overlay `other` on top of `self`. Set fields in `other` win; env maps
    /// are combined key by key; a non-empty `python_args` replaces the list.
    pub fn merge(mut self, other: DemoConfig) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            task,
            url,
            data_config,
            checkpoint,
            host,
            port,
            python,
            template,
            template_dir,
            timeout_secs,
            warm_up
        );
        if !other.python_args.is_empty() {
            self.python_args = other.python_args;
        }
        self.env.extend(other.env);
        self
    }

    /// Check that everything `configure` needs is present.
    pub fn resolve(self) -> Result<ResolvedConfig> {
        let Some(task) = self.task else {
            bail!("no task given: pass --task or set \"task\" in the config file");
        };
        let Some(checkpoint) = self.checkpoint else {
            bail!("no checkpoint given: pass --checkpoint or set \"checkpoint\" in the config file");
        };

        Ok(ResolvedConfig {
            task,
            checkpoint,
            url: self.url.unwrap_or_default(),
            data_config: self
                .data_config
                .unwrap_or_else(|| Value::Object(Default::default())),
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            process: ProcessConfig {
                interpreter: self
                    .python
                    .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string()),
                interpreter_args: self.python_args,
                timeout: self.timeout_secs.map(Duration::from_secs),
                ..ProcessConfig::default()
            },
            adapter: AdapterOptions {
                template: self
                    .template
                    .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
                template_dir: self.template_dir,
                env: self.env,
                warm_up: self.warm_up.unwrap_or(false),
            },
        })
    }
}

/// A complete configuration with defaults filled in.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub task: String,
    pub url: String,
    pub data_config: Value,
    pub checkpoint: String,
    pub host: String,
    pub port: u16,
    pub process: ProcessConfig,
    pub adapter: AdapterOptions,
}

/// Parse a `KEY=VALUE` pair.
pub fn parse_env_pair(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("expected KEY=VALUE, got {raw:?}"),
    }
}
