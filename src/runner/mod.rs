pub mod mock;
pub mod process;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;

/// What a finished script run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    /// Result object reported by the script. Only `predictions` is read.
    pub values: Map<String, Value>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn from_values(values: Map<String, Value>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    /// Build a result from captured output, parsing the result object from
    /// the last stdout line that is a JSON object.
    pub fn from_output(stdout: String, stderr: String) -> Self {
        let values = stdout
            .lines()
            .rev()
            .map(str::trim)
            .filter(|line| line.starts_with('{'))
            .find_map(|line| match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            })
            .unwrap_or_default();
        Self {
            values,
            stdout,
            stderr,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }
}

/// Runs a generated script out of process.
///
/// `env` holds overrides applied on top of the inherited environment of the
/// child only; implementations must not touch the parent's environment.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, script: &Path, env: &HashMap<String, String>) -> Result<ExecutionResult>;
}
