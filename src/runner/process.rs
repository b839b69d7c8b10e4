use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ExecutionResult, ScriptRunner};
use crate::consts::{DEFAULT_INTERPRETER, MAX_OUTPUT_BYTES};
use crate::error::{DemoError, Result};

/// Configuration for the process runner.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Program the script is handed to, e.g. `python3` or `sh`.
    pub interpreter: String,
    /// Arguments placed before the script path.
    pub interpreter_args: Vec<String>,
    /// Defaults to the script's own directory.
    pub working_dir: Option<PathBuf>,
    pub max_output_bytes: usize,
    /// Kill the child if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            interpreter_args: Vec::new(),
            working_dir: None,
            max_output_bytes: MAX_OUTPUT_BYTES,
            timeout: None,
        }
    }
}

/// Runs a script as `<interpreter> [args..] <script>`.
pub struct ProcessRunner {
    config: ProcessConfig,
}

impl ProcessRunner {
    pub fn new(config: ProcessConfig) -> Self {
        Self { config }
    }

    fn truncate_output(output: &str, max_bytes: usize) -> String {
        if output.len() <= max_bytes {
            return output.to_string();
        }
        let mut end = max_bytes;
        while !output.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}\n\n[truncated: showing {}/{} bytes]",
            &output[..end],
            end,
            output.len()
        )
    }

    fn working_dir(&self, script: &Path) -> PathBuf {
        self.config
            .working_dir
            .clone()
            .or_else(|| script.parent().map(Path::to_path_buf))
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[async_trait]
impl ScriptRunner for ProcessRunner {
    async fn run(&self, script: &Path, env: &HashMap<String, String>) -> Result<ExecutionResult> {
        let work_dir = self.working_dir(script);
        debug!(
            interpreter = %self.config.interpreter,
            script = %script.display(),
            overrides = env.len(),
            "launching script"
        );

        // Overrides only reach the child; the parent's environment is never touched.
        let child = Command::new(&self.config.interpreter)
            .args(&self.config.interpreter_args)
            .arg(script)
            .current_dir(&work_dir)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DemoError::execution(format!(
                    "failed to launch {}: {e}",
                    self.config.interpreter
                ))
            })?;

        let output = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    warn!(script = %script.display(), "script timed out after {:?}", limit);
                    return Err(DemoError::execution(format!(
                        "timed out after {}s",
                        limit.as_secs_f64()
                    )));
                }
            },
            None => child.wait_with_output().await?,
        };

        let max = self.config.max_output_bytes;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let reason = match output.status.code() {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            };
            return Err(DemoError::ExecutionFailed {
                reason,
                stdout: Self::truncate_output(&stdout, max),
                stderr: Self::truncate_output(&stderr, max),
            });
        }

        // Parse before truncating so a large log cannot hide the result line.
        let mut result = ExecutionResult::from_output(stdout.into_owned(), String::new());
        result.stdout = Self::truncate_output(&result.stdout, max);
        result.stderr = Self::truncate_output(&stderr, max);
        Ok(result)
    }
}
