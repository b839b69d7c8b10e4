//! The demo adapter: captures configuration once, then turns each user input
//! into a rendered script, one run of that script, and its predictions.
//!
//! [`DemoAdapter::configure`] runs once at startup and never executes
//! anything; [`DemoAdapter::handle_input`] is the callback the UI server
//! invokes per submission.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::consts::{DEFAULT_TEMPLATE, PREDICTIONS_FIELD, SCRIPT_FILE_NAME};
use crate::error::{DemoError, Result};
use crate::runner::ScriptRunner;
use crate::tasks::{TaskDescriptor, TaskRegistry};
use crate::template::{ScriptContext, TemplateStore};

/// Values captured at setup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationConfig {
    pub task: String,
    pub url: String,
    /// Arbitrary mapping handed to the script untouched.
    pub data_config: Value,
    /// Opaque reference to trained weights; never checked for existence.
    pub checkpoint: String,
}

/// Knobs that do not change between invocations.
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// Name of the script template.
    pub template: String,
    pub template_dir: Option<PathBuf>,
    /// Env overrides for the script process.
    pub env: HashMap<String, String>,
    /// Run the script once extra before the run whose result is used.
    pub warm_up: bool,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            template_dir: None,
            env: HashMap::new(),
            warm_up: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Configured {
    config: InvocationConfig,
    task: TaskDescriptor,
}

pub struct DemoAdapter {
    registry: TaskRegistry,
    templates: TemplateStore,
    options: AdapterOptions,
    runner: Arc<dyn ScriptRunner>,
    state: RwLock<Option<Configured>>,
    // Serializes render -> write -> run: the script file is shared.
    invocation: Mutex<()>,
    script_path: PathBuf,
    _script_dir: TempDir,
}

impl DemoAdapter {
    /// Create an unconfigured adapter with its own scratch directory.
    pub fn new(runner: Arc<dyn ScriptRunner>, options: AdapterOptions) -> Result<Self> {
        Self::with_registry(runner, options, TaskRegistry::new())
    }

    pub fn with_registry(
        runner: Arc<dyn ScriptRunner>,
        options: AdapterOptions,
        registry: TaskRegistry,
    ) -> Result<Self> {
        let script_dir = tempfile::Builder::new().prefix("flash-demo-").tempdir()?;
        let script_path = script_dir.path().join(SCRIPT_FILE_NAME);
        Ok(Self {
            registry,
            templates: TemplateStore::new(options.template_dir.clone()),
            options,
            runner,
            state: RwLock::new(None),
            invocation: Mutex::new(()),
            script_path,
            _script_dir: script_dir,
        })
    }

    /// Resolve the task and store the configuration. Nothing is launched.
    ///
    /// On error the previously stored configuration (if any) is kept.
    pub fn configure(
        &self,
        task: &str,
        url: &str,
        data_config: Value,
        checkpoint: impl Into<String>,
    ) -> Result<()> {
        let descriptor = self.registry.resolve(task)?;
        if !data_config.is_object() {
            return Err(DemoError::InvalidConfig(format!(
                "data config must be a mapping, got {data_config}"
            )));
        }

        let configured = Configured {
            config: InvocationConfig {
                task: task.to_string(),
                url: url.to_string(),
                data_config,
                checkpoint: checkpoint.into(),
            },
            task: descriptor,
        };

        let data_module = format!(
            "{}.{}",
            configured.task.data_module_import_path, configured.task.data_module_class
        );
        let model = format!(
            "{}.{}",
            configured.task.task_import_path, configured.task.task_class
        );
        info!(
            task = %configured.task.name,
            %data_module,
            %model,
            checkpoint = %configured.config.checkpoint,
            "adapter configured"
        );

        *self.state.write().unwrap_or_else(|e| e.into_inner()) = Some(configured);
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn config(&self) -> Option<InvocationConfig> {
        self.snapshot().ok().map(|c| c.config)
    }

    pub fn task(&self) -> Option<TaskDescriptor> {
        self.snapshot().ok().map(|c| c.task)
    }

    /// Where the generated script is written.
    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    fn snapshot(&self) -> Result<Configured> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(DemoError::NotConfigured)
    }

    /// Render the script for `input_text` without running it.
    pub fn render_script(&self, input_text: &str) -> Result<String> {
        let configured = self.snapshot()?;
        let context = ScriptContext::new(&configured.config, &configured.task, input_text);
        self.templates.render(&self.options.template, &context)
    }

    /// Handle one user input: render, run, return `predictions`.
    pub async fn handle_input(&self, input_text: &str) -> Result<Value> {
        let configured = self.snapshot()?;
        let _guard = self.invocation.lock().await;
        let started = Instant::now();

        let context = ScriptContext::new(&configured.config, &configured.task, input_text);
        let script = self.templates.render(&self.options.template, &context)?;
        tokio::fs::write(&self.script_path, script).await?;
        debug!(path = %self.script_path.display(), "script written");

        if self.options.warm_up {
            debug!("warm-up run");
            self.runner.run(&self.script_path, &self.options.env).await?;
        }

        let result = match self.runner.run(&self.script_path, &self.options.env).await {
            Ok(result) => result,
            Err(e) => {
                warn!(task = %configured.task.name, error = %e, "invocation failed");
                return Err(e);
            }
        };

        let Some(predictions) = result.get(PREDICTIONS_FIELD).cloned() else {
            warn!(
                task = %configured.task.name,
                stdout = %result.stdout,
                stderr = %result.stderr,
                "script result has no `{}` field",
                PREDICTIONS_FIELD
            );
            return Err(DemoError::MissingResultField {
                field: PREDICTIONS_FIELD.to_string(),
                stdout: result.stdout,
                stderr: result.stderr,
            });
        };

        info!(
            task = %configured.task.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "invocation complete"
        );
        Ok(predictions)
    }
}

/// Text shown in the UI's single output field.
pub fn predictions_to_text(predictions: &Value) -> String {
    match predictions {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
