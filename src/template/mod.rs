//! Script templates and the placeholder renderer.
//!
//! Templates are plain text with `{{ key }}` placeholders, optionally piped
//! through filters: `{{ key | tojson }}`. A template is looked up by name,
//! first as `<dir>/<name>.py.tmpl` in the configured directory, then among
//! the built-ins compiled into the binary.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::adapter::InvocationConfig;
use crate::error::{DemoError, Result};
use crate::tasks::TaskDescriptor;

const TEMPLATE_EXTENSION: &str = "py.tmpl";

const BUILTIN_TEMPLATES: &[(&str, &str)] =
    &[("flash_demo", include_str!("flash_demo.py.tmpl"))];

/// The substitution values for one rendering of the script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptContext {
    pub task: String,
    pub data_module_import_path: String,
    pub data_module_class: String,
    pub task_import_path: String,
    pub task_class: String,
    pub url: String,
    pub data_config: Value,
    pub checkpoint: String,
    pub input_text: String,
}

impl ScriptContext {
    /// Names of every key a template may reference.
    pub const KEYS: [&'static str; 9] = [
        "task",
        "data_module_import_path",
        "data_module_class",
        "task_import_path",
        "task_class",
        "url",
        "data_config",
        "checkpoint",
        "input_text",
    ];

    pub fn new(config: &InvocationConfig, task: &TaskDescriptor, input_text: &str) -> Self {
        Self {
            task: config.task.clone(),
            data_module_import_path: task.data_module_import_path.clone(),
            data_module_class: task.data_module_class.clone(),
            task_import_path: task.task_import_path.clone(),
            task_class: task.task_class.clone(),
            url: config.url.clone(),
            data_config: config.data_config.clone(),
            checkpoint: config.checkpoint.clone(),
            input_text: input_text.to_string(),
        }
    }

    /// Flatten into the key/value map the renderer consumes.
    pub fn values(&self) -> Result<BTreeMap<String, Value>> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
            Ok(_) => Err(DemoError::TemplateRender(
                "script context did not serialize to an object".to_string(),
            )),
            Err(e) => Err(DemoError::TemplateRender(e.to_string())),
        }
    }
}

/// Finds templates by name.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    dir: Option<PathBuf>,
}

impl TemplateStore {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Load the template source for `name`.
    pub fn load(&self, name: &str) -> Result<String> {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{name}.{TEMPLATE_EXTENSION}"));
            if path.is_file() {
                return std::fs::read_to_string(&path).map_err(|e| {
                    DemoError::TemplateRender(format!("cannot read {}: {e}", path.display()))
                });
            }
        }

        BUILTIN_TEMPLATES
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, source)| source.to_string())
            .ok_or_else(|| DemoError::TemplateRender(format!("template not found: {name}")))
    }

    /// Load `name` and render it with `context`.
    pub fn render(&self, name: &str, context: &ScriptContext) -> Result<String> {
        let source = self.load(name)?;
        render(&source, &context.values()?)
    }
}

/// Substitute every placeholder in `template`.
pub fn render(template: &str, values: &BTreeMap<String, Value>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open.find("}}").ok_or_else(|| {
            DemoError::TemplateRender(format!(
                "unterminated placeholder at byte {}",
                offset + start
            ))
        })?;

        let expr = &after_open[..end];
        out.push_str(&evaluate(expr, values)?);

        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

fn evaluate(expr: &str, values: &BTreeMap<String, Value>) -> Result<String> {
    let mut parts = expr.split('|').map(str::trim);
    let key = parts.next().unwrap_or_default();
    if key.is_empty() {
        return Err(DemoError::TemplateRender("empty placeholder".to_string()));
    }

    let mut value = values
        .get(key)
        .cloned()
        .ok_or_else(|| DemoError::TemplateRender(format!("no value supplied for `{key}`")))?;

    for filter in parts {
        value = match filter {
            "tojson" => Value::String(
                serde_json::to_string(&value)
                    .map_err(|e| DemoError::TemplateRender(e.to_string()))?,
            ),
            other => {
                return Err(DemoError::TemplateRender(format!("unknown filter: {other}")));
            }
        };
    }

    Ok(match value {
        Value::String(s) => s,
        other => other.to_string(),
    })
}
