//! Static registry of the tasks the demo knows how to serve.
//!
//! Each entry maps a task name to the data-module and task classes the
//! generated script imports. Lookups of names outside the table fail with
//! [`DemoError::UnknownTask`] instead of surfacing later as an import error
//! inside the script.

use serde::Serialize;

use crate::error::{DemoError, Result};

/// Which data-module and task implementation a task name maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDescriptor {
    pub name: String,
    pub data_module_import_path: String,
    pub data_module_class: String,
    pub task_import_path: String,
    pub task_class: String,
}

struct Entry {
    name: &'static str,
    data_module_import_path: &'static str,
    data_module_class: &'static str,
    task_import_path: &'static str,
    task_class: &'static str,
}

const BUILTIN_TASKS: &[Entry] = &[
    Entry {
        name: "classification",
        data_module_import_path: "flash.text",
        data_module_class: "TextClassificationData",
        task_import_path: "flash.text",
        task_class: "TextClassifier",
    },
    Entry {
        name: "text_classification",
        data_module_import_path: "flash.text",
        data_module_class: "TextClassificationData",
        task_import_path: "flash.text",
        task_class: "TextClassifier",
    },
    Entry {
        name: "image_classification",
        data_module_import_path: "flash.image",
        data_module_class: "ImageClassificationData",
        task_import_path: "flash.image",
        task_class: "ImageClassifier",
    },
    Entry {
        name: "question_answering",
        data_module_import_path: "flash.text",
        data_module_class: "QuestionAnsweringData",
        task_import_path: "flash.text",
        task_class: "QuestionAnsweringTask",
    },
    Entry {
        name: "summarization",
        data_module_import_path: "flash.text",
        data_module_class: "SummarizationData",
        task_import_path: "flash.text",
        task_class: "SummarizationTask",
    },
    Entry {
        name: "translation",
        data_module_import_path: "flash.text",
        data_module_class: "TranslationData",
        task_import_path: "flash.text",
        task_class: "TranslationTask",
    },
];

/// Resolves task names to [`TaskDescriptor`]s.
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    tasks: Vec<TaskDescriptor>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    /// Registry with the built-in tasks.
    pub fn new() -> Self {
        let tasks = BUILTIN_TASKS
            .iter()
            .map(|e| TaskDescriptor {
                name: e.name.to_string(),
                data_module_import_path: e.data_module_import_path.to_string(),
                data_module_class: e.data_module_class.to_string(),
                task_import_path: e.task_import_path.to_string(),
                task_class: e.task_class.to_string(),
            })
            .collect();
        Self { tasks }
    }

    /// Registry with exactly the given descriptors.
    pub fn with_tasks(tasks: Vec<TaskDescriptor>) -> Self {
        Self { tasks }
    }

    pub fn resolve(&self, name: &str) -> Result<TaskDescriptor> {
        self.tasks
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| DemoError::UnknownTask {
                name: name.to_string(),
                known: self.names().join(", "),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.tasks.iter()
    }
}
