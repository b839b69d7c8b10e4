use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ExecutionResult, ScriptRunner};
use crate::error::{DemoError, Result};

/// What the mock saw on one call.
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub script: String,
    pub env: HashMap<String, String>,
}

/// A scripted runner for tests. Returns pre-defined results in order and
/// records the script contents and env overrides of every call.
pub struct MockRunner {
    results: Vec<std::result::Result<ExecutionResult, String>>,
    index: AtomicUsize,
    runs: Mutex<Vec<RecordedRun>>,
}

impl MockRunner {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self::with_outcomes(results.into_iter().map(Ok).collect())
    }

    /// `Err(msg)` entries fail the run with `ExecutionFailed` carrying `msg`
    /// as stderr.
    pub fn with_outcomes(results: Vec<std::result::Result<ExecutionResult, String>>) -> Self {
        Self {
            results,
            index: AtomicUsize::new(0),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptRunner for MockRunner {
    async fn run(&self, script: &Path, env: &HashMap<String, String>) -> Result<ExecutionResult> {
        let contents = tokio::fs::read_to_string(script).await?;
        self.runs.lock().unwrap().push(RecordedRun {
            script: contents,
            env: env.clone(),
        });

        let i = self.index.fetch_add(1, Ordering::SeqCst);
        match self.results.get(i) {
            Some(Ok(result)) => Ok(result.clone()),
            Some(Err(stderr)) => Err(DemoError::ExecutionFailed {
                reason: "exit code 1".to_string(),
                stdout: String::new(),
                stderr: stderr.clone(),
            }),
            None => Err(DemoError::execution(format!(
                "MockRunner: no more results (called {} times)",
                i + 1
            ))),
        }
    }
}
