use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use flash_demo::adapter::{AdapterOptions, DemoAdapter};
use flash_demo::error::DemoError;
use flash_demo::runner::ExecutionResult;
use flash_demo::runner::mock::MockRunner;
use flash_demo::runner::process::{ProcessConfig, ProcessRunner};
use flash_demo::tasks::{TaskDescriptor, TaskRegistry};
use flash_demo::template::ScriptContext;

const KEYS_TEMPLATE: &str = "\
task={{ task }}
data_module_import_path={{ data_module_import_path }}
data_module_class={{ data_module_class }}
task_import_path={{ task_import_path }}
task_class={{ task_class }}
url={{ url }}
data_config={{ data_config }}
checkpoint={{ checkpoint }}
input_text={{ input_text }}
";

fn result(values: Value) -> ExecutionResult {
    match values {
        Value::Object(map) => ExecutionResult::from_values(map),
        _ => panic!("result values must be an object"),
    }
}

fn write_template(dir: &Path, name: &str, source: &str) {
    std::fs::write(dir.join(format!("{name}.py.tmpl")), source).unwrap();
}

/// Adapter using the key-dump template and a mock runner.
fn keys_adapter(
    dir: &Path,
    results: Vec<ExecutionResult>,
    options: AdapterOptions,
) -> (DemoAdapter, Arc<MockRunner>) {
    write_template(dir, "keys", KEYS_TEMPLATE);
    let runner = Arc::new(MockRunner::new(results));
    let adapter = DemoAdapter::new(
        runner.clone(),
        AdapterOptions {
            template: "keys".to_string(),
            template_dir: Some(dir.to_path_buf()),
            ..options
        },
    )
    .unwrap();
    (adapter, runner)
}

fn parse_keys(script: &str) -> BTreeMap<String, String> {
    script
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn env_snapshot() -> BTreeMap<String, String> {
    std::env::vars().collect()
}

#[tokio::test]
async fn rendered_script_carries_all_substitutions() {
    let dir = tempfile::tempdir().unwrap();
    let (adapter, runner) = keys_adapter(
        dir.path(),
        vec![result(json!({"predictions": ["positive"]}))],
        AdapterOptions::default(),
    );

    adapter
        .configure(
            "classification",
            "http://localhost/predict",
            json!({"batch_size": 8}),
            "/ckpt/model.pt",
        )
        .unwrap();
    adapter.handle_input("Lightning rocks!").await.unwrap();

    let runs = runner.runs();
    assert_eq!(runs.len(), 1);
    let keys = parse_keys(&runs[0].script);

    assert_eq!(keys.len(), ScriptContext::KEYS.len());
    assert_eq!(keys["task"], "classification");
    assert_eq!(keys["data_module_import_path"], "flash.text");
    assert_eq!(keys["data_module_class"], "TextClassificationData");
    assert_eq!(keys["task_import_path"], "flash.text");
    assert_eq!(keys["task_class"], "TextClassifier");
    assert_eq!(keys["url"], "http://localhost/predict");
    assert_eq!(keys["data_config"], r#"{"batch_size":8}"#);
    assert_eq!(keys["checkpoint"], "/ckpt/model.pt");
    assert_eq!(keys["input_text"], "Lightning rocks!");

    // The file on disk is the one that was run.
    let on_disk = std::fs::read_to_string(adapter.script_path()).unwrap();
    assert_eq!(on_disk, runs[0].script);
}

#[tokio::test]
async fn every_registered_task_renders_its_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let registry = TaskRegistry::new();
    let results = registry
        .iter()
        .map(|_| result(json!({"predictions": 1})))
        .collect();
    let (adapter, runner) = keys_adapter(dir.path(), results, AdapterOptions::default());

    for task in registry.iter() {
        adapter
            .configure(&task.name, "http://u", json!({}), "ckpt")
            .unwrap();
        adapter.handle_input("x").await.unwrap();

        let keys = parse_keys(&runner.runs().last().unwrap().script);
        assert_eq!(keys["task"], task.name);
        assert_eq!(keys["data_module_import_path"], task.data_module_import_path);
        assert_eq!(keys["data_module_class"], task.data_module_class);
        assert_eq!(keys["task_import_path"], task.task_import_path);
        assert_eq!(keys["task_class"], task.task_class);
    }
}

#[tokio::test]
async fn predictions_are_returned_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let (adapter, _) = keys_adapter(
        dir.path(),
        vec![result(json!({"predictions": ["positive"], "loss": 0.1}))],
        AdapterOptions::default(),
    );
    adapter
        .configure("classification", "http://localhost/predict", json!({}), "/ckpt/model.pt")
        .unwrap();

    let predictions = adapter.handle_input("Lightning rocks!").await.unwrap();
    assert_eq!(predictions, json!(["positive"]));
}

#[tokio::test]
async fn result_without_predictions_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let (adapter, runner) = keys_adapter(
        dir.path(),
        vec![result(json!({"labels": ["positive"]}))],
        AdapterOptions::default(),
    );
    adapter
        .configure(
            "classification",
            "http://localhost/predict",
            json!({"batch_size": 8}),
            "/ckpt/model.pt",
        )
        .unwrap();

    let err = adapter.handle_input("Lightning rocks!").await.unwrap_err();
    assert!(matches!(err, DemoError::MissingResultField { ref field, .. } if field == "predictions"));

    let keys = parse_keys(&runner.runs()[0].script);
    assert_eq!(keys["input_text"], "Lightning rocks!");
    assert_eq!(keys["checkpoint"], "/ckpt/model.pt");
}

#[tokio::test]
async fn missing_predictions_reports_script_output() {
    let dir = tempfile::tempdir().unwrap();
    let (adapter, _) = keys_adapter(
        dir.path(),
        vec![ExecutionResult {
            values: Map::new(),
            stdout: "{\"predictions\": NaN}".to_string(),
            stderr: "RuntimeWarning: invalid value".to_string(),
        }],
        AdapterOptions::default(),
    );
    adapter
        .configure("classification", "http://u", json!({}), "ckpt")
        .unwrap();

    match adapter.handle_input("x").await {
        Err(DemoError::MissingResultField {
            field,
            stdout,
            stderr,
        }) => {
            assert_eq!(field, "predictions");
            assert!(stdout.contains("NaN"));
            assert!(stderr.contains("RuntimeWarning"));
        }
        other => panic!("expected MissingResultField, got {other:?}"),
    }
}

#[tokio::test]
async fn custom_registry_replaces_builtin_tasks() {
    let dir = tempfile::tempdir().unwrap();
    write_template(dir.path(), "keys", KEYS_TEMPLATE);
    let registry = TaskRegistry::with_tasks(vec![TaskDescriptor {
        name: "tabular".to_string(),
        data_module_import_path: "flash.tabular".to_string(),
        data_module_class: "TabularClassificationData".to_string(),
        task_import_path: "flash.tabular".to_string(),
        task_class: "TabularClassifier".to_string(),
    }]);
    let runner = Arc::new(MockRunner::new(vec![result(json!({"predictions": [0]}))]));
    let adapter = DemoAdapter::with_registry(
        runner.clone(),
        AdapterOptions {
            template: "keys".to_string(),
            template_dir: Some(dir.path().to_path_buf()),
            ..AdapterOptions::default()
        },
        registry,
    )
    .unwrap();

    match adapter.configure("classification", "http://u", json!({}), "ckpt") {
        Err(DemoError::UnknownTask { name, known }) => {
            assert_eq!(name, "classification");
            assert_eq!(known, "tabular");
        }
        other => panic!("expected UnknownTask, got {other:?}"),
    }

    adapter
        .configure("tabular", "http://u", json!({}), "ckpt")
        .unwrap();
    assert_eq!(adapter.handle_input("x").await.unwrap(), json!([0]));

    let keys = parse_keys(&runner.runs()[0].script);
    assert_eq!(keys["task"], "tabular");
    assert_eq!(keys["data_module_class"], "TabularClassificationData");
    assert_eq!(keys["task_class"], "TabularClassifier");
}

#[tokio::test]
async fn input_before_configure_never_renders_or_runs() {
    let dir = tempfile::tempdir().unwrap();
    let (adapter, runner) = keys_adapter(dir.path(), vec![], AdapterOptions::default());

    let err = adapter.handle_input("hello").await.unwrap_err();
    assert!(matches!(err, DemoError::NotConfigured));
    assert_eq!(runner.calls(), 0);
    assert!(!adapter.script_path().exists());
}

#[tokio::test]
async fn unknown_task_does_not_mutate_config() {
    let dir = tempfile::tempdir().unwrap();
    let (adapter, runner) = keys_adapter(dir.path(), vec![], AdapterOptions::default());

    let err = adapter
        .configure("not-a-task", "http://u", json!({}), "ckpt")
        .unwrap_err();
    assert!(matches!(err, DemoError::UnknownTask { ref name, .. } if name == "not-a-task"));
    assert!(!adapter.is_configured());

    // Still rejects input afterwards.
    assert!(matches!(
        adapter.handle_input("x").await,
        Err(DemoError::NotConfigured)
    ));
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn template_errors_surface_and_skip_execution() {
    let dir = tempfile::tempdir().unwrap();
    write_template(dir.path(), "broken", "value={{ no_such_key }}\n");
    let runner = Arc::new(MockRunner::new(vec![]));
    let adapter = DemoAdapter::new(
        runner.clone(),
        AdapterOptions {
            template: "broken".to_string(),
            template_dir: Some(dir.path().to_path_buf()),
            ..AdapterOptions::default()
        },
    )
    .unwrap();
    adapter
        .configure("classification", "u", json!({}), "ckpt")
        .unwrap();

    let err = adapter.handle_input("x").await.unwrap_err();
    assert!(matches!(err, DemoError::TemplateRender(ref m) if m.contains("no_such_key")));
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn missing_template_is_a_render_error() {
    let runner = Arc::new(MockRunner::new(vec![]));
    let adapter = DemoAdapter::new(
        runner.clone(),
        AdapterOptions {
            template: "does_not_exist".to_string(),
            ..AdapterOptions::default()
        },
    )
    .unwrap();
    adapter
        .configure("classification", "u", json!({}), "ckpt")
        .unwrap();

    assert!(matches!(
        adapter.handle_input("x").await,
        Err(DemoError::TemplateRender(_))
    ));
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn execution_failure_carries_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    write_template(dir.path(), "keys", KEYS_TEMPLATE);
    let runner = Arc::new(MockRunner::with_outcomes(vec![Err(
        "Traceback: ModuleNotFoundError".to_string(),
    )]));
    let adapter = DemoAdapter::new(
        runner.clone(),
        AdapterOptions {
            template: "keys".to_string(),
            template_dir: Some(dir.path().to_path_buf()),
            ..AdapterOptions::default()
        },
    )
    .unwrap();
    adapter
        .configure("classification", "u", json!({}), "ckpt")
        .unwrap();

    match adapter.handle_input("x").await {
        Err(DemoError::ExecutionFailed { stderr, .. }) => {
            assert!(stderr.contains("ModuleNotFoundError"));
        }
        other => panic!("expected ExecutionFailed, got {other:?}"),
    }
    assert_eq!(runner.calls(), 1);
}

#[tokio::test]
async fn runs_once_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let (adapter, runner) = keys_adapter(
        dir.path(),
        vec![
            result(json!({"predictions": "first"})),
            result(json!({"predictions": "second"})),
        ],
        AdapterOptions::default(),
    );
    adapter
        .configure("classification", "u", json!({}), "ckpt")
        .unwrap();

    assert_eq!(adapter.handle_input("x").await.unwrap(), json!("first"));
    assert_eq!(runner.calls(), 1);
}

#[tokio::test]
async fn warm_up_runs_twice_and_keeps_second_result() {
    let dir = tempfile::tempdir().unwrap();
    let (adapter, runner) = keys_adapter(
        dir.path(),
        vec![
            result(json!({"predictions": "warm"})),
            result(json!({"predictions": "real"})),
        ],
        AdapterOptions {
            warm_up: true,
            ..AdapterOptions::default()
        },
    );
    adapter
        .configure("classification", "u", json!({}), "ckpt")
        .unwrap();

    assert_eq!(adapter.handle_input("x").await.unwrap(), json!("real"));
    assert_eq!(runner.calls(), 2);
    let runs = runner.runs();
    assert_eq!(runs[0].script, runs[1].script);
}

#[tokio::test]
async fn overrides_reach_runner_as_launch_parameter() {
    let dir = tempfile::tempdir().unwrap();
    let env = HashMap::from([("FLASH_DEMO_MOCK_ONLY".to_string(), "1".to_string())]);
    let (adapter, runner) = keys_adapter(
        dir.path(),
        vec![result(json!({"predictions": 1}))],
        AdapterOptions {
            env: env.clone(),
            ..AdapterOptions::default()
        },
    );
    adapter
        .configure("classification", "u", json!({}), "ckpt")
        .unwrap();

    let before = env_snapshot();
    adapter.handle_input("x").await.unwrap();
    assert_eq!(env_snapshot(), before);
    assert_eq!(runner.runs()[0].env, env);
    assert!(std::env::var("FLASH_DEMO_MOCK_ONLY").is_err());
}

#[tokio::test]
async fn concurrent_inputs_do_not_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let (adapter, runner) = keys_adapter(
        dir.path(),
        vec![
            result(json!({"predictions": 1})),
            result(json!({"predictions": 2})),
        ],
        AdapterOptions::default(),
    );
    adapter
        .configure("classification", "u", json!({}), "ckpt")
        .unwrap();
    let adapter = Arc::new(adapter);

    let a = tokio::spawn({
        let adapter = Arc::clone(&adapter);
        async move { adapter.handle_input("alpha").await }
    });
    let b = tokio::spawn({
        let adapter = Arc::clone(&adapter);
        async move { adapter.handle_input("beta").await }
    });
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let seen: BTreeSet<String> = runner
        .runs()
        .iter()
        .map(|run| parse_keys(&run.script)["input_text"].clone())
        .collect();
    assert_eq!(
        seen,
        BTreeSet::from(["alpha".to_string(), "beta".to_string()])
    );
}

#[tokio::test]
async fn process_env_is_untouched_with_real_process() {
    let dir = tempfile::tempdir().unwrap();
    write_template(
        dir.path(),
        "env_check",
        "printf '{\"predictions\": \"%s\"}\\n' \"$FLASH_DEMO_TEST_LABEL\"\n",
    );
    let runner = Arc::new(ProcessRunner::new(ProcessConfig {
        interpreter: "sh".to_string(),
        ..ProcessConfig::default()
    }));
    let adapter = DemoAdapter::new(
        runner,
        AdapterOptions {
            template: "env_check".to_string(),
            template_dir: Some(dir.path().to_path_buf()),
            env: HashMap::from([("FLASH_DEMO_TEST_LABEL".to_string(), "positive".to_string())]),
            ..AdapterOptions::default()
        },
    )
    .unwrap();
    adapter
        .configure("classification", "u", json!({}), "ckpt")
        .unwrap();

    let before = env_snapshot();
    let predictions = adapter.handle_input("x").await.unwrap();
    assert_eq!(predictions, json!("positive"));
    assert_eq!(env_snapshot(), before);
}

#[tokio::test]
async fn process_env_is_untouched_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_template(dir.path(), "fail", "echo boom >&2\nexit 3\n");
    let runner = Arc::new(ProcessRunner::new(ProcessConfig {
        interpreter: "sh".to_string(),
        ..ProcessConfig::default()
    }));
    let adapter = DemoAdapter::new(
        runner,
        AdapterOptions {
            template: "fail".to_string(),
            template_dir: Some(dir.path().to_path_buf()),
            env: HashMap::from([("FLASH_DEMO_FAIL_ONLY".to_string(), "1".to_string())]),
            ..AdapterOptions::default()
        },
    )
    .unwrap();
    adapter
        .configure("classification", "u", json!({}), "ckpt")
        .unwrap();

    let before = env_snapshot();
    match adapter.handle_input("x").await {
        Err(DemoError::ExecutionFailed { reason, stderr, .. }) => {
            assert_eq!(reason, "exit code 3");
            assert!(stderr.contains("boom"));
        }
        other => panic!("expected ExecutionFailed, got {other:?}"),
    }
    assert_eq!(env_snapshot(), before);
    assert!(std::env::var("FLASH_DEMO_FAIL_ONLY").is_err());
}

#[test]
fn builtin_template_quotes_user_input() {
    let runner = Arc::new(MockRunner::new(vec![]));
    let adapter = DemoAdapter::new(runner, AdapterOptions::default()).unwrap();
    adapter
        .configure(
            "classification",
            "http://localhost/predict",
            json!({"batch_size": 8, "shuffle": false}),
            "/ckpt/model.pt",
        )
        .unwrap();

    let script = adapter.render_script("it's \"quoted\"").unwrap();
    assert!(script.contains("from flash.text import TextClassificationData"));
    assert!(script.contains("from flash.text import TextClassifier"));
    assert!(script.contains(r#"INPUT_TEXT = "it's \"quoted\"""#));
    assert!(script.contains(r#"CHECKPOINT = "/ckpt/model.pt""#));
    assert!(script.contains(r#"DATA_CONFIG = json.loads("{\"batch_size\":8,\"shuffle\":false}")"#));
}

#[test]
fn empty_result_map_is_missing_predictions() {
    let result = ExecutionResult::from_values(Map::new());
    assert!(result.get("predictions").is_none());
}
