use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use flash_demo::DemoAdapter;
use flash_demo::adapter::predictions_to_text;
use flash_demo::banner::{BannerInfo, print_banner};
use flash_demo::config::{DemoConfig, parse_env_pair};
use flash_demo::consts::default_config_path;
use flash_demo::runner::process::ProcessRunner;
use flash_demo::server;
use flash_demo::tasks::TaskRegistry;

#[derive(Parser)]
#[command(
    name = "flash-demo",
    version,
    about = "Serve a web demo for a trained task."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Task name (see `flash-demo tasks`)
    #[arg(short, long)]
    task: Option<String>,

    /// Serving URL handed to the generated script
    #[arg(short, long)]
    url: Option<String>,

    /// Dataset configuration as a JSON object
    #[arg(long, conflicts_with = "data_config_file")]
    data_config: Option<String>,

    /// Read the dataset configuration from a JSON file
    #[arg(long)]
    data_config_file: Option<PathBuf>,

    /// Checkpoint of the trained model (passed through as-is)
    #[arg(long)]
    checkpoint: Option<String>,

    /// Address the UI binds to [default: 0.0.0.0]
    #[arg(long)]
    host: Option<String>,

    /// Port the UI binds to [default: 5151]
    #[arg(short, long)]
    port: Option<u16>,

    /// Interpreter for the generated script [default: python3]
    #[arg(long)]
    python: Option<String>,

    /// Argument passed to the interpreter before the script (repeatable)
    #[arg(long = "python-arg", value_name = "ARG", allow_hyphen_values = true)]
    python_args: Vec<String>,

    /// Extra environment for the script process (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Directory searched for `<name>.py.tmpl` before the built-in templates
    #[arg(long)]
    template_dir: Option<PathBuf>,

    /// Script template name [default: flash_demo]
    #[arg(long)]
    template: Option<String>,

    /// Kill the script after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Run the script once more before the run whose result is used
    #[arg(long, default_value_t = false)]
    warm_up: bool,

    /// JSON config file [default: ~/.flash-demo/config.json if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Handle a single input, print the predictions and exit
    #[arg(short, long)]
    run: Option<String>,

    /// With --run: print the generated script instead of running it
    #[arg(long, requires = "run", default_value_t = false)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List the tasks the demo can serve
    Tasks,
}

impl Cli {
    /// The config layer made of command-line flags.
    fn overrides(&self) -> Result<DemoConfig> {
        let data_config: Option<Value> = match (&self.data_config, &self.data_config_file) {
            (Some(raw), _) => {
                Some(serde_json::from_str(raw).context("--data-config is not valid JSON")?)
            }
            (None, Some(path)) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Some(
                    serde_json::from_str(&raw)
                        .with_context(|| format!("{} is not valid JSON", path.display()))?,
                )
            }
            (None, None) => None,
        };

        let env = self
            .env
            .iter()
            .map(|pair| parse_env_pair(pair))
            .collect::<Result<_>>()?;

        Ok(DemoConfig {
            task: self.task.clone(),
            url: self.url.clone(),
            data_config,
            checkpoint: self.checkpoint.clone(),
            host: self.host.clone(),
            port: self.port,
            python: self.python.clone(),
            python_args: self.python_args.clone(),
            template: self.template.clone(),
            template_dir: self.template_dir.clone(),
            env,
            timeout_secs: self.timeout,
            warm_up: self.warm_up.then_some(true),
        })
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn list_tasks() {
    let registry = TaskRegistry::new();
    let width = registry.names().iter().map(|n| n.len()).max().unwrap_or(10);
    for task in registry.iter() {
        println!(
            "  {:<width$}  {}.{} / {}.{}",
            task.name,
            task.data_module_import_path,
            task.data_module_class,
            task.task_import_path,
            task.task_class,
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if let Some(Command::Tasks) = &cli.command {
        list_tasks();
        return Ok(());
    }

    let file_config = match &cli.config {
        Some(path) => DemoConfig::load(path)?,
        None => match default_config_path() {
            Some(path) => DemoConfig::load_optional(&path)?,
            None => DemoConfig::default(),
        },
    };
    let config = file_config.merge(cli.overrides()?).resolve()?;

    let interpreter = config.process.interpreter.clone();
    let runner = Arc::new(ProcessRunner::new(config.process.clone()));
    let adapter = Arc::new(DemoAdapter::new(runner, config.adapter.clone())?);

    // Setup only records what to run; nothing executes until input arrives.
    adapter.configure(
        &config.task,
        &config.url,
        config.data_config.clone(),
        config.checkpoint.clone(),
    )?;

    if let Some(input) = &cli.run {
        if cli.dry_run {
            print!("{}", adapter.render_script(input)?);
        } else {
            let predictions = adapter.handle_input(input).await?;
            println!("{}", predictions_to_text(&predictions));
        }
        return Ok(());
    }

    let model = adapter
        .task()
        .map(|t| format!("{}.{}", t.task_import_path, t.task_class))
        .unwrap_or_default();
    let serving = format!("http://{}:{}", config.host, config.port);
    print_banner(&BannerInfo {
        task: &config.task,
        model: &model,
        checkpoint: &config.checkpoint,
        interpreter: &interpreter,
        serving: &serving,
    });

    server::serve(adapter, &config.host, config.port).await
}
