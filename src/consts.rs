//! Project-wide constants.

use std::path::PathBuf;

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");
pub const REPO: &str = env!("CARGO_PKG_REPOSITORY");

/// The UI binds to all interfaces unless told otherwise.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Fixed demo port.
pub const DEFAULT_PORT: u16 = 5151;

/// Prefilled into the demo textbox.
pub const SAMPLE_INPUT: &str = "Lightning rocks!";

/// Built-in template used when none is named.
pub const DEFAULT_TEMPLATE: &str = "flash_demo";

/// File name of the generated script inside the adapter's scratch dir.
pub const SCRIPT_FILE_NAME: &str = "flash_demo.py";

/// Interpreter used to run the generated script.
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Maximum captured output per stream, in bytes.
pub const MAX_OUTPUT_BYTES: usize = 50_000;

/// The result field handed back to the UI.
pub const PREDICTIONS_FIELD: &str = "predictions";

/// Default config file path: `~/.flash-demo/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".flash-demo").join("config.json"))
}
