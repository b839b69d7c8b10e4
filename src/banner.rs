//! Startup banner.

use crate::consts::{AUTHOR, HOMEPAGE, REPO};

/// Session configuration for display in the startup banner.
pub struct BannerInfo<'a> {
    pub task: &'a str,
    pub model: &'a str,
    pub checkpoint: &'a str,
    pub interpreter: &'a str,
    pub serving: &'a str,
}

/// Render the startup banner with session info.
pub fn render_banner(info: &BannerInfo) -> String {
    format!(
        r#"
   ╔═══════════════════════════════════════╗
   ║         F L A S H   D E M O           ║
   ║   one input in, one prediction out    ║
   ╚═══════════════════════════════════════╝

   version     {}
   by          {}
   home        {}
   repo        {}
   task        {} ({})
   checkpoint  {}
   python      {}
   serving     {}
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        REPO,
        info.task,
        info.model,
        info.checkpoint,
        info.interpreter,
        info.serving,
    )
}

pub fn print_banner(info: &BannerInfo) {
    println!("{}", render_banner(info));
}
