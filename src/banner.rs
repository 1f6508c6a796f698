//! Startup banner.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::config::ToolLocation;
use crate::consts::{AUTHOR, HOMEPAGE, REPO, format_number};

/// Server configuration for display in the startup banner.
pub struct BannerInfo<'a> {
    pub addr: SocketAddr,
    pub tool: &'a ToolLocation,
    pub ir_mode: &'a str,
    pub timeout: Duration,
    pub staging_dir: &'a Path,
    pub max_source_bytes: usize,
    pub max_concurrent: usize,
}

/// Status line for the tool: its path, or why it can't be used.
pub fn tool_status(tool: &ToolLocation) -> String {
    match tool {
        ToolLocation::Ready(path) => path.display().to_string(),
        ToolLocation::Unavailable { path, reason } => {
            format!("{} (UNAVAILABLE: {})", path.display(), reason)
        }
    }
}

/// Print the startup banner with server info.
pub fn print_banner(info: &BannerInfo) {
    println!(
        r#"
   ╔═══════════════════════════════════════╗
   ║               K I L N                 ║
   ║      paste it in, fire it, look       ║
   ╚═══════════════════════════════════════╝

   version   {}
   by        {}
   home      {}
   repo      {}
   listen    http://{}
   tool      {}
   ir mode   {}
   timeout   {:.1}s
   staging   {}
   limits    {} bytes source, {} concurrent
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        REPO,
        info.addr,
        tool_status(info.tool),
        info.ir_mode,
        info.timeout.as_secs_f64(),
        info.staging_dir.display(),
        format_number(info.max_source_bytes as u64),
        info.max_concurrent,
    );
}
