//! Project-wide constants and defaults.

use std::time::Duration;

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");
pub const REPO: &str = env!("CARGO_PKG_REPOSITORY");

/// Loopback only. This is a local developer aid with no authentication.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_PORT: u16 = 8080;

/// Where the tool lands after `cargo build` in a sibling `core/` checkout.
pub const DEFAULT_TOOL_PATH: &str = "../core/target/debug/core";

/// Wall-clock budget for a single tool invocation.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Largest accepted submission, in bytes.
pub const MAX_SOURCE_BYTES: usize = 64 * 1024;

/// Maximum captured size per output stream. Anything beyond this is dropped.
pub const MAX_OUTPUT_BYTES: usize = 50_000;

/// Tool invocations allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// File name of the staged source inside its private directory.
pub const DEFAULT_SOURCE_NAME: &str = "main.rs";

/// Prefix of every per-request staging directory.
pub const STAGING_PREFIX: &str = "kiln-";

/// Line the tool prints right before its intermediate representation.
pub const DEFAULT_IR_MARKER: &str = "=== LLVM IR (generated) ===";

/// How long to wait for the output readers once the process is gone.
pub const IO_CAPTURE_GRACE: Duration = Duration::from_secs(2);

/// Program shown in the editor when the page first loads.
pub const DEFAULT_EXAMPLE: &str = "fn main() {
    let x = 0;
    while (x < 3) {
        x = x + 1;
    }
    if (x == 3) { 99; } else { 0; }
}";

/// Default staging root: `$TMPDIR/kiln`.
pub fn default_staging_dir() -> std::path::PathBuf {
    std::env::temp_dir().join("kiln")
}

/// Format a number with comma separators (e.g. 1,234,567).
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consts_from_cargo_toml() {
        assert!(AUTHOR.contains("Assaf Sapir"));
        assert!(HOMEPAGE.contains("sapir.io"));
        assert!(REPO.contains("github.com/assapir/kiln"));
    }

    #[test]
    fn default_addr_is_loopback() {
        let addr: std::net::SocketAddr = DEFAULT_ADDR.parse().unwrap();
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn default_example_has_main() {
        assert!(DEFAULT_EXAMPLE.starts_with("fn main()"));
    }

    #[test]
    fn staging_dir_is_under_temp() {
        assert!(default_staging_dir().starts_with(std::env::temp_dir()));
    }

    #[test]
    fn format_number_small() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
    }

    #[test]
    fn format_number_thousands() {
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(50_000), "50,000");
        assert_eq!(format_number(65_536), "65,536");
    }

    #[test]
    fn format_number_millions() {
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
