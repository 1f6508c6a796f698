//! Process-wide configuration, resolved once at startup.
//!
//! Nothing here changes after [`ServerConfig`] is built; the server shares it
//! read-only across every request.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::consts::{
    DEFAULT_EXAMPLE, DEFAULT_PORT, DEFAULT_SOURCE_NAME, DEFAULT_TOOL_PATH, MAX_SOURCE_BYTES,
    default_staging_dir,
};
use crate::error::PlaygroundError;
use crate::runner::RunnerConfig;

/// Everything the server needs to answer requests.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Path of the external tool as given by the user.
    pub tool: PathBuf,
    /// Root under which per-request staging directories are created.
    pub staging_dir: PathBuf,
    /// File name of the staged source inside its directory.
    pub source_name: String,
    pub max_source_bytes: usize,
    /// Program pre-filled in the editor.
    pub example: String,
    pub runner: RunnerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            tool: PathBuf::from(DEFAULT_TOOL_PATH),
            staging_dir: default_staging_dir(),
            source_name: DEFAULT_SOURCE_NAME.to_string(),
            max_source_bytes: MAX_SOURCE_BYTES,
            example: DEFAULT_EXAMPLE.to_string(),
            runner: RunnerConfig::default(),
        }
    }
}

/// Outcome of looking up the external tool at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolLocation {
    /// Canonical path of an existing executable file.
    Ready(PathBuf),
    /// The tool cannot be used. Every request reports this.
    Unavailable { path: PathBuf, reason: String },
}

impl ToolLocation {
    /// Check that `path` names an invocable file. Relative paths are taken
    /// relative to the current directory.
    pub fn resolve(path: &Path) -> Self {
        let shown = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

        let meta = match std::fs::metadata(&shown) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Self::Unavailable {
                    path: shown,
                    reason: "not found; build the tool first or pass --tool".to_string(),
                };
            }
            Err(e) => {
                return Self::Unavailable {
                    path: shown,
                    reason: e.to_string(),
                };
            }
        };

        if !meta.is_file() {
            return Self::Unavailable {
                path: shown,
                reason: "not a regular file".to_string(),
            };
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if meta.permissions().mode() & 0o111 == 0 {
                return Self::Unavailable {
                    path: shown,
                    reason: "not executable".to_string(),
                };
            }
        }

        match std::fs::canonicalize(&shown) {
            Ok(canonical) => Self::Ready(canonical),
            Err(e) => Self::Unavailable {
                path: shown,
                reason: e.to_string(),
            },
        }
    }

    /// The executable path, or the error every request should report.
    pub fn executable(&self) -> Result<&Path, PlaygroundError> {
        match self {
            Self::Ready(path) => Ok(path),
            Self::Unavailable { path, reason } => Err(PlaygroundError::ToolUnavailable {
                path: path.clone(),
                reason: reason.clone(),
            }),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}
