//! Per-request staging of submitted source on disk.
//!
//! Every submission gets its own freshly created directory under the staging
//! root, named with a random token and created exclusively, so two requests
//! can never share a location. The directory doubles as the tool's working
//! directory and disappears when the artifact is released (or dropped).

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::consts::STAGING_PREFIX;
use crate::error::PlaygroundError;

/// Creates staged artifacts under a common root.
#[derive(Debug, Clone)]
pub struct Stager {
    root: PathBuf,
    source_name: String,
}

/// One request's private copy of its source.
#[derive(Debug)]
pub struct StagedArtifact {
    dir: TempDir,
    source_path: PathBuf,
}

impl Stager {
    pub fn new(root: impl Into<PathBuf>, source_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            source_name: source_name.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the staging root if it does not exist yet.
    pub async fn prepare(&self) -> Result<(), PlaygroundError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Write `source` verbatim into a new private directory.
    ///
    /// Returns only after the bytes are flushed and synced, so a tool started
    /// afterwards always sees the full text.
    pub async fn stage(&self, source: &str) -> Result<StagedArtifact, PlaygroundError> {
        let root = self.root.clone();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .tempdir_in(root)
        })
        .await
        .map_err(|e| PlaygroundError::Io(e.to_string()))??;
        let source_path = dir.path().join(&self.source_name);

        // On error `dir` drops here and takes the partial file with it.
        write_synced(&source_path, source.as_bytes()).await?;

        debug!(path = %source_path.display(), bytes = source.len(), "staged source");
        Ok(StagedArtifact { dir, source_path })
    }

    /// Remove the artifact off the async workers. Failures are logged, never
    /// returned.
    pub async fn release(&self, artifact: StagedArtifact) {
        if let Err(e) = tokio::task::spawn_blocking(move || artifact.release()).await {
            warn!(error = %e, "staged source cleanup task failed");
        }
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

impl StagedArtifact {
    /// The staged source file; passed to the tool as its argument.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// The private directory holding the source.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the directory and everything in it.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(path = %path.display(), "released staged source"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staged source"),
        }
    }
}
