//! Persistent node identity.
//!
//! The identity document is written with an atomic replace: the new content
//! goes to a temporary file in the target's directory, named after the hash
//! of its content, is flushed to disk, and is then renamed over the target.
//! A reader sees either the previous complete document or the new one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("State path has no file name: {}", .0.display())]
    InvalidPath(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StateError + '_ {
    move |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Long-lived node credentials. Generated once and never changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub node_id: String,
    pub node_secret: String,
}

impl NodeState {
    /// Fresh identity from the OS random source, in canonical UUID form.
    pub fn generate() -> Self {
        Self {
            node_id: Uuid::new_v4().to_string(),
            node_secret: Uuid::new_v4().to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.node_id.is_empty() && !self.node_secret.is_empty()
    }

    /// Load state from `path`. A missing file is a first boot and yields an
    /// empty state.
    pub async fn load(path: &Path) -> Result<Self, StateError> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(io_error(path)(e)),
        };
        serde_json::from_slice(&data).map_err(|source| StateError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Persist state to `path` via atomic replace.
    pub async fn store(&self, path: &Path) -> Result<(), StateError> {
        let data = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &data).await
    }

    /// Load the identity, generating and persisting one if none exists yet.
    /// The flag is true when a new identity was generated.
    pub async fn load_or_generate(path: &Path) -> Result<(Self, bool), StateError> {
        let state = Self::load(path).await?;
        if state.is_complete() {
            return Ok((state, false));
        }

        let state = Self::generate();
        state.store(path).await?;
        tracing::info!(node_id = %state.node_id, path = %path.display(), "Generated node identity");
        Ok((state, true))
    }
}

/// Temporary file used while replacing `path` with `contents`.
pub fn temp_path(path: &Path, contents: &[u8]) -> Result<PathBuf, StateError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| StateError::InvalidPath(path.to_path_buf()))?;
    let digest = hex::encode(Sha256::digest(contents));
    Ok(path.with_file_name(format!(
        "{}.{}.tmp",
        file_name.to_string_lossy(),
        digest
    )))
}

/// Write `contents` to its temporary file and flush it to disk. The target
/// is untouched until [`commit`]. A partly written temporary file is removed.
pub async fn write_temp(path: &Path, contents: &[u8]) -> Result<PathBuf, StateError> {
    let tmp = temp_path(path, contents)?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(&tmp).await.map_err(io_error(&tmp))?;
    let written = async {
        file.write_all(contents).await?;
        file.sync_all().await
    }
    .await;
    drop(file);

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp).await;
        return Err(io_error(&tmp)(e));
    }
    Ok(tmp)
}

/// Rename a staged temporary file over the target.
pub async fn commit(tmp: &Path, path: &Path) -> Result<(), StateError> {
    fs::rename(tmp, path).await.map_err(io_error(path))?;

    // Persist the rename itself. Not every platform can fsync a directory.
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = fs::File::open(dir).await {
            let _ = dir.sync_all().await;
        }
    }
    Ok(())
}

pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StateError> {
    let tmp = write_temp(path, contents).await?;
    if let Err(e) = commit(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
