//! Artifact persistence. One file per (directory, certname, extension),
//! overwritten on rewrite; this is the durability boundary of the pipeline.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Writes `content` to `<dir>/<certname>.<extension>`, replacing any prior
/// artifact with the same key, and returns the written path.
pub async fn save_artifact(
    dir: &Path,
    certname: &str,
    content: &str,
    extension: &str,
) -> Result<PathBuf> {
    let path = artifact_path(dir, certname, extension);
    tokio::fs::write(&path, content)
        .await
        .map_err(|source| Error::Persistence {
            certname: certname.to_string(),
            extension: extension.to_string(),
            directory: dir.display().to_string(),
            source,
        })?;
    Ok(path)
}

pub fn artifact_path(dir: &Path, certname: &str, extension: &str) -> PathBuf {
    dir.join(format!("{certname}.{extension}"))
}
