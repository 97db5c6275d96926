//! Source discovery and partitioning of files into post-sized batches.
use std::io;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::model::{validate_batch_size, Batch};

/// List regular files in `dir`, sorted by file name. Subdirectories are skipped.
pub async fn discover_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Split `files` into consecutive batches of `size`; the last may be shorter.
pub fn batch(files: &[PathBuf], size: usize) -> Result<Vec<Batch>, EngineError> {
    validate_batch_size(size)?;
    Ok(files
        .chunks(size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            files: chunk.to_vec(),
        })
        .collect())
}
