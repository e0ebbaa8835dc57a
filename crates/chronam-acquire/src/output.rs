use crate::error::{AcquireError, Result};
use chronam_model::{CorpusLayout, CorpusMetadata};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Write `metadata.json` atomically.
///
/// The document is serialized into a temporary file next to the target and
/// renamed over it, so readers see either the previous version or the new
/// one in full.
pub fn write_metadata(layout: &CorpusLayout, metadata: &CorpusMetadata) -> Result<PathBuf> {
    let dir = layout.root();
    fs::create_dir_all(dir).map_err(|e| AcquireError::io(dir, e))?;

    let path = layout.metadata_path();
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| AcquireError::io(dir, e))?;
    serde_json::to_writer_pretty(tmp.as_file_mut(), metadata)?;
    tmp.as_file_mut()
        .write_all(b"\n")
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| AcquireError::io(tmp.path(), e))?;
    tmp.persist(&path)
        .map_err(|e| AcquireError::io(&path, e.error))?;

    tracing::info!(path = %path.display(), pages = metadata.total_pages, "Wrote corpus metadata");
    Ok(path)
}

/// A download in progress.
///
/// Bytes go to a hidden temporary file in the destination directory; only
/// [`PartialFile::commit`] moves them to the final name. Dropping an
/// uncommitted `PartialFile` deletes the temporary file.
pub struct PartialFile {
    tmp: NamedTempFile,
    bytes: u64,
}

impl PartialFile {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| AcquireError::io(dir, e))?;
        let tmp = tempfile::Builder::new()
            .prefix(".chronam-")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(|e| AcquireError::io(dir, e))?;
        Ok(Self { tmp, bytes: 0 })
    }

    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.tmp
            .as_file_mut()
            .write_all(chunk)
            .map_err(|e| AcquireError::io(self.tmp.path(), e))?;
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Flush to disk and rename onto `dest`. Returns the byte count.
    pub fn commit(self, dest: &Path) -> Result<u64> {
        self.tmp
            .as_file()
            .sync_all()
            .map_err(|e| AcquireError::io(self.tmp.path(), e))?;
        let bytes = self.bytes;
        self.tmp
            .persist(dest)
            .map_err(|e| AcquireError::io(dest, e.error))?;
        Ok(bytes)
    }
}

/// A local file counts as complete when it exists and is non-empty.
pub fn is_complete(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}
