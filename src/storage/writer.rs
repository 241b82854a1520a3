//! Recording file writer

use std::io::{self, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use super::format::Recording;
use crate::StorageError;

/// Write `recording` to `path` atomically.
///
/// The file is assembled in a temporary file next to the target and renamed
/// over it, so readers see either the old file or the complete new one. On
/// failure the temporary file is removed.
///
/// # Errors
///
/// Returns error if directories cannot be created or the file cannot be
/// written or renamed
pub fn save(recording: &Recording, path: &Path) -> Result<(), StorageError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;

    let file_name = path
        .file_name()
        .map_or_else(|| "request".into(), |name| name.to_string_lossy());
    // Dropping `temp` on any early return deletes the temporary file
    let mut temp = tempfile::Builder::new()
        .prefix(&*file_name)
        .tempfile_in(parent)
        .map_err(|e| StorageError::io(parent, e))?;

    write_contents(recording, &mut temp, path)?;

    temp.persist(path)
        .map_err(|e| StorageError::io(path, e.error))?;

    debug!(
        "Saved recording {} ({} body bytes)",
        path.display(),
        recording.body.len()
    );
    Ok(())
}

/// Indented JSON header block, one newline, raw body
fn write_contents(
    recording: &Recording,
    temp: &mut NamedTempFile,
    path: &Path,
) -> Result<(), StorageError> {
    let mut writer = BufWriter::new(temp.as_file_mut());

    serde_json::to_writer_pretty(&mut writer, &recording.to_header())
        .map_err(|e| encode_error(path, e))?;

    let io_err = |e| StorageError::io(path, e);
    writer.write_all(b"\n").map_err(io_err)?;
    writer.write_all(&recording.body).map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    Ok(())
}

/// Write failures surfacing through serde_json are I/O errors, not bad data
fn encode_error(path: &Path, source: serde_json::Error) -> StorageError {
    if source.is_io() {
        StorageError::io(path, io::Error::from(source))
    } else {
        StorageError::Malformed {
            path: path.to_path_buf(),
            source,
        }
    }
}
