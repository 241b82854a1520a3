//! Recording file reader

use std::path::Path;

use bytes::Bytes;
use serde_json::Deserializer;
use tracing::debug;

use super::format::{Recording, RecordingHeader};
use crate::StorageError;

/// Load the recording stored at `path`.
///
/// Everything after the JSON header block, minus at most one newline, is the
/// response body.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] if the file does not exist, and other
/// variants if it cannot be read or decoded
pub fn load(path: &Path) -> Result<Recording, StorageError> {
    let data = std::fs::read(path).map_err(|e| StorageError::io(path, e))?;
    let recording = decode(path, Bytes::from(data))?;

    debug!(
        "Loaded recording {} ({} body bytes)",
        path.display(),
        recording.body.len()
    );
    Ok(recording)
}

/// Split a recording file into its header block and body
pub(crate) fn decode(path: &Path, data: Bytes) -> Result<Recording, StorageError> {
    let malformed = |source| StorageError::Malformed {
        path: path.to_path_buf(),
        source,
    };

    let mut stream = Deserializer::from_slice(&data).into_iter::<RecordingHeader>();
    let header = match stream.next() {
        Some(header) => header.map_err(malformed)?,
        None => {
            return Err(StorageError::Invalid {
                path: path.to_path_buf(),
                reason: "missing JSON header block".to_string(),
            })
        }
    };

    let mut offset = stream.byte_offset();
    if data.get(offset) == Some(&b'\n') {
        offset += 1;
    }

    Recording::from_header(path, header, data.slice(offset..))
}
