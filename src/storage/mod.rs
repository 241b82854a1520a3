//! File-backed recording storage
//!
//! One recording per file: an indented JSON header block describing the
//! response, one newline, then the body bytes verbatim. Files are meant to be
//! readable and editable by hand.

mod format;
mod reader;
mod writer;

use std::path::Path;

pub use format::Recording;
pub use reader::load;
pub use writer::save;

use crate::StorageError;

impl Recording {
    /// Load a recording from `path`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if there is no file at `path`
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        reader::load(path)
    }

    /// Atomically write this recording to `path`, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        writer::save(self, path)
    }
}
