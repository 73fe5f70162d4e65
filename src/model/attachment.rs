//! Attachment records.
//!
//! Payloads are never kept in memory past the write; only the location on
//! disk is remembered.

use std::path::PathBuf;

/// An attachment that has been written to the destination directory.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AttachmentRecord {
    /// Filename as declared by the message (already decoded), if any.
    /// May be unsafe for direct use as a path.
    pub declared_filename: Option<String>,

    /// Final location. Did not exist before the write.
    pub resolved_path: PathBuf,

    /// Number of payload bytes written.
    pub size: u64,
}
