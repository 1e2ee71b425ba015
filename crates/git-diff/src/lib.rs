//! Tree comparer: tree-to-tree structural diffing with rename detection.
//!
//! Produces a flat per-path list of changes (added/removed/modified/renamed/
//! copied/type-changed) between two trees. This is a status-only comparer —
//! it does not generate line-level hunks or textual diff output.

pub mod binary;
pub mod diffcore;
pub mod rename;
pub mod tree;

use bstr::BString;
use git_hash::ObjectId;
use git_object::FileMode;

/// Options controlling tree comparison.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Enable rename detection (diffcore-rename, phase one: exact content match).
    pub detect_renames: bool,
    /// Similarity threshold for rename detection (0-100, default 50).
    pub rename_threshold: u8,
    /// Enable copy detection.
    pub detect_copies: bool,
    /// Similarity threshold for copy detection (0-100, default 50).
    pub copy_threshold: u8,
    /// Pathspec filter (None = all paths).
    pub pathspec: Option<Vec<BString>>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            detect_renames: true,
            rename_threshold: 50,
            detect_copies: false,
            copy_threshold: 50,
            pathspec: None,
        }
    }
}

/// Result of comparing two trees.
#[derive(Debug, Clone)]
pub struct DiffResult {
    /// Per-file change entries.
    pub files: Vec<FileDiff>,
}

impl DiffResult {
    /// True if no paths changed.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of paths changed.
    pub fn num_files_changed(&self) -> usize {
        self.files.len()
    }
}

/// Change record for a single path.
#[derive(Debug, Clone)]
pub struct FileDiff {
    /// Type of change.
    pub status: FileStatus,
    /// Old path (None for added files).
    pub old_path: Option<BString>,
    /// New path (None for deleted files).
    pub new_path: Option<BString>,
    /// Old file mode (None for added files).
    pub old_mode: Option<FileMode>,
    /// New file mode (None for deleted files).
    pub new_mode: Option<FileMode>,
    /// Old object ID (None for added files).
    pub old_oid: Option<ObjectId>,
    /// New object ID (None for deleted files).
    pub new_oid: Option<ObjectId>,
    /// Whether either side's blob is binary.
    pub is_binary: bool,
    /// Similarity percentage for renames/copies (0-100).
    pub similarity: Option<u8>,
}

impl FileDiff {
    /// The effective path for display (prefers new_path, falls back to old_path).
    pub fn path(&self) -> &BString {
        self.new_path
            .as_ref()
            .or(self.old_path.as_ref())
            .expect("FileDiff must have at least one path")
    }
}

/// File-level change status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
    TypeChanged,
    Unmerged,
}

impl FileStatus {
    /// Single-character status code matching C git output.
    pub fn as_char(&self) -> char {
        match self {
            Self::Added => 'A',
            Self::Deleted => 'D',
            Self::Modified => 'M',
            Self::Renamed => 'R',
            Self::Copied => 'C',
            Self::TypeChanged => 'T',
            Self::Unmerged => 'U',
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Added => "A",
            Self::Deleted => "D",
            Self::Modified => "M",
            Self::Renamed => "R",
            Self::Copied => "C",
            Self::TypeChanged => "T",
            Self::Unmerged => "U",
        })
    }
}

/// Error types for diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("failed to read object {oid}: {source}")]
    ObjectRead {
        oid: ObjectId,
        #[source]
        source: git_odb::OdbError,
    },

    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("expected {expected} object, got {actual} for {oid}")]
    UnexpectedObjectType {
        oid: ObjectId,
        expected: &'static str,
        actual: String,
    },

    #[error(transparent)]
    Repo(#[from] git_repository::RepoError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
