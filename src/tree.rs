//! The versioned object store that tickets live in.
//!
//! Writes are staged per branch and land atomically with `commit`. A commit
//! only moves the branch if the branch still points at the commit the
//! staged writes were based on.

use std::fmt;
use thiserror::Error;

/// A commit hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Tree,
    Blob,
}

/// One row of a tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: u32,
    pub kind: EntryKind,
    pub hash: String,
    /// Full path from the tree root, `/`-separated
    pub path: String,
}

impl TreeEntry {
    /// True for entries directly under the root.
    pub fn is_top_level(&self) -> bool {
        !self.path.contains('/')
    }
}

/// Errors raised by tree backends.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TreeError {
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("revision not found: {0}")]
    RevisionNotFound(String),

    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    #[error("remote {remote} has no branch {branch}")]
    RemoteBranchNotFound { remote: String, branch: String },

    #[error("nothing staged on branch {0}")]
    NothingStaged(String),

    #[error("branch {0} moved while writes were staged")]
    RefUpdateRejected(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content-addressed, branch-committed storage.
pub trait VersionedTree {
    /// Current tip of `branch`, or `None` if the branch does not exist.
    fn resolve(&self, branch: &str) -> Result<Option<Revision>, TreeError>;

    /// Read `path` on `branch`, seeing staged writes first.
    fn read(&self, branch: &str, path: &str) -> Result<Option<Vec<u8>>, TreeError>;

    /// Read `path` as of `rev`.
    fn read_at(&self, rev: &Revision, path: &str) -> Result<Option<Vec<u8>>, TreeError>;

    /// Stage a write on `branch`.
    fn write(&mut self, branch: &str, path: &str, data: &[u8]) -> Result<(), TreeError>;

    /// Commit staged writes on `branch`.
    fn commit(&mut self, branch: &str, message: &str) -> Result<Revision, TreeError>;

    /// Commit staged writes on `branch` with `other` as a second parent.
    ///
    /// An empty staging area is allowed: the merge commit still records
    /// that `other` has been integrated.
    fn commit_merge(&mut self, branch: &str, message: &str, other: &Revision) -> Result<Revision, TreeError>;

    /// Drop staged writes on `branch`.
    fn discard(&mut self, branch: &str);

    /// Recursive listing of the tree at the tip of `branch`.
    fn list_tree(&self, branch: &str) -> Result<Vec<TreeEntry>, TreeError> {
        match self.resolve(branch)? {
            Some(rev) => self.list_tree_at(&rev),
            None => Err(TreeError::BranchNotFound(branch.to_string())),
        }
    }

    /// Recursive listing of the tree at `rev`.
    fn list_tree_at(&self, rev: &Revision) -> Result<Vec<TreeEntry>, TreeError>;

    /// Fetch `branch` from `remote` into a staging ref and return its tip.
    fn fetch(&mut self, remote: &str, branch: &str) -> Result<Revision, TreeError>;

    /// Best common ancestor of two revisions.
    fn merge_base(&self, a: &Revision, b: &Revision) -> Result<Option<Revision>, TreeError>;

    /// "Name <email>" of the configured user, if any.
    fn user_identity(&self) -> Option<String>;
}

/// Reject paths that cannot be stored as nested tree entries.
pub(crate) fn check_path(path: &str) -> Result<(), TreeError> {
    if path.is_empty()
        || path.starts_with('/')
        || path.ends_with('/')
        || path.split('/').any(|c| c.is_empty() || c == "." || c == "..")
    {
        return Err(TreeError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_path() {
        assert!(check_path("active/index").is_ok());
        assert!(check_path("index").is_ok());
        assert!(check_path("").is_err());
        assert!(check_path("/abs").is_err());
        assert!(check_path("a//b").is_err());
        assert!(check_path("a/../b").is_err());
        assert!(check_path("dir/").is_err());
    }

    #[test]
    fn test_top_level_entry() {
        let entry = TreeEntry {
            mode: 0o040000,
            kind: EntryKind::Tree,
            hash: "0".repeat(40),
            path: "active".to_string(),
        };
        assert!(entry.is_top_level());
        let nested = TreeEntry {
            path: "active/index".to_string(),
            kind: EntryKind::Blob,
            mode: 0o100644,
            ..entry
        };
        assert!(!nested.is_top_level());
    }
}
