//! In-memory content-addressed tree.
//!
//! Objects are keyed by the SHA-256 of their content, so two trees that
//! share history (one was cloned from the other) agree on every hash and
//! can compute merge bases against each other after a fetch.

use crate::tree::{EntryKind, Revision, TreeEntry, TreeError, VersionedTree, check_path};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

const HEADS_PREFIX: &str = "refs/heads/";
const FETCHED_PREFIX: &str = "refs/git-tkt/fetched/";

#[derive(Debug, Clone)]
struct CommitObject {
    /// path -> blob hash
    tree: BTreeMap<String, String>,
    parents: Vec<String>,
    message: String,
}

#[derive(Debug, Clone, Default)]
struct Staged {
    /// Tip of the branch when the first write was staged
    base: Option<String>,
    writes: BTreeMap<String, Vec<u8>>,
}

/// A `VersionedTree` held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    blobs: HashMap<String, Vec<u8>>,
    commits: HashMap<String, CommitObject>,
    refs: HashMap<String, String>,
    staged: HashMap<String, Staged>,
    remotes: HashMap<String, MemoryTree>,
    identity: Option<String>,
}

fn blob_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("blob {}\0", data.len()).as_bytes());
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn commit_hash(commit: &CommitObject) -> String {
    let mut hasher = Sha256::new();
    for (path, hash) in &commit.tree {
        hasher.update(path.as_bytes());
        hasher.update(b"\t");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    for parent in &commit.parents {
        hasher.update(b"parent ");
        hasher.update(parent.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"\n");
    hasher.update(commit.message.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identity reported by `user_identity`.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Register a snapshot of `peer` as a fetchable remote.
    pub fn add_remote(&mut self, name: &str, peer: &MemoryTree) {
        let mut snapshot = peer.clone();
        snapshot.remotes.clear();
        snapshot.staged.clear();
        self.remotes.insert(name.to_string(), snapshot);
    }

    fn commit_object(&self, rev: &Revision) -> Result<&CommitObject, TreeError> {
        self.commits
            .get(rev.as_str())
            .ok_or_else(|| TreeError::RevisionNotFound(rev.to_string()))
    }

    fn ref_tip(&self, refname: &str) -> Option<&String> {
        self.refs.get(refname)
    }

    fn make_commit(
        &mut self,
        branch: &str,
        message: &str,
        other: Option<&Revision>,
        allow_empty: bool,
    ) -> Result<Revision, TreeError> {
        let staged = self.staged.remove(branch).unwrap_or_default();
        if staged.writes.is_empty() && !allow_empty {
            return Err(TreeError::NothingStaged(branch.to_string()));
        }

        let refname = format!("{}{}", HEADS_PREFIX, branch);
        let tip = self.ref_tip(&refname).cloned();
        if !staged.writes.is_empty() && staged.base != tip {
            return Err(TreeError::RefUpdateRejected(branch.to_string()));
        }

        let mut tree = match &tip {
            Some(hash) => self.commit_object(&Revision::new(hash.clone()))?.tree.clone(),
            None => BTreeMap::new(),
        };
        for (path, data) in staged.writes {
            let hash = blob_hash(&data);
            self.blobs.entry(hash.clone()).or_insert(data);
            tree.insert(path, hash);
        }

        let mut parents: Vec<String> = tip.into_iter().collect();
        if let Some(other) = other {
            self.commit_object(other)?;
            parents.push(other.as_str().to_string());
        }

        let commit = CommitObject {
            tree,
            parents,
            message: message.to_string(),
        };
        let hash = commit_hash(&commit);
        self.commits.insert(hash.clone(), commit);
        self.refs.insert(refname, hash.clone());
        Ok(Revision::new(hash))
    }

    /// All ancestors of `start` (inclusive), nearest first.
    fn ancestry(&self, start: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(hash) = queue.pop_front() {
            if !seen.insert(hash.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&hash) {
                queue.extend(commit.parents.iter().cloned());
            }
            order.push(hash);
        }
        order
    }
}

impl VersionedTree for MemoryTree {
    fn resolve(&self, branch: &str) -> Result<Option<Revision>, TreeError> {
        Ok(self
            .ref_tip(&format!("{}{}", HEADS_PREFIX, branch))
            .map(|h| Revision::new(h.clone())))
    }

    fn read(&self, branch: &str, path: &str) -> Result<Option<Vec<u8>>, TreeError> {
        if let Some(data) = self.staged.get(branch).and_then(|s| s.writes.get(path)) {
            return Ok(Some(data.clone()));
        }
        match self.resolve(branch)? {
            Some(rev) => self.read_at(&rev, path),
            None => Ok(None),
        }
    }

    fn read_at(&self, rev: &Revision, path: &str) -> Result<Option<Vec<u8>>, TreeError> {
        let commit = self.commit_object(rev)?;
        Ok(commit
            .tree
            .get(path)
            .and_then(|hash| self.blobs.get(hash))
            .cloned())
    }

    fn write(&mut self, branch: &str, path: &str, data: &[u8]) -> Result<(), TreeError> {
        check_path(path)?;
        let tip = self.resolve(branch)?.map(|r| r.as_str().to_string());
        let staged = self.staged.entry(branch.to_string()).or_default();
        if staged.writes.is_empty() {
            staged.base = tip;
        }
        staged.writes.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn commit(&mut self, branch: &str, message: &str) -> Result<Revision, TreeError> {
        self.make_commit(branch, message, None, false)
    }

    fn commit_merge(&mut self, branch: &str, message: &str, other: &Revision) -> Result<Revision, TreeError> {
        self.make_commit(branch, message, Some(other), true)
    }

    fn discard(&mut self, branch: &str) {
        self.staged.remove(branch);
    }

    fn list_tree_at(&self, rev: &Revision) -> Result<Vec<TreeEntry>, TreeError> {
        let commit = self.commit_object(rev)?;

        // Directory hashes are derived from everything beneath them.
        let mut dirs: BTreeMap<String, Sha256> = BTreeMap::new();
        for (path, hash) in &commit.tree {
            let components: Vec<&str> = path.split('/').collect();
            for depth in 1..components.len() {
                let hasher = dirs.entry(components[..depth].join("/")).or_default();
                hasher.update(path.as_bytes());
                hasher.update(hash.as_bytes());
            }
        }

        let mut entries: Vec<TreeEntry> = dirs
            .into_iter()
            .map(|(path, hasher)| TreeEntry {
                mode: 0o040000,
                kind: EntryKind::Tree,
                hash: format!("{:x}", hasher.finalize()),
                path,
            })
            .collect();
        entries.extend(commit.tree.iter().map(|(path, hash)| TreeEntry {
            mode: 0o100644,
            kind: EntryKind::Blob,
            hash: hash.clone(),
            path: path.clone(),
        }));
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn fetch(&mut self, remote: &str, branch: &str) -> Result<Revision, TreeError> {
        let peer = self
            .remotes
            .get(remote)
            .ok_or_else(|| TreeError::RemoteNotFound(remote.to_string()))?;
        let tip = peer
            .ref_tip(&format!("{}{}", HEADS_PREFIX, branch))
            .cloned()
            .ok_or_else(|| TreeError::RemoteBranchNotFound {
                remote: remote.to_string(),
                branch: branch.to_string(),
            })?;

        let blobs: Vec<_> = peer.blobs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let commits: Vec<_> = peer.commits.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for (hash, data) in blobs {
            self.blobs.entry(hash).or_insert(data);
        }
        for (hash, commit) in commits {
            self.commits.entry(hash).or_insert(commit);
        }

        self.refs.insert(format!("{}{}", FETCHED_PREFIX, branch), tip.clone());
        log::debug!("fetched {}/{} at {}", remote, branch, tip);
        Ok(Revision::new(tip))
    }

    fn merge_base(&self, a: &Revision, b: &Revision) -> Result<Option<Revision>, TreeError> {
        self.commit_object(a)?;
        self.commit_object(b)?;
        let from_a: HashSet<String> = self.ancestry(a.as_str()).into_iter().collect();
        Ok(self
            .ancestry(b.as_str())
            .into_iter()
            .find(|hash| from_a.contains(hash))
            .map(Revision::new))
    }

    fn user_identity(&self) -> Option<String> {
        self.identity.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BRANCH: &str = "git-tkt";

    #[test]
    fn test_write_is_staged_until_commit() {
        let mut tree = MemoryTree::new();
        tree.write(BRANCH, "active/index", b"1\ta\n").unwrap();

        assert_eq!(tree.read(BRANCH, "active/index").unwrap(), Some(b"1\ta\n".to_vec()));
        assert!(tree.resolve(BRANCH).unwrap().is_none());

        let rev = tree.commit(BRANCH, "first").unwrap();
        assert_eq!(tree.resolve(BRANCH).unwrap(), Some(rev.clone()));
        assert_eq!(tree.read_at(&rev, "active/index").unwrap(), Some(b"1\ta\n".to_vec()));
    }

    #[test]
    fn test_commit_without_writes_fails() {
        let mut tree = MemoryTree::new();
        assert!(matches!(tree.commit(BRANCH, "empty"), Err(TreeError::NothingStaged(_))));
    }

    #[test]
    fn test_discard_drops_staged_writes() {
        let mut tree = MemoryTree::new();
        tree.write(BRANCH, "a/b", b"x").unwrap();
        tree.discard(BRANCH);
        assert!(tree.read(BRANCH, "a/b").unwrap().is_none());
    }

    #[test]
    fn test_list_tree_includes_directories() {
        let mut tree = MemoryTree::new();
        tree.write(BRANCH, "active/index", b"").unwrap();
        tree.write(BRANCH, "archived/index", b"").unwrap();
        tree.commit(BRANCH, "init").unwrap();

        let entries = tree.list_tree(BRANCH).unwrap();
        let top: Vec<&str> = entries
            .iter()
            .filter(|e| e.is_top_level() && e.kind == EntryKind::Tree)
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(top, vec!["active", "archived"]);
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn test_list_tree_missing_branch() {
        let tree = MemoryTree::new();
        assert!(matches!(tree.list_tree(BRANCH), Err(TreeError::BranchNotFound(_))));
    }

    #[test]
    fn test_fetch_and_merge_base() {
        let mut origin = MemoryTree::new();
        origin.write(BRANCH, "f/index", b"1\ta\n").unwrap();
        let base = origin.commit(BRANCH, "base").unwrap();

        let mut clone = origin.clone();
        clone.write(BRANCH, "f/index", b"1\ta\n2\tc\n").unwrap();
        let local_tip = clone.commit(BRANCH, "local").unwrap();

        origin.write(BRANCH, "f/index", b"1\ta\n2\td\n").unwrap();
        origin.commit(BRANCH, "remote").unwrap();

        clone.add_remote("origin", &origin);
        let fetched = clone.fetch("origin", BRANCH).unwrap();
        assert_eq!(clone.read_at(&fetched, "f/index").unwrap(), Some(b"1\ta\n2\td\n".to_vec()));
        assert_eq!(clone.merge_base(&local_tip, &fetched).unwrap(), Some(base));
    }

    #[test]
    fn test_merge_commit_advances_merge_base() {
        let mut origin = MemoryTree::new();
        origin.write(BRANCH, "f/index", b"").unwrap();
        origin.commit(BRANCH, "base").unwrap();
        let mut clone = origin.clone();

        origin.write(BRANCH, "f/x", b"x").unwrap();
        origin.commit(BRANCH, "remote").unwrap();

        clone.add_remote("origin", &origin);
        let fetched = clone.fetch("origin", BRANCH).unwrap();
        let merged = clone.commit_merge(BRANCH, "merge", &fetched).unwrap();
        assert_eq!(clone.merge_base(&merged, &fetched).unwrap(), Some(fetched));
    }

    #[test]
    fn test_fetch_unknown_remote() {
        let mut tree = MemoryTree::new();
        assert!(matches!(tree.fetch("nope", BRANCH), Err(TreeError::RemoteNotFound(_))));
    }

    #[test]
    fn test_content_addressing() {
        assert_eq!(blob_hash(b"same"), blob_hash(b"same"));
        assert_ne!(blob_hash(b"same"), blob_hash(b"diff"));
        assert_eq!(blob_hash(b"").len(), 64);
    }

    #[test]
    fn test_hashes_are_lowercase_hex() {
        let is_hex = |s: &str| s.len() == 64 && s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'));
        let mut tree = MemoryTree::new();
        tree.write("b", "dir/file", b"content").unwrap();
        let rev = tree.commit("b", "one").unwrap();
        assert!(is_hex(rev.as_str()));
        for entry in tree.list_tree_at(&rev).unwrap() {
            assert!(is_hex(&entry.hash), "{:?}", entry);
        }
    }
}
