//! libgit2-backed tree: tickets live on a branch that is never checked out.

use crate::tree::{EntryKind, Revision, TreeEntry, TreeError, VersionedTree, check_path};
use git2::build::TreeUpdateBuilder;
use git2::{Commit, ErrorCode, FileMode, ObjectType, Oid, Repository, Signature, TreeWalkMode, TreeWalkResult};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Where `fetch` leaves the remote tip.
const FETCHED_PREFIX: &str = "refs/git-tkt/fetched/";

/// Fallback committer when the repository has no user configured.
const FALLBACK_NAME: &str = "git-tkt";
const FALLBACK_EMAIL: &str = "git-tkt@localhost";

#[derive(Default)]
struct Staged {
    base: Option<Oid>,
    writes: BTreeMap<String, Vec<u8>>,
}

/// A `VersionedTree` over a git repository.
pub struct GitTree {
    repo: Repository,
    staged: HashMap<String, Staged>,
}

fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

fn not_found<T>(result: Result<T, git2::Error>) -> Result<Option<T>, TreeError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remote arguments that are URLs or paths rather than configured names.
fn looks_like_location(remote: &str) -> bool {
    remote.contains(':') || remote.contains('/') || Path::new(remote).exists()
}

impl GitTree {
    /// Open the repository containing `path`.
    pub fn open(path: &Path) -> Result<Self, TreeError> {
        let repo = Repository::discover(path)?;
        Ok(Self::from_repository(repo))
    }

    /// Create a new repository at `path`.
    pub fn init(path: &Path) -> Result<Self, TreeError> {
        let repo = Repository::init(path)?;
        Ok(Self::from_repository(repo))
    }

    pub fn from_repository(repo: Repository) -> Self {
        Self {
            repo,
            staged: HashMap::new(),
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// The `.git` directory.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    fn tip(&self, refname: &str) -> Result<Option<Oid>, TreeError> {
        not_found(self.repo.refname_to_id(refname))
    }

    fn find_commit(&self, rev: &Revision) -> Result<Commit<'_>, TreeError> {
        Oid::from_str(rev.as_str())
            .and_then(|oid| self.repo.find_commit(oid))
            .map_err(|_| TreeError::RevisionNotFound(rev.to_string()))
    }

    fn signature(&self) -> Result<Signature<'static>, TreeError> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig),
            Err(_) => Ok(Signature::now(FALLBACK_NAME, FALLBACK_EMAIL)?),
        }
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

        let refname = branch_ref(branch);
        let tip = self.tip(&refname)?;
        if !staged.writes.is_empty() && staged.base != tip {
            return Err(TreeError::RefUpdateRejected(branch.to_string()));
        }

        let parent = tip.map(|oid| self.repo.find_commit(oid)).transpose()?;
        let baseline = match &parent {
            Some(commit) => commit.tree()?,
            None => {
                let empty = self.repo.treebuilder(None)?.write()?;
                self.repo.find_tree(empty)?
            }
        };

        let mut update = TreeUpdateBuilder::new();
        for (path, data) in &staged.writes {
            let oid = self.repo.blob(data)?;
            update.upsert(path.as_str(), oid, FileMode::Blob);
        }
        let tree_oid = update.create_updated(&self.repo, &baseline)?;
        let tree = self.repo.find_tree(tree_oid)?;

        let other_commit = other.map(|rev| self.find_commit(rev)).transpose()?;
        let parents: Vec<&Commit<'_>> = parent.iter().chain(other_commit.iter()).collect();

        let sig = self.signature()?;
        let oid = self
            .repo
            .commit(Some(refname.as_str()), &sig, &sig, message, &tree, &parents)
            .map_err(|e| match e.code() {
                // The ref moved under us between resolve and update.
                ErrorCode::Modified => TreeError::RefUpdateRejected(branch.to_string()),
                _ => TreeError::Git(e),
            })?;

        log::debug!("committed {} on {}: {}", oid, branch, message);
        Ok(Revision::new(oid.to_string()))
    }
}

impl VersionedTree for GitTree {
    fn resolve(&self, branch: &str) -> Result<Option<Revision>, TreeError> {
        Ok(self.tip(&branch_ref(branch))?.map(|oid| Revision::new(oid.to_string())))
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
        let tree = self.find_commit(rev)?.tree()?;
        let Some(entry) = not_found(tree.get_path(Path::new(path)))? else {
            return Ok(None);
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }
        let blob = self.repo.find_blob(entry.id())?;
        Ok(Some(blob.content().to_vec()))
    }

    fn write(&mut self, branch: &str, path: &str, data: &[u8]) -> Result<(), TreeError> {
        check_path(path)?;
        let tip = self.tip(&branch_ref(branch))?;
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
        let tree = self.find_commit(rev)?.tree()?;
        let mut entries = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            let kind = match entry.kind() {
                Some(ObjectType::Tree) => EntryKind::Tree,
                Some(ObjectType::Blob) => EntryKind::Blob,
                _ => return TreeWalkResult::Skip,
            };
            entries.push(TreeEntry {
                mode: entry.filemode() as u32,
                kind,
                hash: entry.id().to_string(),
                path: format!("{}{}", root, entry.name().unwrap_or_default()),
            });
            TreeWalkResult::Ok
        })?;
        Ok(entries)
    }

    fn fetch(&mut self, remote: &str, branch: &str) -> Result<Revision, TreeError> {
        let staging = format!("{}{}", FETCHED_PREFIX, branch);
        // A stale staging ref would hide a missing remote branch.
        if let Some(mut stale) = not_found(self.repo.find_reference(&staging))? {
            stale.delete()?;
        }

        let mut handle = match self.repo.find_remote(remote) {
            Ok(r) => r,
            Err(_) if looks_like_location(remote) => self.repo.remote_anonymous(remote)?,
            Err(_) => return Err(TreeError::RemoteNotFound(remote.to_string())),
        };

        let cfg = self.repo.config().ok();
        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(move |url, username_from_url, allowed| {
            if allowed.is_ssh_key()
                && let Some(user) = username_from_url
            {
                return git2::Cred::ssh_key_from_agent(user);
            }
            if allowed.is_user_pass_plaintext()
                && let Some(ref cfg) = cfg
                && let Ok(cred) = git2::Cred::credential_helper(cfg, url, username_from_url)
            {
                return Ok(cred);
            }
            git2::Cred::default()
        });
        let mut fo = git2::FetchOptions::new();
        fo.remote_callbacks(callbacks);

        let refspec = format!("+refs/heads/{}:{}", branch, staging);
        handle.fetch(&[refspec.as_str()], Some(&mut fo), None)?;

        let tip = self.tip(&staging)?.ok_or_else(|| TreeError::RemoteBranchNotFound {
            remote: remote.to_string(),
            branch: branch.to_string(),
        })?;
        log::info!("fetched {}/{} at {}", remote, branch, tip);
        Ok(Revision::new(tip.to_string()))
    }

    fn merge_base(&self, a: &Revision, b: &Revision) -> Result<Option<Revision>, TreeError> {
        let a = self.find_commit(a)?.id();
        let b = self.find_commit(b)?.id();
        Ok(not_found(self.repo.merge_base(a, b))?.map(|oid| Revision::new(oid.to_string())))
    }

    fn user_identity(&self) -> Option<String> {
        let cfg = self.repo.config().ok()?;
        let name = cfg.get_string("user.name").ok()?;
        let email = cfg.get_string("user.email").ok()?;
        Some(format!("{} <{}>", name, email))
    }
}
