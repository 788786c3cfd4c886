//! Shared test infrastructure for git-tkt integration tests.
//!
//! Provides TestEnv helper for consistent test setup/teardown.

#![allow(dead_code)]

use gittkt::{FieldMap, GitTree, PullOptions, PullReport, Store, Ticket, VersionedTree};
use tempfile::TempDir;

pub const BRANCH: &str = "git-tkt";
pub const FOLDER: &str = "active";

/// Test environment with automatic cleanup.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub store: Store<GitTree>,
}

impl TestEnv {
    /// Create a new test environment in a fresh git repository.
    pub fn new() -> Self {
        Self::with_user("Test User", "test@example.com")
    }

    pub fn with_user(name: &str, email: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let tree = GitTree::init(temp_dir.path()).expect("Failed to init repository");
        let mut cfg = tree.repository().config().expect("Failed to open git config");
        cfg.set_str("user.name", name).expect("Failed to set user.name");
        cfg.set_str("user.email", email).expect("Failed to set user.email");
        let store = Store::new(tree, BRANCH);
        Self { temp_dir, store }
    }

    /// A second repository seeded from this one, as a clone would be.
    pub fn clone_env(&self) -> Self {
        let mut env = Self::with_user("Clone User", "clone@example.com");
        if self.store.tree().resolve(BRANCH).expect("Failed to resolve branch").is_some() {
            env.pull_from(self, PullOptions::default());
        }
        env
    }

    /// Filesystem location usable as a fetch remote.
    pub fn location(&self) -> String {
        self.temp_dir.path().to_str().expect("Temp path is not UTF-8").to_string()
    }

    pub fn pull_from(&mut self, other: &TestEnv, options: PullOptions) -> PullReport {
        self.store
            .pull(&other.location(), BRANCH, options)
            .expect("Failed to pull")
    }

    /// Create a ticket with the given name in the default folder.
    pub fn add(&mut self, name: &str) -> Ticket {
        self.add_to(FOLDER, name)
    }

    pub fn add_to(&mut self, folder: &str, name: &str) -> Ticket {
        self.store
            .add(folder, &fields(&[("name", name)]))
            .expect("Failed to add ticket")
    }

    pub fn edit(&mut self, key: &str, pairs: &[(&str, &str)]) -> Ticket {
        self.store
            .edit(FOLDER, key, &fields(pairs))
            .expect("Failed to edit ticket")
    }

    /// (number, name) of every ticket in the default folder.
    pub fn numbered_names(&mut self) -> Vec<(u64, String)> {
        self.store
            .list(FOLDER)
            .expect("Failed to list tickets")
            .tickets()
            .iter()
            .map(|t| (t.num, t.fields.get("name").unwrap_or_default().to_string()))
            .collect()
    }

    /// Raw contents of the folder index on the ticket branch.
    pub fn index_text(&self, folder: &str) -> String {
        let bytes = self
            .store
            .tree()
            .read(BRANCH, &format!("{}/index", folder))
            .expect("Failed to read index")
            .unwrap_or_default();
        String::from_utf8(bytes).expect("Index is not UTF-8")
    }
}

pub fn fields(pairs: &[(&str, &str)]) -> FieldMap {
    pairs.iter().copied().collect()
}

pub fn expected(pairs: &[(u64, &str)]) -> Vec<(u64, String)> {
    pairs.iter().map(|(n, s)| (*n, s.to_string())).collect()
}
