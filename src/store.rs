//! High-level ticket store API.

use crate::folder::{Folder, index_at, index_path, record_path};
use crate::id::{TicketId, TicketKey};
use crate::merge::{MergeOutcome, MergeSnapshot, Precedence};
use crate::numbermap::{Append, NumberMap};
use crate::schema::FieldSchema;
use crate::tree::{EntryKind, Revision, TreeError, VersionedTree};
use crate::types::{FieldMap, Listing, Ticket, ValidationError};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("ticket not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] TreeError),

    #[error("corrupt data at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("tickets changed on both sides: {}", .tickets.join(", "))]
    MergeConflict { tickets: Vec<String> },
}

impl StoreError {
    pub(crate) fn corrupt(path: &str, reason: impl fmt::Display) -> Self {
        StoreError::Corrupt {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// How `Store::pull` resolves collisions.
///
/// By default local numbers are kept and the remote's new tickets are
/// renumbered, so numbers already handed out in this clone stay valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullOptions {
    /// Keep local numbers and renumber the remote's new tickets
    pub keep_local: bool,
    /// Fail instead of keeping the local side of a diverged record
    pub strict: bool,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            keep_local: true,
            strict: false,
        }
    }
}

/// A ticket record that was edited on both sides of a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordConflict {
    pub folder: String,
    pub ticket: TicketId,
}

impl fmt::Display for RecordConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.folder, self.ticket)
    }
}

/// What a pull did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    /// The merge commit, or `None` when already up to date
    pub revision: Option<Revision>,
    /// Reconciled number map per folder, in folder name order
    pub folders: Vec<(String, MergeOutcome)>,
    /// Records taken from the remote
    pub copied: Vec<(String, TicketId)>,
    /// Records kept at their local version although the remote changed them
    pub conflicts: Vec<RecordConflict>,
}

impl PullReport {
    pub fn is_up_to_date(&self) -> bool {
        self.revision.is_none()
    }
}

/// The ticket store.
pub struct Store<T: VersionedTree> {
    tree: T,
    branch: String,
    schema: FieldSchema,
    folders: BTreeMap<String, Folder>,
}

impl<T: VersionedTree> Store<T> {
    /// Open a store on `branch` with the built-in field schema.
    pub fn new(tree: T, branch: impl Into<String>) -> Self {
        Self {
            tree,
            branch: branch.into(),
            schema: FieldSchema::default(),
            folders: BTreeMap::new(),
        }
    }

    pub fn with_schema(mut self, schema: FieldSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut T {
        &mut self.tree
    }

    fn folder<'a>(folders: &'a mut BTreeMap<String, Folder>, name: &str) -> Result<&'a mut Folder, StoreError> {
        if !folders.contains_key(name) {
            folders.insert(name.to_string(), Folder::new(name)?);
        }
        folders
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(format!("folder {}", name)))
    }

    /// Create a ticket from `fields`, filling schema defaults.
    pub fn add(&mut self, folder: &str, fields: &FieldMap) -> Result<Ticket, StoreError> {
        let identity = self.tree.user_identity();
        let fields = self.schema.resolve_new(fields, identity.as_deref())?;
        let handle = Self::folder(&mut self.folders, folder)?;
        handle.add(&mut self.tree, &self.branch, fields)
    }

    /// Look up a ticket by local number or global ID.
    pub fn get(&mut self, folder: &str, key: &str) -> Result<Ticket, StoreError> {
        let key = TicketKey::parse(key)?;
        let handle = Self::folder(&mut self.folders, folder)?;
        handle.get(&self.tree, &self.branch, &key)
    }

    /// Update editable fields of a ticket. Fields not in `updates` are kept.
    pub fn edit(&mut self, folder: &str, key: &str, updates: &FieldMap) -> Result<Ticket, StoreError> {
        let key = TicketKey::parse(key)?;
        let handle = Self::folder(&mut self.folders, folder)?;
        let mut ticket = handle.get(&self.tree, &self.branch, &key)?;
        ticket.fields = self.schema.apply_edit(&ticket.fields, updates)?;
        handle.save(&mut self.tree, &self.branch, &ticket)?;
        Ok(ticket)
    }

    pub fn list(&mut self, folder: &str) -> Result<Listing, StoreError> {
        let handle = Self::folder(&mut self.folders, folder)?;
        handle.list(&self.tree, &self.branch)
    }

    /// Give an existing ticket ID a number in `folder`.
    pub fn append(&mut self, folder: &str, ticket: TicketId) -> Result<Append, StoreError> {
        let handle = Self::folder(&mut self.folders, folder)?;
        handle.append(&mut self.tree, &self.branch, ticket)
    }

    /// Folder names on the ticket branch, sorted.
    pub fn folders(&self) -> Result<Vec<String>, StoreError> {
        match self.tree.resolve(&self.branch)? {
            Some(rev) => self.folders_at(&rev),
            None => Ok(Vec::new()),
        }
    }

    fn folders_at(&self, rev: &Revision) -> Result<Vec<String>, StoreError> {
        Ok(self
            .tree
            .list_tree_at(rev)?
            .into_iter()
            .filter(|e| e.kind == EntryKind::Tree && e.is_top_level())
            .map(|e| e.path)
            .collect())
    }

    /// Merge `remote_branch` of `remote` into the ticket branch.
    pub fn pull(&mut self, remote: &str, remote_branch: &str, options: PullOptions) -> Result<PullReport, StoreError> {
        let fetched = self.tree.fetch(remote, remote_branch)?;
        let local = self.tree.resolve(&self.branch)?;
        let base = match &local {
            Some(tip) => self.tree.merge_base(tip, &fetched)?,
            None => None,
        };
        debug!(
            "Pulling {}/{} at {}: local {:?}, base {:?}",
            remote, remote_branch, fetched, local, base
        );

        if local.as_ref() == Some(&fetched) || base.as_ref() == Some(&fetched) {
            info!("Already up to date with {}/{}", remote, remote_branch);
            return Ok(PullReport::default());
        }

        let result = self.stage_merge(&fetched, local.as_ref(), base.as_ref(), options);
        let mut report = match result {
            Ok(report) => report,
            Err(e) => {
                self.tree.discard(&self.branch);
                return Err(e);
            }
        };

        if !report.conflicts.is_empty() {
            if options.strict {
                self.tree.discard(&self.branch);
                return Err(StoreError::MergeConflict {
                    tickets: report.conflicts.iter().map(|c| c.to_string()).collect(),
                });
            }
            warn!(
                "Kept local version of {} diverged record(s) pulling from {}/{}",
                report.conflicts.len(),
                remote,
                remote_branch
            );
        }

        let message = format!("Merged tickets from {}/{}", remote, remote_branch);
        let revision = match self.tree.commit_merge(&self.branch, &message, &fetched) {
            Ok(rev) => rev,
            Err(e) => {
                self.tree.discard(&self.branch);
                return Err(e.into());
            }
        };
        self.folders.clear();

        info!("{} as {}", message, revision);
        report.revision = Some(revision);
        Ok(report)
    }

    /// Stage merged indexes and records; commits nothing.
    fn stage_merge(
        &mut self,
        fetched: &Revision,
        local: Option<&Revision>,
        base: Option<&Revision>,
        options: PullOptions,
    ) -> Result<PullReport, StoreError> {
        let mut names: BTreeSet<String> = self.folders_at(fetched)?.into_iter().collect();
        if let Some(local) = local {
            names.extend(self.folders_at(local)?);
        }

        let precedence = Precedence::from_keep_local(options.keep_local);
        let mut report = PullReport::default();
        for name in names {
            let snapshot = MergeSnapshot::new(
                self.index_or_empty(base, &name)?,
                self.index_or_empty(local, &name)?,
                index_at(&self.tree, fetched, &name)?,
            );
            let outcome = snapshot
                .reconcile(precedence)
                .map_err(|e| StoreError::corrupt(&index_path(&name), e))?;
            for note in &outcome.notes {
                info!("{}: {}", name, note);
            }

            for entry in outcome.map.entries() {
                self.merge_record(&name, &entry.ticket, fetched, local, base, &mut report)?;
            }
            if outcome.map != snapshot.local {
                self.tree
                    .write(&self.branch, &index_path(&name), outcome.map.serialize().as_bytes())?;
            }
            report.folders.push((name, outcome));
        }
        Ok(report)
    }

    fn index_or_empty(&self, rev: Option<&Revision>, folder: &str) -> Result<NumberMap, StoreError> {
        match rev {
            Some(rev) => index_at(&self.tree, rev, folder),
            None => Ok(NumberMap::new()),
        }
    }

    /// Bring the remote version of a record over when only the remote
    /// changed it.
    fn merge_record(
        &mut self,
        folder: &str,
        ticket: &TicketId,
        fetched: &Revision,
        local: Option<&Revision>,
        base: Option<&Revision>,
        report: &mut PullReport,
    ) -> Result<(), StoreError> {
        let path = record_path(folder, ticket);
        let Some(theirs) = self.tree.read_at(fetched, &path)? else {
            return Ok(());
        };
        let ours = match local {
            Some(rev) => self.tree.read_at(rev, &path)?,
            None => None,
        };
        let ancestor = match base {
            Some(rev) => self.tree.read_at(rev, &path)?,
            None => None,
        };

        let take_theirs = match &ours {
            None => true,
            Some(ours) if *ours == theirs => false,
            Some(ours) if Some(ours) == ancestor.as_ref() => true,
            Some(_) if ancestor.as_ref() == Some(&theirs) => false,
            Some(_) => {
                report.conflicts.push(RecordConflict {
                    folder: folder.to_string(),
                    ticket: ticket.clone(),
                });
                false
            }
        };
        if take_theirs {
            self.tree.write(&self.branch, &path, &theirs)?;
            report.copied.push((folder.to_string(), ticket.clone()));
        }
        Ok(())
    }
}
