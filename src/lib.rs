//! git-tkt: distributed tickets stored on a git branch.
//!
//! Tickets live as JSON records on a dedicated branch, grouped into
//! folders. Each folder keeps an index giving every ticket a short local
//! number next to its global ID. Pulling from another clone reconciles the
//! indexes with a three-way merge, so numbers stay unique without any
//! central coordination.
//!
//! # Example
//!
//! ```no_run
//! use gittkt::{FieldMap, GitTree, PullOptions, Store};
//! use std::path::Path;
//!
//! let tree = GitTree::open(Path::new(".")).unwrap();
//! let mut store = Store::new(tree, "git-tkt");
//!
//! // Create a ticket; unset fields take their schema defaults
//! let fields: FieldMap = [("name", "Crash on startup")].into_iter().collect();
//! let ticket = store.add("active", &fields).unwrap();
//! assert_eq!(store.get("active", "1").unwrap().id, ticket.id);
//!
//! // Merge another clone's tickets; its new ones are renumbered on collision
//! let report = store.pull("origin", "git-tkt", PullOptions::default()).unwrap();
//! for (folder, outcome) in &report.folders {
//!     print!("{}:\n{}", folder, outcome.log());
//! }
//! ```

mod folder;
mod id;
mod numbermap;
mod store;
mod types;

pub mod config;
pub mod git;
pub mod memory;
pub mod merge;
pub mod schema;
pub mod tree;

// Re-export public API
pub use config::Config;
pub use folder::Folder;
pub use git::GitTree;
pub use id::{MIN_GLOBAL_ID_LEN, TicketId, TicketKey};
pub use memory::MemoryTree;
pub use merge::{MergeNote, MergeOutcome, MergeSnapshot, Precedence, Side};
pub use numbermap::{Append, Entry, INDEX_FILE, NumberMap, NumbersExhausted, ParseError};
pub use schema::{DefaultProvider, FieldSchema, FieldSpec, SchemaError};
pub use store::{PullOptions, PullReport, RecordConflict, Store, StoreError};
pub use tree::{EntryKind, Revision, TreeEntry, TreeError, VersionedTree};
pub use types::{FieldMap, Listing, RESERVED_FIELD_NAMES, StoredRecord, Ticket, ValidationError};
