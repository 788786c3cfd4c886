//! Three-way reconciliation of folder number maps.
//!
//! Both sides are diffed against their common ancestor. Entries that
//! survive on both sides keep their numbers; new tickets from the side
//! with precedence keep theirs where possible, and the other side's new
//! tickets are renumbered past anything already placed.

use crate::id::TicketId;
use crate::numbermap::{Entry, NumberMap, NumbersExhausted, next_after};
use similar::{ChangeTag, TextDiff};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// One side of a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Local,
    Remote,
}

impl Side {
    fn adverb(self) -> &'static str {
        match self {
            Side::Local => "locally",
            Side::Remote => "remotely",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => write!(f, "local"),
            Side::Remote => write!(f, "remote"),
        }
    }
}

/// Whose existing numbers survive a collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precedence {
    KeepLocal,
    KeepRemote,
}

impl Precedence {
    pub fn from_keep_local(keep_local: bool) -> Self {
        if keep_local {
            Precedence::KeepLocal
        } else {
            Precedence::KeepRemote
        }
    }

    /// (first, second): second's changes are applied after first's.
    pub fn order(self) -> (Side, Side) {
        match self {
            Precedence::KeepLocal => (Side::Local, Side::Remote),
            Precedence::KeepRemote => (Side::Remote, Side::Local),
        }
    }
}

/// A line of the merge log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeNote {
    Removed { side: Side, entry: Entry },
    Added { side: Side, entry: Entry },
    Renumbered { side: Side, entry: Entry, previous: u64 },
}

impl fmt::Display for MergeNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeNote::Removed { side, entry } => write!(f, "Removed {}: {}", side.adverb(), entry),
            MergeNote::Added { side, entry } => write!(f, "Added {}: {}", side.adverb(), entry),
            MergeNote::Renumbered { side, entry, previous } => write!(
                f,
                "Added {}: #{} [changed from #{}] ({})",
                side.adverb(),
                entry.local_id,
                previous,
                entry.ticket
            ),
        }
    }
}

/// Lines one side added and removed relative to the ancestor, in diff order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideChanges {
    pub additions: Vec<Entry>,
    pub removals: Vec<Entry>,
    added_at: HashMap<TicketId, usize>,
    removed: HashSet<TicketId>,
}

impl SideChanges {
    pub fn between(ancestor: &NumberMap, side: &NumberMap) -> Self {
        let old_text = ancestor.serialize();
        let new_text = side.serialize();
        let old_lines = lines_by_text(ancestor);
        let new_lines = lines_by_text(side);

        let mut changes = SideChanges::default();
        let diff = TextDiff::from_lines(&old_text, &new_text);
        for change in diff.iter_all_changes() {
            let line = change.value().trim_end_matches('\n');
            match change.tag() {
                ChangeTag::Insert => {
                    if let Some(entry) = new_lines.get(line) {
                        changes.push_addition((*entry).clone());
                    }
                }
                ChangeTag::Delete => {
                    if let Some(entry) = old_lines.get(line) {
                        changes.removed.insert(entry.ticket.clone());
                        changes.removals.push((*entry).clone());
                    }
                }
                ChangeTag::Equal => {}
            }
        }
        changes
    }

    fn push_addition(&mut self, entry: Entry) {
        self.added_at.entry(entry.ticket.clone()).or_insert(self.additions.len());
        self.additions.push(entry);
    }

    fn added(&self, ticket: &TicketId) -> Option<&Entry> {
        self.added_at.get(ticket).and_then(|&idx| self.additions.get(idx))
    }

    /// Removed and not re-added under another number.
    fn dropped(&self, ticket: &TicketId) -> bool {
        self.removed.contains(ticket) && !self.added_at.contains_key(ticket)
    }
}

/// Serialized line to entry. Lines are unique because numbers are.
fn lines_by_text(map: &NumberMap) -> HashMap<String, &Entry> {
    map.entries().iter().map(|e| (e.to_line(), e)).collect()
}

/// The three maps of one folder taking part in a pull.
#[derive(Debug, Clone, Default)]
pub struct MergeSnapshot {
    pub ancestor: NumberMap,
    pub local: NumberMap,
    pub remote: NumberMap,
}

/// Result of reconciling a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub map: NumberMap,
    pub notes: Vec<MergeNote>,
    /// Side whose changes were applied first.
    pub first: Side,
    pub second: Side,
}

impl MergeOutcome {
    /// Human-readable log, one note per line.
    pub fn log(&self) -> String {
        let mut out = String::new();
        for note in &self.notes {
            out.push_str(&note.to_string());
            out.push('\n');
        }
        out
    }
}

/// Accumulates the merged map.
struct Placement {
    entries: Vec<Entry>,
    used_ids: HashSet<u64>,
    tickets: HashSet<TicketId>,
    last_local_id: u64,
}

impl Placement {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            used_ids: HashSet::new(),
            tickets: HashSet::new(),
            last_local_id: 0,
        }
    }

    fn place(&mut self, entry: Entry) {
        self.used_ids.insert(entry.local_id);
        self.tickets.insert(entry.ticket.clone());
        self.last_local_id = self.last_local_id.max(entry.local_id);
        self.entries.push(entry);
    }

    fn into_map(mut self) -> NumberMap {
        self.entries.sort_by_key(|e| e.local_id);
        NumberMap::from_sorted(self.entries)
    }
}

impl MergeSnapshot {
    pub fn new(ancestor: NumberMap, local: NumberMap, remote: NumberMap) -> Self {
        Self {
            ancestor,
            local,
            remote,
        }
    }

    fn changes(&self, side: Side) -> SideChanges {
        match side {
            Side::Local => SideChanges::between(&self.ancestor, &self.local),
            Side::Remote => SideChanges::between(&self.ancestor, &self.remote),
        }
    }

    /// Compute the merged map and its log.
    ///
    /// Fails only when a renumbered ticket would need a number past
    /// `u64::MAX`.
    pub fn reconcile(&self, precedence: Precedence) -> Result<MergeOutcome, NumbersExhausted> {
        let (first, second) = precedence.order();
        let first_changes = self.changes(first);
        let second_changes = self.changes(second);

        let ancestor_tickets: HashSet<&TicketId> = self.ancestor.entries().iter().map(|e| &e.ticket).collect();

        let mut notes = Vec::new();
        let mut placed = Placement::new();

        // Surviving ancestor entries. A side that moved an entry to a new
        // number did not remove it; first's number wins.
        for entry in self.ancestor.entries() {
            let removed_by: Vec<Side> = [(first, &first_changes), (second, &second_changes)]
                .into_iter()
                .filter(|(_, changes)| changes.dropped(&entry.ticket))
                .map(|(side, _)| side)
                .collect();
            if !removed_by.is_empty() {
                for side in removed_by {
                    notes.push(MergeNote::Removed {
                        side,
                        entry: entry.clone(),
                    });
                }
                continue;
            }
            if placed.tickets.contains(&entry.ticket) {
                continue;
            }
            let local_id = first_changes
                .added(&entry.ticket)
                .map_or(entry.local_id, |moved| moved.local_id);
            placed.place(Entry::new(local_id, entry.ticket.clone()));
        }

        for (side, changes) in [(first, &first_changes), (second, &second_changes)] {
            let mut renumbering = false;
            for addition in &changes.additions {
                if ancestor_tickets.contains(&addition.ticket) || placed.tickets.contains(&addition.ticket) {
                    continue;
                }
                if !renumbering && !placed.used_ids.contains(&addition.local_id) {
                    placed.place(addition.clone());
                    notes.push(MergeNote::Added {
                        side,
                        entry: addition.clone(),
                    });
                } else {
                    renumbering = true;
                    let entry = Entry::new(next_after(placed.last_local_id)?, addition.ticket.clone());
                    placed.place(entry.clone());
                    notes.push(MergeNote::Renumbered {
                        side,
                        entry,
                        previous: addition.local_id,
                    });
                }
            }
        }

        Ok(MergeOutcome {
            map: placed.into_map(),
            notes,
            first,
            second,
        })
    }
}
