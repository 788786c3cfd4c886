//! Folder index mapping short local numbers to global ticket IDs.
//!
//! Stored as `<folder>/index`, one `local_id<TAB>ticket_id` line per ticket
//! in assignment order. The next number is derived from the last line, so
//! the file is the only source of truth for numbering.

use crate::id::{TicketId, TicketKey};
use std::fmt;

/// Index file name inside each folder.
pub const INDEX_FILE: &str = "index";

/// One line of the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    pub local_id: u64,
    pub ticket: TicketId,
}

impl Entry {
    pub fn new(local_id: u64, ticket: impl Into<TicketId>) -> Self {
        Self {
            local_id,
            ticket: ticket.into(),
        }
    }

    /// The serialized line, without the trailing newline.
    pub fn to_line(&self) -> String {
        format!("{}\t{}", self.local_id, self.ticket)
    }

    fn parse_line(line: &str) -> Result<Self, String> {
        let (num, id) = line
            .split_once('\t')
            .ok_or_else(|| "missing tab separator".to_string())?;
        let local_id = num
            .parse::<u64>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("'{}' is not a positive number", num))?;
        if id.is_empty() || id.chars().any(|c| c.is_whitespace()) {
            return Err(format!("'{}' is not a valid ticket id", id));
        }
        Ok(Self::new(local_id, TicketId::new(id)))
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.local_id, self.ticket)
    }
}

/// A malformed index line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line number
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

impl std::error::Error for ParseError {}

/// No local number is left after `last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumbersExhausted {
    pub last: u64,
}

impl fmt::Display for NumbersExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no local number left after #{}", self.last)
    }
}

impl std::error::Error for NumbersExhausted {}

pub(crate) fn next_after(last: u64) -> Result<u64, NumbersExhausted> {
    last.checked_add(1).ok_or(NumbersExhausted { last })
}

/// Outcome of `NumberMap::append`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Append {
    /// A new number was assigned.
    Assigned(Entry),
    /// The ticket was already in the map; nothing changed.
    AlreadyMapped(Entry),
}

impl Append {
    pub fn entry(&self) -> &Entry {
        match self {
            Append::Assigned(e) | Append::AlreadyMapped(e) => e,
        }
    }
}

/// Ordered local number → ticket ID index for one folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumberMap {
    entries: Vec<Entry>,
}

impl NumberMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the serialized index. Blank lines are skipped; local numbers
    /// must be strictly increasing.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut entries = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry = Entry::parse_line(line).map_err(|reason| ParseError { line: idx + 1, reason })?;
            if let Some(prev) = entries.last().map(|e: &Entry| e.local_id)
                && entry.local_id <= prev
            {
                return Err(ParseError {
                    line: idx + 1,
                    reason: format!("#{} does not follow #{}", entry.local_id, prev),
                });
            }
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    /// Build a map from entries already in ascending order.
    pub(crate) fn from_sorted(entries: Vec<Entry>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].local_id < w[1].local_id));
        Self { entries }
    }

    /// Serialized form: one line per entry, each newline-terminated.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_line());
            out.push('\n');
        }
        out
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Local number of the last line, or 0 for an empty map.
    pub fn last_local_id(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.local_id)
    }

    /// First entry matching `key`, in file order.
    pub fn lookup(&self, key: &TicketKey) -> Option<&Entry> {
        match key {
            TicketKey::Local(n) => self.entries.iter().find(|e| e.local_id == *n),
            TicketKey::Global(id) => self.find_ticket(id),
        }
    }

    pub fn find_ticket(&self, id: &TicketId) -> Option<&Entry> {
        self.entries.iter().find(|e| &e.ticket == id)
    }

    /// The number `append` would assign next.
    pub fn next_local_id(&self) -> Result<u64, NumbersExhausted> {
        next_after(self.last_local_id())
    }

    /// Assign the next number to `ticket`.
    ///
    /// A ticket that is already mapped keeps its number.
    pub fn append(&mut self, ticket: TicketId) -> Result<Append, NumbersExhausted> {
        if let Some(existing) = self.find_ticket(&ticket) {
            return Ok(Append::AlreadyMapped(existing.clone()));
        }
        let entry = Entry::new(self.next_local_id()?, ticket);
        self.entries.push(entry.clone());
        Ok(Append::Assigned(entry))
    }
}
