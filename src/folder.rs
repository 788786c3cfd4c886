//! A named folder of tickets on the ticket branch.

use crate::id::{TicketId, TicketKey};
use crate::numbermap::{Append, INDEX_FILE, NumberMap};
use crate::store::StoreError;
use crate::tree::{Revision, VersionedTree};
use crate::types::{FieldMap, Listing, StoredRecord, Ticket, validate_folder};
use chrono::{SecondsFormat, Utc};
use log::{debug, info};

pub(crate) fn index_path(folder: &str) -> String {
    format!("{}/{}", folder, INDEX_FILE)
}

pub(crate) fn record_path(folder: &str, ticket: &TicketId) -> String {
    format!("{}/{}", folder, ticket)
}

pub(crate) fn parse_index(path: &str, bytes: Option<Vec<u8>>) -> Result<NumberMap, StoreError> {
    let Some(bytes) = bytes else {
        return Ok(NumberMap::new());
    };
    let text = String::from_utf8(bytes).map_err(|e| StoreError::corrupt(path, e))?;
    NumberMap::parse(&text).map_err(|e| StoreError::corrupt(path, e))
}

fn parse_record(path: &str, bytes: &[u8]) -> Result<StoredRecord, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::corrupt(path, e))
}

fn encode_record(path: &str, record: &StoredRecord) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(record).map_err(|e| StoreError::corrupt(path, e))
}

/// Read a folder's number map as of `rev`.
pub(crate) fn index_at<T: VersionedTree>(tree: &T, rev: &Revision, folder: &str) -> Result<NumberMap, StoreError> {
    let path = index_path(folder);
    parse_index(&path, tree.read_at(rev, &path)?)
}

/// Handle on one folder. Caches the folder's number map after first use.
#[derive(Debug, Clone)]
pub struct Folder {
    name: String,
    map: Option<NumberMap>,
}

impl Folder {
    pub fn new(name: &str) -> Result<Self, StoreError> {
        validate_folder(name)?;
        Ok(Self {
            name: name.to_string(),
            map: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drop the cached number map so the next access re-reads it.
    pub fn invalidate(&mut self) {
        self.map = None;
    }

    /// The folder's number map, loading it on first use.
    pub fn number_map<T: VersionedTree>(&mut self, tree: &T, branch: &str) -> Result<&NumberMap, StoreError> {
        if self.map.is_none() {
            let path = index_path(&self.name);
            let map = parse_index(&path, tree.read(branch, &path)?)?;
            debug!("Loaded index for folder {} ({} entries)", self.name, map.len());
            self.map = Some(map);
        }
        Ok(self.map.get_or_insert_with(NumberMap::new))
    }

    /// Store a new ticket and number it in a single commit.
    pub fn add<T: VersionedTree>(&mut self, tree: &mut T, branch: &str, fields: FieldMap) -> Result<Ticket, StoreError> {
        let mut map = self.number_map(tree, branch)?.clone();
        let id = TicketId::generate();
        let entry = map
            .append(id.clone())
            .map_err(|e| StoreError::corrupt(&index_path(&self.name), e))?
            .entry()
            .clone();

        let record = StoredRecord {
            creation_date: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            fields,
        };
        let path = record_path(&self.name, &id);
        let message = format!("Added ticket {} as #{}", id, entry.local_id);

        let result = encode_record(&path, &record).and_then(|data| {
            tree.write(branch, &path, &data)?;
            tree.write(branch, &index_path(&self.name), map.serialize().as_bytes())?;
            Ok(tree.commit(branch, &message)?)
        });
        self.finish(tree, branch, result)?;
        self.map = Some(map);

        info!("{} in folder {}", message, self.name);
        Ok(Ticket {
            id,
            num: entry.local_id,
            creation_date: record.creation_date,
            fields: record.fields,
        })
    }

    /// Number an existing ticket. Already-numbered tickets are left alone.
    pub fn append<T: VersionedTree>(&mut self, tree: &mut T, branch: &str, ticket: TicketId) -> Result<Append, StoreError> {
        let mut map = self.number_map(tree, branch)?.clone();
        let outcome = map
            .append(ticket)
            .map_err(|e| StoreError::corrupt(&index_path(&self.name), e))?;
        let Append::Assigned(entry) = &outcome else {
            debug!("{} already numbered in folder {}", outcome.entry(), self.name);
            return Ok(outcome);
        };

        let message = format!("Numbered ticket {} as #{}", entry.ticket, entry.local_id);
        let result = tree
            .write(branch, &index_path(&self.name), map.serialize().as_bytes())
            .and_then(|()| tree.commit(branch, &message))
            .map_err(StoreError::from);
        self.finish(tree, branch, result)?;
        self.map = Some(map);

        info!("{} in folder {}", message, self.name);
        Ok(outcome)
    }

    pub fn get<T: VersionedTree>(&mut self, tree: &T, branch: &str, key: &TicketKey) -> Result<Ticket, StoreError> {
        let entry = self
            .number_map(tree, branch)?
            .lookup(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{} in folder {}", key, self.name)))?;

        let path = record_path(&self.name, &entry.ticket);
        let bytes = tree
            .read(branch, &path)?
            .ok_or_else(|| StoreError::corrupt(&path, format!("no record for {}", entry)))?;
        let record = parse_record(&path, &bytes)?;
        let mut fields = record.fields;
        fields.strip_reserved();

        Ok(Ticket {
            id: entry.ticket,
            num: entry.local_id,
            creation_date: record.creation_date,
            fields,
        })
    }

    /// Replace a ticket's fields, keeping its IDs and creation date.
    pub fn save<T: VersionedTree>(&mut self, tree: &mut T, branch: &str, ticket: &Ticket) -> Result<(), StoreError> {
        let path = record_path(&self.name, &ticket.id);
        let record = StoredRecord {
            creation_date: ticket.creation_date.clone(),
            fields: ticket.fields.clone(),
        };
        let message = format!("Edited ticket {} (#{})", ticket.id, ticket.num);

        let result = encode_record(&path, &record).and_then(|data| {
            tree.write(branch, &path, &data)?;
            Ok(tree.commit(branch, &message)?)
        });
        self.finish(tree, branch, result)?;

        info!("{} in folder {}", message, self.name);
        Ok(())
    }

    pub fn list<T: VersionedTree>(&mut self, tree: &T, branch: &str) -> Result<Listing, StoreError> {
        let entries = self.number_map(tree, branch)?.entries().to_vec();
        if entries.is_empty() {
            return Ok(Listing::Empty);
        }
        let tickets = entries
            .iter()
            .map(|entry| self.get(tree, branch, &TicketKey::Global(entry.ticket.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Listing::Tickets(tickets))
    }

    /// Discard staged writes when a commit did not happen.
    fn finish<T: VersionedTree, R>(&mut self, tree: &mut T, branch: &str, result: Result<R, StoreError>) -> Result<R, StoreError> {
        if result.is_err() {
            tree.discard(branch);
            self.invalidate();
        }
        result
    }
}
