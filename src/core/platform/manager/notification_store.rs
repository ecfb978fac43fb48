/*
Notification Store

The client-side cache of notifications for the signed-in identity and the only
mutable state shared by the pipeline. Every mutation path goes through the methods
below:

- replace_from_fetch: authoritative snapshot from the REST list; the server wins
- push_live: idempotent insert at the head, keyed by id; first delivery wins
- begin_mark_read / rollback_mark_read: optimistic read-state changes, reserved for
  the Read State Coordinator
- reset: clears the store when the identity signs out

The unread count is never stored. It is recomputed from the records on demand, so
it cannot drift from the records it describes.

Each snapshot replacement starts a new generation. A rollback carries the generation
it was started in and is skipped once a newer snapshot has landed, because the
server's view of that record is now authoritative.
*/

use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};
use tokio::sync::watch;

use crate::core::platform::container::notification::{NotificationId, NotificationRecord};

/// Proof that an optimistic read was applied, needed to undo it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadTicket {
    generation: u64,
    prior: bool,
}

/// Result of trying to flip a record to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkReadStart {
    NotFound,
    AlreadyRead,
    Applied(ReadTicket),
}

#[derive(Debug, Default)]
struct StoreState {
    /// Newest first
    records: Vec<NotificationRecord>,
    generation: u64,
    revision: u64,
}

impl StoreState {
    fn position(&self, id: &NotificationId) -> Option<usize> {
        self.records.iter().position(|record| &record.id == id)
    }
}

#[derive(Debug)]
pub struct NotificationStore {
    state: RwLock<StoreState>,
    changes: watch::Sender<u64>,
}

impl NotificationStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: RwLock::new(StoreState::default()),
            changes,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &mut StoreState) {
        state.revision += 1;
        self.changes.send_replace(state.revision);
    }

    /// Replace the contents with an authoritative server snapshot
    pub fn replace_from_fetch(&self, server_list: Vec<NotificationRecord>) {
        let mut seen = HashSet::with_capacity(server_list.len());
        let mut records: Vec<NotificationRecord> = server_list
            .into_iter()
            .filter(|record| seen.insert(record.id.clone()))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut state = self.write();
        state.records = records;
        state.generation += 1;
        self.publish(&mut state);
    }

    /// Insert a live record at the head; returns false if the id is already present
    pub fn push_live(&self, record: NotificationRecord) -> bool {
        let mut state = self.write();
        if state.position(&record.id).is_some() {
            return false;
        }
        state.records.insert(0, record);
        self.publish(&mut state);
        true
    }

    pub fn unread_count(&self) -> usize {
        self.read().records.iter().filter(|record| !record.is_read).count()
    }

    /// Records newest first
    pub fn snapshot(&self) -> Vec<NotificationRecord> {
        self.read().records.clone()
    }

    pub fn get(&self, id: &NotificationId) -> Option<NotificationRecord> {
        let state = self.read();
        state.position(id).map(|index| state.records[index].clone())
    }

    pub fn unread_ids(&self) -> Vec<NotificationId> {
        self.read()
            .records
            .iter()
            .filter(|record| !record.is_read)
            .map(|record| record.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    /// Snapshot generation; bumped by every replace and reset
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Receiver that changes whenever the visible contents change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Drop everything; only used when the identity signs out
    pub fn reset(&self) {
        let mut state = self.write();
        state.records.clear();
        state.generation += 1;
        self.publish(&mut state);
    }

    pub(crate) fn begin_mark_read(&self, id: &NotificationId) -> MarkReadStart {
        let mut state = self.write();
        let Some(index) = state.position(id) else {
            return MarkReadStart::NotFound;
        };
        if state.records[index].is_read {
            return MarkReadStart::AlreadyRead;
        }

        state.records[index].is_read = true;
        let ticket = ReadTicket {
            generation: state.generation,
            prior: false,
        };
        self.publish(&mut state);
        MarkReadStart::Applied(ticket)
    }

    /// Undo an optimistic read; returns whether anything was reverted
    pub(crate) fn rollback_mark_read(&self, id: &NotificationId, ticket: ReadTicket) -> bool {
        let mut state = self.write();
        if state.generation != ticket.generation {
            return false;
        }
        let Some(index) = state.position(id) else {
            return false;
        };
        if state.records[index].is_read == ticket.prior {
            return false;
        }

        state.records[index].is_read = ticket.prior;
        self.publish(&mut state);
        true
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}
