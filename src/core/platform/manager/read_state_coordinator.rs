/*
Read State Coordinator

Marks notifications as read. The store is updated first so the unread badge reacts
at once, then the backend is asked to confirm. A failed confirmation reverts the
record and the error goes back to the caller; it is not retried.

Two calls for the same id collapse into one confirmation: the second finds the
record already read and returns without touching the backend. Different ids are
independent.

Records that only exist on the client (synthetic ids from id-less broadcasts) have
nothing to confirm and are marked locally.
*/

use futures::future::join_all;
use log::{debug, warn};
use std::sync::Arc;

use crate::application::ports::output::notification_port::{NotificationApiPort, NotificationPortError, NotificationPortResult};
use crate::core::platform::container::notification::NotificationId;
use crate::core::platform::manager::notification_store::{MarkReadStart, NotificationStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkReadOutcome {
    /// Marked locally and confirmed by the backend
    Confirmed,
    AlreadyRead,
    NotFound,
    /// Marked locally; the backend does not know this record
    LocalOnly,
}

/// Result of marking every unread record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkAllReadSummary {
    pub confirmed: usize,
    pub local_only: usize,
    pub failed: usize,
    pub first_error: Option<NotificationPortError>,
}

impl MarkAllReadSummary {
    pub fn into_result(self) -> NotificationPortResult<usize> {
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(self.confirmed + self.local_only),
        }
    }
}

pub struct ReadStateCoordinator {
    store: Arc<NotificationStore>,
    api: Arc<dyn NotificationApiPort>,
}

impl ReadStateCoordinator {
    pub fn new(store: Arc<NotificationStore>, api: Arc<dyn NotificationApiPort>) -> Self {
        Self { store, api }
    }

    pub async fn mark_read(&self, id: &NotificationId) -> NotificationPortResult<MarkReadOutcome> {
        let ticket = match self.store.begin_mark_read(id) {
            MarkReadStart::NotFound => return Ok(MarkReadOutcome::NotFound),
            MarkReadStart::AlreadyRead => return Ok(MarkReadOutcome::AlreadyRead),
            MarkReadStart::Applied(ticket) => ticket,
        };

        if id.is_synthetic() {
            debug!("Marked {} read locally", id);
            return Ok(MarkReadOutcome::LocalOnly);
        }

        match self.api.mark_read(id).await {
            Ok(()) => {
                debug!("Backend confirmed {} as read", id);
                Ok(MarkReadOutcome::Confirmed)
            }
            Err(e) => {
                let reverted = self.store.rollback_mark_read(id, ticket);
                warn!("Marking {} read failed (reverted: {}): {}", id, reverted, e);
                Err(e)
            }
        }
    }

    /// Mark every unread record; confirmations run concurrently
    pub async fn mark_all_read(&self) -> MarkAllReadSummary {
        let ids = self.store.unread_ids();
        let results = join_all(ids.iter().map(|id| self.mark_read(id))).await;

        let mut summary = MarkAllReadSummary::default();
        for result in results {
            match result {
                Ok(MarkReadOutcome::Confirmed) => summary.confirmed += 1,
                Ok(MarkReadOutcome::LocalOnly) => summary.local_only += 1,
                Ok(_) => {}
                Err(e) => {
                    summary.failed += 1;
                    if summary.first_error.is_none() {
                        summary.first_error = Some(e);
                    }
                }
            }
        }
        summary
    }
}
