use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};
use verdict_core::models::HistoryPage;
use verdict_core::DEFAULT_PAGE_LIMIT;

use crate::api::HistoryApi;
use crate::notification::NotificationQueue;

/// Lifecycle of one optimistic delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    Pending,
    Committed,
    RolledBack,
}

#[derive(Debug, Error, PartialEq)]
pub enum SyncError {
    #[error("a delete for {0} is already in progress")]
    AlreadyPending(String),

    #[error("history has not been loaded yet")]
    NotLoaded,

    #[error("record {0} is not on the current page")]
    NotCached(String),

    #[error("no delete in progress for {0}")]
    NotPending(String),

    #[error("delete failed and was rolled back: {0}")]
    RolledBack(String),

    #[error("failed to load history: {0}")]
    Refresh(String),
}

/// Locally owned copy of one history page plus the bookkeeping for
/// in-flight deletes. Every change bumps `version`.
#[derive(Debug, Default)]
pub struct HistoryCache {
    page: Option<HistoryPage>,
    version: u64,
    /// Pre-delete snapshot per record with a delete in flight.
    pending: HashMap<String, HistoryPage>,
    /// Acknowledged removals, keyed by the cache version they landed at.
    /// Kept applied until a list that started after them has loaded.
    committed: HashMap<String, u64>,
    states: HashMap<String, MutationState>,
}

impl HistoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self) -> Option<&HistoryPage> {
        self.page.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state(&self, id: &str) -> MutationState {
        self.states.get(id).copied().unwrap_or(MutationState::Idle)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Replace the cached page with server data read at the current version.
    pub fn load(&mut self, page: HistoryPage) {
        let started = self.version;
        self.load_since(page, started);
    }

    /// Replace the cached page with server data from a list request that
    /// started at version `started`. Deletes still in flight, and deletes
    /// acknowledged after `started`, stay applied on top of it.
    pub fn load_since(&mut self, mut page: HistoryPage, started: u64) {
        self.committed.retain(|_, at| *at > started);
        for snapshot in self.pending.values_mut() {
            *snapshot = page.clone();
        }
        for id in self.pending.keys().chain(self.committed.keys()) {
            page.remove(id);
        }
        self.states.retain(|id, _| {
            self.pending.contains_key(id) || self.committed.contains_key(id) || page.position(id).is_some()
        });
        self.page = Some(page);
        self.version += 1;
    }

    /// Idle -> Pending: snapshot, then drop the record and decrement the total.
    pub fn begin_delete(&mut self, id: &str) -> Result<(), SyncError> {
        if self.pending.contains_key(id) {
            return Err(SyncError::AlreadyPending(id.to_string()));
        }
        let page = self.page.as_mut().ok_or(SyncError::NotLoaded)?;
        if page.position(id).is_none() {
            return Err(SyncError::NotCached(id.to_string()));
        }

        let snapshot = page.clone();
        page.remove(id);
        self.pending.insert(id.to_string(), snapshot);
        self.states.insert(id.to_string(), MutationState::Pending);
        self.version += 1;
        Ok(())
    }

    /// Pending -> Committed: the optimistic state becomes authoritative.
    pub fn commit(&mut self, id: &str) {
        if self.pending.remove(id).is_some() {
            self.version += 1;
            self.committed.insert(id.to_string(), self.version);
            self.states.insert(id.to_string(), MutationState::Committed);
        }
    }

    /// Pending -> RolledBack: restore the snapshot, keeping other deletes
    /// that are still in flight or already acknowledged.
    pub fn rollback(&mut self, id: &str) {
        let Some(mut page) = self.pending.remove(id) else {
            return;
        };
        for other in self.pending.keys().chain(self.committed.keys()) {
            page.remove(other);
        }
        self.page = Some(page);
        self.states.insert(id.to_string(), MutationState::RolledBack);
        self.version += 1;
    }
}

/// Drives optimistic deletes against a `HistoryApi` and reports outcomes.
///
/// The cache lock is never held across an await.
#[derive(Clone)]
pub struct Synchronizer {
    api: Arc<dyn HistoryApi>,
    cache: Arc<Mutex<HistoryCache>>,
    notifications: Arc<NotificationQueue>,
}

impl Synchronizer {
    pub fn new(api: Arc<dyn HistoryApi>, notifications: Arc<NotificationQueue>) -> Self {
        Self { api, cache: Arc::new(Mutex::new(HistoryCache::new())), notifications }
    }

    pub fn notifications(&self) -> &Arc<NotificationQueue> {
        &self.notifications
    }

    /// Copy of the cached page as it stands right now.
    pub fn page(&self) -> Option<HistoryPage> {
        self.cache.lock().page().cloned()
    }

    pub fn version(&self) -> u64 {
        self.cache.lock().version()
    }

    pub fn state(&self, id: &str) -> MutationState {
        self.cache.lock().state(id)
    }

    /// Load a specific window from the server.
    pub async fn load(&self, limit: u64, skip: u64) -> Result<(), SyncError> {
        let started = self.version();
        match self.api.list(limit, skip).await {
            Ok(page) => {
                debug!(records = page.records.len(), total = page.total, started, "history loaded");
                self.cache.lock().load_since(page, started);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "history load failed");
                self.notifications.error(format!("Failed to load history: {e}"));
                Err(SyncError::Refresh(e.to_string()))
            }
        }
    }

    /// Reload the window currently cached, or the first page.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let (limit, skip) = self
            .cache
            .lock()
            .page()
            .map(|p| (p.limit, p.skip))
            .unwrap_or((DEFAULT_PAGE_LIMIT, 0));
        self.load(limit, skip).await
    }

    /// Idle -> Pending for `id`. Applied to the cache before returning, so a
    /// second call for the same record fails here without touching the server.
    pub fn begin_delete(&self, id: &str) -> Result<(), SyncError> {
        self.cache.lock().begin_delete(id)
    }

    /// Optimistically delete `id`, then confirm with the server.
    pub async fn delete(&self, id: &str) -> Result<MutationState, SyncError> {
        self.begin_delete(id)?;
        self.confirm_delete(id).await
    }

    /// Settle a delete started with `begin_delete`.
    ///
    /// On success (or when the record was already gone) the removal stands
    /// and the page is refreshed. On any other failure the page is restored
    /// and the error returned.
    pub async fn confirm_delete(&self, id: &str) -> Result<MutationState, SyncError> {
        if !self.cache.lock().is_pending(id) {
            return Err(SyncError::NotPending(id.to_string()));
        }

        match self.api.remove(id).await {
            Ok(()) => {
                self.cache.lock().commit(id);
                info!(record = id, "history record deleted");
                self.notifications.info("Image deleted successfully");
            }
            Err(e) if e.is_not_found() => {
                self.cache.lock().commit(id);
                info!(record = id, "history record was already gone");
                self.notifications.warn("That image was already deleted");
            }
            Err(e) => {
                self.cache.lock().rollback(id);
                warn!(record = id, error = %e, "delete rolled back");
                self.notifications.error("Failed to delete image");
                return Err(SyncError::RolledBack(e.to_string()));
            }
        }

        // drift correction only; the commit stands either way
        if let Err(e) = self.refresh().await {
            debug!(error = %e, "post-delete refresh failed");
        }
        Ok(MutationState::Committed)
    }
}
