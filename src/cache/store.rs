//! The query cache: single source of truth for remote data.
//!
//! Each entry holds the last confirmed server value (`base`) plus an
//! ordered list of pending optimistic overlays. Readers only ever see a
//! fully-materialized value swapped in atomically through a watch
//! channel, so a half-applied patch is never observable. Entries are
//! reference-counted; the last unsubscribe starts an eviction timer.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::cache::key::CacheKey;
use crate::cache::patch::PatchHandle;
use crate::errors::{ApiError, CacheError};
use crate::models::{RecordDelta, Tag};

/// Produces the network future for one cache key. Registered at
/// subscribe time and reused for every invalidation refetch.
pub type Fetcher =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Value, ApiError>> + Send + Sync>;

/// Fetch lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Uninitialized,
    Loading,
    Fulfilled,
    Error,
}

/// What a subscriber sees: status plus the materialized value.
///
/// `data` survives a failed refetch (stale-while-revalidate): on `Error`
/// the last good value is still present if there ever was one.
#[derive(Clone)]
pub struct EntrySnapshot {
    pub status: FetchStatus,
    pub data: Option<Arc<Value>>,
    pub error: Option<Arc<ApiError>>,
}

impl EntrySnapshot {
    fn uninitialized() -> Self {
        Self {
            status: FetchStatus::Uninitialized,
            data: None,
            error: None,
        }
    }

    /// Whether a fetch has settled (successfully or not).
    pub fn is_settled(&self) -> bool {
        matches!(self.status, FetchStatus::Fulfilled | FetchStatus::Error)
    }

    /// Decode the materialized value into a typed record.
    pub fn decode<T: serde::de::DeserializeOwned>(&self, key: &CacheKey) -> Result<T, CacheError> {
        let data = self.data.as_ref().ok_or_else(|| CacheError::Empty {
            key: key.to_string(),
        })?;
        serde_json::from_value(Value::clone(data)).map_err(|source| CacheError::Decode {
            key: key.to_string(),
            source,
        })
    }
}

pub(crate) struct PendingPatch {
    pub id: Uuid,
    pub mutate: Arc<dyn Fn(&mut Value) + Send + Sync>,
    pub committed: bool,
}

struct EntryState {
    tags: Vec<Tag>,
    status: FetchStatus,
    /// Last confirmed server value. Optimistic overlays never touch it;
    /// they are layered on top at materialization time.
    base: Option<Value>,
    pending: Vec<PendingPatch>,
    error: Option<Arc<ApiError>>,
    subscribers: usize,
    stale: bool,
    in_flight: bool,
    /// Sequence of the newest issued fetch; completions from superseded
    /// fetches are discarded.
    fetch_seq: u64,
    /// Bumped on resubscribe and on the last unsubscribe so a stale
    /// eviction timer can tell it has been outrun.
    generation: u64,
    fetcher: Fetcher,
    watch_tx: watch::Sender<EntrySnapshot>,
}

impl EntryState {
    fn materialize(&self) -> Option<Arc<Value>> {
        self.base.as_ref().map(|base| {
            let mut value = base.clone();
            for patch in &self.pending {
                (patch.mutate)(&mut value);
            }
            Arc::new(value)
        })
    }

    fn publish(&self) {
        self.watch_tx.send_replace(EntrySnapshot {
            status: self.status,
            data: self.materialize(),
            error: self.error.clone(),
        });
    }
}

/// Keyed, reference-counted store of remote reads.
pub struct QueryCache {
    entries: DashMap<CacheKey, Arc<Mutex<EntryState>>>,
    eviction_grace: Duration,
    /// Self-handle for the background tasks (fetch completion, eviction
    /// timers) the store spawns.
    me: Weak<QueryCache>,
}

impl QueryCache {
    pub fn new(eviction_grace: Duration) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            entries: DashMap::new(),
            eviction_grace,
            me: me.clone(),
        })
    }

    fn strong(&self) -> Arc<Self> {
        self.me.upgrade().expect("cache outlives its tasks")
    }

    /// Register a subscriber for `key`, creating the entry on first use
    /// and fetching if the entry is new or stale. Concurrent subscribers
    /// share one request.
    pub fn subscribe(
        &self,
        key: CacheKey,
        tags: &[Tag],
        fetcher: Fetcher,
    ) -> Subscription {
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| {
                let (watch_tx, _) = watch::channel(EntrySnapshot::uninitialized());
                Arc::new(Mutex::new(EntryState {
                    tags: tags.to_vec(),
                    status: FetchStatus::Uninitialized,
                    base: None,
                    pending: Vec::new(),
                    error: None,
                    subscribers: 0,
                    stale: false,
                    in_flight: false,
                    fetch_seq: 0,
                    generation: 0,
                    fetcher: fetcher.clone(),
                    watch_tx,
                }))
            })
            .clone();

        let (rx, needs_fetch) = {
            let mut state = entry.lock().expect("cache entry poisoned");
            state.subscribers += 1;
            state.generation += 1;
            state.fetcher = fetcher;
            let needs_fetch = matches!(state.status, FetchStatus::Uninitialized) || state.stale;
            (state.watch_tx.subscribe(), needs_fetch)
        };
        trace!(key = %key, "subscribed");

        if needs_fetch {
            self.start_fetch(&key);
        }

        Subscription {
            cache: self.strong(),
            key,
            rx,
        }
    }

    /// Mark every entry carrying any of `tags` stale and refetch the ones
    /// with live subscribers.
    pub fn invalidate(&self, tags: &[Tag]) {
        let mut to_fetch = Vec::new();
        for item in self.entries.iter() {
            let mut state = item.value().lock().expect("cache entry poisoned");
            if !state.tags.iter().any(|t| tags.contains(t)) {
                continue;
            }
            state.stale = true;
            if state.subscribers > 0 && !state.in_flight {
                to_fetch.push(item.key().clone());
            }
        }
        debug!(?tags, refetching = to_fetch.len(), "invalidated");
        for key in to_fetch {
            self.start_fetch(&key);
        }
    }

    /// Refetch one entry immediately, regardless of staleness.
    pub fn force_refetch(&self, key: &CacheKey) {
        if self.entries.contains_key(key) {
            self.start_fetch(key);
        }
    }

    // ── Optimistic patches ────────────────────────────────────────────

    /// Layer a speculative mutation over the entry's value. The returned
    /// handle reverts exactly this patch; patches on the same entry
    /// compose because the view is always recomputed from `base` plus
    /// the surviving overlays in application order.
    ///
    /// An absent or empty entry yields an inert handle (nothing to patch,
    /// nothing to revert).
    pub fn apply_optimistic(
        &self,
        key: &CacheKey,
        mutate: impl Fn(&mut Value) + Send + Sync + 'static,
    ) -> PatchHandle {
        let Some(entry) = self.entries.get(key).map(|e| e.value().clone()) else {
            return PatchHandle::inert();
        };
        let mut state = entry.lock().expect("cache entry poisoned");
        if state.base.is_none() {
            return PatchHandle::inert();
        }
        let id = Uuid::new_v4();
        state.pending.push(PendingPatch {
            id,
            mutate: Arc::new(mutate),
            committed: false,
        });
        state.publish();
        trace!(key = %key, patch = %id, pending = state.pending.len(), "optimistic patch applied");
        PatchHandle::live(self.strong(), key.clone(), id)
    }

    /// Drop one pending patch and recompute the view. Unknown or already
    /// committed ids are a no-op, which makes revert idempotent.
    pub(crate) fn revert_patch(&self, key: &CacheKey, id: Uuid) {
        let Some(entry) = self.entries.get(key).map(|e| e.value().clone()) else {
            return;
        };
        let mut state = entry.lock().expect("cache entry poisoned");
        let before = state.pending.len();
        state.pending.retain(|p| p.id != id || p.committed);
        if state.pending.len() != before {
            state.publish();
            trace!(key = %key, patch = %id, "optimistic patch reverted");
        }
    }

    /// Mark one pending patch committed: it stops being revertible, and
    /// once every patch ahead of it has settled it is folded into `base`.
    /// The materialized view does not change; the entry still gets
    /// reconciled by the invalidation refetch that follows a successful
    /// mutation.
    pub(crate) fn commit_patch(&self, key: &CacheKey, id: Uuid) {
        let Some(entry) = self.entries.get(key).map(|e| e.value().clone()) else {
            return;
        };
        let mut state = entry.lock().expect("cache entry poisoned");
        if let Some(patch) = state.pending.iter_mut().find(|p| p.id == id) {
            patch.committed = true;
        }
        // Fold the committed prefix; overlays behind an uncommitted patch
        // keep their ordering so its later revert stays exact.
        while state.pending.first().is_some_and(|p| p.committed) {
            let patch = state.pending.remove(0);
            if let Some(base) = state.base.as_mut() {
                (patch.mutate)(base);
            }
        }
    }

    // ── Live-update merges ────────────────────────────────────────────

    /// Field-merge a partial record into every entry tagged with `tag`
    /// that holds a row with the delta's id. Returns the number of rows
    /// merged. Unknown ids merge nothing; the caller still schedules a
    /// reconciling refetch.
    pub fn merge_record(&self, tag: Tag, delta: &RecordDelta) -> usize {
        let id = delta.id();
        let mut merged = 0;
        for item in self.entries.iter() {
            let mut state = item.value().lock().expect("cache entry poisoned");
            if !state.tags.contains(&tag) {
                continue;
            }
            let Some(base) = state.base.as_mut() else {
                continue;
            };
            let mut touched = false;
            if let Some(rows) = base.get_mut("results").and_then(Value::as_array_mut) {
                for row in rows {
                    if row.get("id") == Some(&id) {
                        touched |= delta.merge_into(row);
                    } else if let Some(nested) = row.get_mut("item")
                        && nested.get("id") == Some(&id)
                    {
                        touched |= delta.merge_into(nested);
                    }
                }
            } else if base.get("id") == Some(&id) {
                touched |= delta.merge_into(base);
            }
            if touched {
                merged += 1;
                state.publish();
            }
        }
        merged
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn start_fetch(&self, key: &CacheKey) {
        let Some(entry) = self.entries.get(key).map(|e| e.value().clone()) else {
            return;
        };
        let (seq, fetcher) = {
            let mut state = entry.lock().expect("cache entry poisoned");
            if state.in_flight {
                // Deduplicated: the active request will serve every
                // subscriber, and a stale mark set mid-flight chains a
                // follow-up fetch on completion.
                return;
            }
            state.in_flight = true;
            state.stale = false;
            state.fetch_seq += 1;
            state.status = FetchStatus::Loading;
            state.publish();
            (state.fetch_seq, state.fetcher.clone())
        };

        let cache = self.strong();
        let key = key.clone();
        tokio::spawn(async move {
            let result = fetcher().await;
            cache.complete_fetch(&key, seq, result);
        });
    }

    fn complete_fetch(&self, key: &CacheKey, seq: u64, result: Result<Value, ApiError>) {
        // The entry may have been evicted while the request was in
        // flight; post-eviction writes are dropped.
        let Some(entry) = self.entries.get(key).map(|e| e.value().clone()) else {
            trace!(key = %key, "response for evicted entry dropped");
            return;
        };
        let refetch = {
            let mut state = entry.lock().expect("cache entry poisoned");
            if seq != state.fetch_seq {
                // A newer fetch was issued; this response is stale.
                trace!(key = %key, seq, newest = state.fetch_seq, "superseded response dropped");
                return;
            }
            state.in_flight = false;
            match result {
                Ok(value) => {
                    state.base = Some(value);
                    state.status = FetchStatus::Fulfilled;
                    state.error = None;
                }
                Err(err) => {
                    // Keep the last good value: stale-while-revalidate.
                    warn!(key = %key, error = %err, "fetch failed");
                    state.status = FetchStatus::Error;
                    state.error = Some(Arc::new(err));
                }
            }
            state.publish();
            state.stale && state.subscribers > 0
        };
        if refetch {
            self.start_fetch(key);
        }
    }

    fn unsubscribe(&self, key: &CacheKey) {
        let Some(entry) = self.entries.get(key).map(|e| e.value().clone()) else {
            return;
        };
        let eviction = {
            let mut state = entry.lock().expect("cache entry poisoned");
            state.subscribers = state.subscribers.saturating_sub(1);
            if state.subscribers == 0 {
                state.generation += 1;
                Some(state.generation)
            } else {
                None
            }
        };
        if let (Some(generation), Ok(_)) = (eviction, tokio::runtime::Handle::try_current()) {
            let cache = self.strong();
            let key = key.clone();
            let grace = self.eviction_grace;
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                cache.evict_if_idle(&key, generation);
            });
        }
    }

    fn evict_if_idle(&self, key: &CacheKey, generation: u64) {
        let Some(entry) = self.entries.get(key).map(|e| e.value().clone()) else {
            return;
        };
        let evict = {
            let state = entry.lock().expect("cache entry poisoned");
            state.subscribers == 0 && state.generation == generation
        };
        if evict {
            self.entries.remove(key);
            debug!(key = %key, "evicted idle entry");
        }
    }

    #[cfg(test)]
    fn has_entry(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }
}

// ── Subscriptions ─────────────────────────────────────────────────────

/// A live handle onto one cache entry. Dropping it releases the
/// reference and, when it was the last one, starts the eviction timer.
pub struct Subscription {
    cache: Arc<QueryCache>,
    key: CacheKey,
    rx: watch::Receiver<EntrySnapshot>,
}

impl Subscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Current value; consistent by construction (the whole snapshot is
    /// swapped at once).
    pub fn snapshot(&self) -> EntrySnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next published change. Returns false once the entry
    /// has been evicted.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Wait until the current fetch settles, then return the snapshot.
    pub async fn settled(&mut self) -> EntrySnapshot {
        loop {
            let snap = self.snapshot();
            if snap.is_settled() {
                return snap;
            }
            if !self.changed().await {
                return self.snapshot();
            }
        }
    }

    pub fn refetch(&self) {
        self.cache.force_refetch(&self.key);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key);
    }
}

/// Typed view over a [`Subscription`].
pub struct Resource<T> {
    sub: Subscription,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: serde::de::DeserializeOwned> Resource<T> {
    pub fn new(sub: Subscription) -> Self {
        Self {
            sub,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn subscription(&mut self) -> &mut Subscription {
        &mut self.sub
    }

    pub fn snapshot(&self) -> EntrySnapshot {
        self.sub.snapshot()
    }

    /// Decode the current value, if any.
    pub fn current(&self) -> Option<T> {
        let snap = self.sub.snapshot();
        snap.decode(&self.sub.key).ok()
    }

    /// Wait for the fetch to settle and decode the result. A settled
    /// error with stale data still decodes (stale-while-revalidate); a
    /// settled error with no data surfaces as `CacheError::Empty`.
    pub async fn settled(&mut self) -> Result<T, CacheError> {
        let snap = self.sub.settled().await;
        snap.decode(&self.sub.key)
    }

    pub fn refetch(&self) {
        self.sub.refetch();
    }
}
