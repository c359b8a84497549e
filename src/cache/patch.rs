//! Two-phase commands for optimistic mutations.
//!
//! Every write that patches the cache speculatively runs as a
//! [`MutationCommand`]: apply one or more patches, send the request, then
//! `commit` on success or `rollback` on failure. The command moves
//! through `Pending → (Committed | RolledBack)` exactly once; a command
//! dropped while still pending rolls back, so an early return or panic
//! in the request path cannot leave speculative state behind.

use std::sync::Arc;

use uuid::Uuid;

use crate::cache::key::CacheKey;
use crate::cache::store::QueryCache;

/// Handle to one applied optimistic patch.
///
/// Inert handles come from patching an entry that holds no data (nothing
/// was applied, so there is nothing to revert); they accept `revert` and
/// `commit` as no-ops so call sites stay uniform.
pub struct PatchHandle {
    inner: Option<LivePatch>,
}

struct LivePatch {
    cache: Arc<QueryCache>,
    key: CacheKey,
    id: Uuid,
}

impl PatchHandle {
    pub(crate) fn inert() -> Self {
        Self { inner: None }
    }

    pub(crate) fn live(cache: Arc<QueryCache>, key: CacheKey, id: Uuid) -> Self {
        Self {
            inner: Some(LivePatch { cache, key, id }),
        }
    }

    pub fn is_inert(&self) -> bool {
        self.inner.is_none()
    }

    /// Undo exactly this patch. Idempotent.
    pub fn revert(&self) {
        if let Some(patch) = &self.inner {
            patch.cache.revert_patch(&patch.key, patch.id);
        }
    }

    /// Keep this patch: it stops being revertible and is folded into the
    /// entry's confirmed value.
    pub fn commit(&self) {
        if let Some(patch) = &self.inner {
            patch.cache.commit_patch(&patch.key, patch.id);
        }
    }
}

/// Lifecycle of a mutation command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Pending,
    Committed,
    RolledBack,
}

/// A mutation's speculative cache effects, settled exactly once.
pub struct MutationCommand {
    state: CommandState,
    patches: Vec<PatchHandle>,
}

impl MutationCommand {
    pub fn new() -> Self {
        Self {
            state: CommandState::Pending,
            patches: Vec::new(),
        }
    }

    /// Track a patch applied on behalf of this command.
    pub fn record(&mut self, handle: PatchHandle) {
        debug_assert_eq!(self.state, CommandState::Pending);
        self.patches.push(handle);
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    /// Settle successfully: every patch is kept. Only the first settle
    /// has any effect.
    pub fn commit(&mut self) {
        if self.state != CommandState::Pending {
            return;
        }
        for patch in &self.patches {
            patch.commit();
        }
        self.state = CommandState::Committed;
    }

    /// Settle unsuccessfully: every patch is reverted, in reverse order
    /// of application. Only the first settle has any effect.
    pub fn rollback(&mut self) {
        if self.state != CommandState::Pending {
            return;
        }
        for patch in self.patches.iter().rev() {
            patch.revert();
        }
        self.state = CommandState::RolledBack;
    }
}

impl Default for MutationCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MutationCommand {
    fn drop(&mut self) {
        // A command abandoned mid-flight must not leave speculative
        // state in the cache.
        self.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::CacheKey;
    use crate::cache::store::{Fetcher, QueryCache};
    use crate::models::Tag;
    use serde_json::{Value, json};
    use std::time::Duration;

    fn fetcher(value: Value) -> Fetcher {
        Arc::new(move || {
            let value = value.clone();
            Box::pin(async move { Ok(value) })
        })
    }

    async fn fulfilled_cache(key: &CacheKey, value: Value) -> (Arc<QueryCache>, crate::cache::store::Subscription) {
        let cache = QueryCache::new(Duration::from_secs(60));
        let mut sub = cache.subscribe(key.clone(), &[Tag::Capacities], fetcher(value));
        sub.settled().await;
        (cache, sub)
    }

    #[tokio::test(start_paused = true)]
    async fn command_commit_keeps_patches_and_is_terminal() {
        let key = CacheKey::bare("getCapacities");
        let (cache, sub) =
            fulfilled_cache(&key, json!({"results": [{"id": 1, "per_day": 300}]})).await;

        let mut command = MutationCommand::new();
        command.record(cache.apply_optimistic(&key, |v| {
            v["results"][0]["per_day"] = json!(500);
        }));
        command.commit();
        assert_eq!(command.state(), CommandState::Committed);

        // Rollback after commit is a no-op.
        command.rollback();
        assert_eq!(command.state(), CommandState::Committed);
        assert_eq!(sub.snapshot().data.unwrap()["results"][0]["per_day"], json!(500));
    }

    #[tokio::test(start_paused = true)]
    async fn command_rollback_restores_prior_state() {
        let key = CacheKey::bare("getCapacities");
        let (cache, sub) =
            fulfilled_cache(&key, json!({"results": [{"id": 1, "per_day": 300}]})).await;
        let before = sub.snapshot().data.unwrap();

        let mut command = MutationCommand::new();
        command.record(cache.apply_optimistic(&key, |v| {
            v["results"][0]["per_day"] = json!(999);
        }));
        command.rollback();
        assert_eq!(command.state(), CommandState::RolledBack);
        assert_eq!(*sub.snapshot().data.unwrap(), *before);

        // Commit after rollback is a no-op.
        command.commit();
        assert_eq!(command.state(), CommandState::RolledBack);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_command_rolls_back_on_drop() {
        let key = CacheKey::bare("getCapacities");
        let (cache, sub) =
            fulfilled_cache(&key, json!({"results": [{"id": 1, "per_day": 300}]})).await;
        let before = sub.snapshot().data.unwrap();

        {
            let mut command = MutationCommand::new();
            command.record(cache.apply_optimistic(&key, |v| {
                v["results"][0]["per_day"] = json!(999);
            }));
            assert_ne!(*sub.snapshot().data.unwrap(), *before);
        }
        assert_eq!(*sub.snapshot().data.unwrap(), *before);
    }

    #[tokio::test(start_paused = true)]
    async fn inert_handles_settle_quietly() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let mut command = MutationCommand::new();
        command.record(cache.apply_optimistic(&CacheKey::bare("getNothing"), |_| {}));
        assert!(command.patches[0].is_inert());
        command.commit();
        assert_eq!(command.state(), CommandState::Committed);
    }
}
