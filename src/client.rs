//! `SyncClient`: the context-owned entry point to the sync layer.
//!
//! Owns the query cache and the authenticated API client; everything
//! that needs remote data receives a `SyncClient` (or a clone) instead
//! of reaching for ambient globals. Lifecycle is tied to whoever
//! constructs it — typically the application root.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::api::client::{ApiClient, RequestSpec};
use crate::api::endpoints::EndpointDef;
use crate::cache::store::Fetcher;
use crate::cache::{CacheKey, MutationCommand, QueryCache, QueryParams, Resource};
use crate::config::ShopfloorConfig;
use crate::errors::ApiError;
use crate::storage::CredentialStore;

#[derive(Clone)]
pub struct SyncClient {
    cache: Arc<QueryCache>,
    api: ApiClient,
}

impl SyncClient {
    pub fn new(config: &ShopfloorConfig, store: Arc<CredentialStore>) -> Result<Self, ApiError> {
        let api = ApiClient::new(&config.api.base_url, config.request_timeout(), store)?;
        Ok(Self {
            cache: QueryCache::new(config.eviction_grace()),
            api,
        })
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    // ── Plumbing shared by every endpoint ─────────────────────────────

    /// Subscribe to a read endpoint: same canonical key, same entry,
    /// one request for all concurrent subscribers.
    pub(crate) fn query<T: serde::de::DeserializeOwned>(
        &self,
        def: &'static EndpointDef,
        key: CacheKey,
        path: String,
        params: Option<QueryParams>,
    ) -> Resource<T> {
        let api = self.api.clone();
        let method = def.method;
        let fetcher: Fetcher = Arc::new(move || {
            let api = api.clone();
            let path = path.clone();
            let query = params.clone();
            Box::pin(async move {
                api.execute(RequestSpec {
                    method,
                    path,
                    query,
                    body: None,
                })
                .await
            })
        });
        Resource::new(self.cache.subscribe(key, def.provides, fetcher))
    }

    /// Run a write endpoint as a two-phase command: the caller has
    /// already applied any optimistic patches into `command`; success
    /// commits them and invalidates the endpoint's tags, failure rolls
    /// them back before the error propagates.
    pub(crate) async fn run_mutation(
        &self,
        def: &'static EndpointDef,
        path: String,
        body: Option<Value>,
        mut command: MutationCommand,
    ) -> Result<Value, ApiError> {
        let result = self
            .api
            .execute(RequestSpec {
                method: def.method,
                path,
                query: None,
                body,
            })
            .await;
        match result {
            Ok(value) => {
                command.commit();
                debug!(endpoint = def.name, "mutation succeeded, invalidating tags");
                self.cache.invalidate(def.invalidates);
                Ok(value)
            }
            Err(err) => {
                command.rollback();
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient").finish_non_exhaustive()
    }
}
