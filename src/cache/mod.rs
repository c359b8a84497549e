//! The remote cache synchronization layer.
//!
//! [`store::QueryCache`] is the single source of truth for remote data,
//! keyed by [`key::CacheKey`] and reference-counted per subscriber. All
//! mutation paths — fetch completion, optimistic patches, invalidation
//! refetch, and live-update merges — serialize through each entry's lock,
//! and readers only ever see fully-materialized values.

pub mod key;
pub mod patch;
pub mod store;

pub use key::{CacheKey, QueryParams};
pub use patch::{CommandState, MutationCommand, PatchHandle};
pub use store::{EntrySnapshot, FetchStatus, QueryCache, Resource, Subscription};
