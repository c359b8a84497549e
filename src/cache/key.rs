//! Cache keys: endpoint name plus canonicalized parameters.
//!
//! Two requests with the same effective parameters must land on the same
//! cache entry, so parameters are kept in a sorted map and serialized in
//! key order regardless of how the caller built them.

use std::collections::BTreeMap;
use std::fmt;

/// Canonicalized query parameters.
///
/// Insertion order never matters; the serialized form is always sorted by
/// parameter name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(name.into(), value.to_string());
        self
    }

    pub fn offset(self, offset: u64) -> Self {
        self.set("offset", offset)
    }

    pub fn limit(self, limit: u64) -> Self {
        self.set("limit", limit)
    }

    pub fn search(self, term: impl ToString) -> Self {
        self.set("search", term)
    }

    pub fn ordering(self, ordering: impl ToString) -> Self {
        self.set("ordering", ordering)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `a=1&b=2` in name order. Used for both the cache key and the
    /// request URL.
    pub fn to_query_string(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Pairs for `reqwest`'s query builder, which handles encoding.
    pub fn as_pairs(&self) -> Vec<(&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }
}

/// Identity of one cached remote read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    endpoint: &'static str,
    args: String,
}

impl CacheKey {
    /// Key for a list read with canonicalized parameters.
    pub fn list(endpoint: &'static str, params: &QueryParams) -> Self {
        Self {
            endpoint,
            args: params.to_query_string(),
        }
    }

    /// Key for a single-record read.
    pub fn record(endpoint: &'static str, id: impl fmt::Display) -> Self {
        Self {
            endpoint,
            args: id.to_string(),
        }
    }

    /// Key for a read with no parameters.
    pub fn bare(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            args: String::new(),
        }
    }

    pub fn endpoint(&self) -> &'static str {
        self.endpoint
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.endpoint)
        } else {
            write!(f, "{}({})", self.endpoint, self.args)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_serialize_independent_of_insertion_order() {
        let forward = QueryParams::new().offset(0).limit(10).search("trim");
        let backward = QueryParams::new().search("trim").limit(10).offset(0);
        assert_eq!(forward.to_query_string(), backward.to_query_string());
        assert_eq!(
            CacheKey::list("getItems", &forward),
            CacheKey::list("getItems", &backward)
        );
    }

    #[test]
    fn different_params_produce_different_keys() {
        let page_one = QueryParams::new().offset(0).limit(10);
        let page_two = QueryParams::new().offset(10).limit(10);
        assert_ne!(
            CacheKey::list("getItems", &page_one),
            CacheKey::list("getItems", &page_two)
        );
    }

    #[test]
    fn same_params_different_endpoint_differ() {
        let params = QueryParams::new().limit(10);
        assert_ne!(
            CacheKey::list("getItems", &params),
            CacheKey::list("getOrders", &params)
        );
    }

    #[test]
    fn last_set_wins_for_duplicate_names() {
        let params = QueryParams::new().limit(10).limit(25);
        assert_eq!(params.to_query_string(), "limit=25");
    }

    #[test]
    fn record_and_bare_keys_display_readably() {
        assert_eq!(CacheKey::record("getItem", 5).to_string(), "getItem(5)");
        assert_eq!(CacheKey::bare("getCompanyProfile").to_string(), "getCompanyProfile");
        let params = QueryParams::new().offset(0).limit(10);
        assert_eq!(
            CacheKey::list("getItems", &params).to_string(),
            "getItems(limit=10&offset=0)"
        );
    }
}
