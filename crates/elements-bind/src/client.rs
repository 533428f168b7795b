//! # Client Cache
//!
//! Memoized construction of client handles. Building a client is the
//! expensive external initialization; constructing twice with identical
//! credentials and options must return the same handle instance, so the
//! cache key is the api key plus the canonical JSON of the options bag.
//!
//! The cache is explicit state owned by whoever governs the providers'
//! lifetime — never hidden globals on the SDK object — with explicit
//! eviction and teardown.

use crate::lock;
use elements_core::{ElementsError, ElementsResult, SdkRuntime, WidgetClient};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Memoizing factory for client handles
pub struct ClientFactory {
    runtime: Arc<dyn SdkRuntime>,
    cache: Mutex<HashMap<String, WidgetClient>>,
}

impl ClientFactory {
    pub fn new(runtime: Arc<dyn SdkRuntime>) -> Self {
        Self {
            runtime,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the SDK script is present in the host environment
    pub fn sdk_loaded(&self) -> bool {
        self.runtime.is_loaded()
    }

    // serde_json maps are sorted, so identical options always stringify
    // identically
    fn cache_key(api_key: &str, options: &Value) -> String {
        format!("{api_key}:{options}")
    }

    /// Get or build the client handle for this (api key, options) pair.
    /// Repeated calls with identical inputs return the identical handle.
    pub fn client(&self, api_key: &str, options: &Value) -> ElementsResult<WidgetClient> {
        if !self.runtime.is_loaded() {
            return Err(ElementsError::Configuration(
                "payment SDK script is not loaded in the host environment".to_string(),
            ));
        }

        let key = Self::cache_key(api_key, options);
        let mut cache = lock(&self.cache);
        if let Some(existing) = cache.get(&key) {
            return Ok(existing.clone());
        }

        debug!(cache_entries = cache.len(), "instantiating new sdk client");
        let client = self.runtime.instantiate(api_key, options);
        cache.insert(key, client.clone());
        Ok(client)
    }

    /// Drop one cached handle. Returns whether an entry existed.
    pub fn evict(&self, api_key: &str, options: &Value) -> bool {
        lock(&self.cache)
            .remove(&Self::cache_key(api_key, options))
            .is_some()
    }

    /// Drop every cached handle
    pub fn clear(&self) {
        lock(&self.cache).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.cache).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.cache).is_empty()
    }
}
