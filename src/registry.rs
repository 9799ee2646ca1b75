//! Mock call registry.
//!
//! Owns every registered mock call, keyed by normalized route, plus the
//! id index used by the management endpoints.

use crate::model::MockApiCall;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent store of registered mock calls.
///
/// Calls for one route key are kept in insertion order; matching depends
/// on that order, so nothing here re-sorts. The per-call `match_count`
/// atomics are shared through the returned `Arc`s, which is how the match
/// engine's increments stay visible to every concurrent request.
#[derive(Debug, Default)]
pub struct MockRegistry {
    /// Route key -> calls in insertion order
    routes: DashMap<String, Vec<Arc<MockApiCall>>>,
    /// Call id -> route key the call lives under
    ids: DashMap<String, String>,
}

impl MockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call. A call with the same id is replaced: the old one
    /// is removed from wherever it lives and the new one is appended
    /// under its freshly computed route key.
    pub fn add(&self, call: MockApiCall) -> Arc<MockApiCall> {
        self.remove(&call.call_id);
        let key = call.route_key();
        let call = Arc::new(call);
        self.routes.entry(key.clone()).or_default().push(call.clone());
        self.ids.insert(call.call_id.clone(), key);
        call
    }

    /// Remove a call by id, returning it if it was registered.
    pub fn remove(&self, call_id: &str) -> Option<Arc<MockApiCall>> {
        let (_, key) = self.ids.remove(call_id)?;
        let mut removed = None;
        if let Some(mut calls) = self.routes.get_mut(&key) {
            if let Some(pos) = calls.iter().position(|c| c.call_id == call_id) {
                removed = Some(calls.remove(pos));
            }
        }
        removed
    }

    /// Look up a call by id.
    pub fn get(&self, call_id: &str) -> Option<Arc<MockApiCall>> {
        let key = self.ids.get(call_id)?.value().clone();
        let calls = self.routes.get(&key)?;
        calls.iter().find(|c| c.call_id == call_id).cloned()
    }

    /// Whether a call id is currently registered.
    pub fn contains(&self, call_id: &str) -> bool {
        self.ids.contains_key(call_id)
    }

    /// Snapshot of the calls registered under a route key, in insertion
    /// order. Expired calls are included; matching filters them.
    pub fn list(&self, route_key: &str) -> Vec<Arc<MockApiCall>> {
        self.routes
            .get(route_key)
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Every non-expired call. Order across routes is unspecified; order
    /// within a route is insertion order.
    pub fn list_all(&self, now: DateTime<Utc>) -> Vec<Arc<MockApiCall>> {
        let mut out = Vec::new();
        for entry in self.routes.iter() {
            for call in entry.value() {
                if !call.is_expired(now) {
                    out.push(call.clone());
                }
            }
        }
        out
    }

    /// Total number of registered calls, expired included.
    pub fn len(&self) -> usize {
        self.routes.iter().map(|entry| entry.value().len()).sum()
    }

    /// Whether the registry holds no calls.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registered call.
    pub fn clear(&self) {
        self.routes.clear();
        self.ids.clear();
    }
}
