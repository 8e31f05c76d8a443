//! # TTL Cache
//!
//! Keyed read cache with time-based expiry and lazy eviction.
//!
//! ## Entry Validity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  inserted_at                    inserted_at + ttl                       │
//! │       │◄──────── valid (Hit) ────────►│◄──── expired (evicted) ────     │
//! │       ▼                               ▼                                 │
//! │  ─────●───────────────────────────────●────────────────────────► now    │
//! │                                                                         │
//! │  valid  ⇔  now - inserted_at < ttl                                      │
//! │  Exactly at ttl the entry is a Miss and is removed on that access.      │
//! │  There is no background sweep.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Known Limitation
//! No size bound. Growth is bounded only by the number of distinct query
//! signatures seen within a TTL window plus whatever expired entries have not
//! been touched again.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::error::SyncResult;

// =============================================================================
// Cache Key
// =============================================================================

/// Logical request signature: endpoint plus serialized parameters.
///
/// Parameters go through `serde_json::Value`, whose object keys are sorted,
/// so two semantically identical requests produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    endpoint: String,
    params: String,
}

impl CacheKey {
    /// A key for an endpoint that takes no parameters.
    pub fn new(endpoint: impl Into<String>) -> Self {
        CacheKey {
            endpoint: endpoint.into(),
            params: String::new(),
        }
    }

    /// A key for an endpoint called with `params`.
    pub fn with_params<P: Serialize + ?Sized>(
        endpoint: impl Into<String>,
        params: &P,
    ) -> SyncResult<Self> {
        let value = serde_json::to_value(params)?;
        let params = match value {
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        Ok(CacheKey {
            endpoint: endpoint.into(),
            params,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn params(&self) -> &str {
        &self.params
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            f.write_str(&self.endpoint)
        } else {
            write!(f, "{}?{}", self.endpoint, self.params)
        }
    }
}

// =============================================================================
// Invalidation Scope
// =============================================================================

/// Which cached reads a successful mutation makes stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Clear everything.
    All,
    /// Exactly one key.
    Key(CacheKey),
    /// Every key whose endpoint starts with this prefix.
    Endpoint(String),
    /// Several scopes at once.
    Scopes(Vec<Invalidation>),
}

impl Invalidation {
    pub fn endpoint(prefix: impl Into<String>) -> Self {
        Invalidation::Endpoint(prefix.into())
    }

    /// True if `key` falls inside this scope.
    pub fn covers(&self, key: &CacheKey) -> bool {
        match self {
            Invalidation::All => true,
            Invalidation::Key(exact) => exact == key,
            Invalidation::Endpoint(prefix) => key.endpoint.starts_with(prefix.as_str()),
            Invalidation::Scopes(scopes) => scopes.iter().any(|scope| scope.covers(key)),
        }
    }
}

// =============================================================================
// Cache
// =============================================================================

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
}

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Hit(V),
    Miss,
    /// The entry was present but stale. It has been evicted.
    Expired,
}

impl<V> Lookup<V> {
    pub fn into_hit(self) -> Option<V> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss | Lookup::Expired => None,
        }
    }
}

/// Read cache with a single TTL for every entry.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    ttl: Duration,
    /// Bumped by every invalidation.
    generation: u64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            entries: HashMap::new(),
            ttl,
            generation: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Looks up `key`, evicting it if it has expired.
    pub fn lookup(&mut self, key: &CacheKey, now: DateTime<Utc>) -> Lookup<V> {
        let expired = match self.entries.get(key) {
            None => return Lookup::Miss,
            Some(entry) => now - entry.inserted_at >= self.ttl,
        };

        if expired {
            self.entries.remove(key);
            return Lookup::Expired;
        }

        match self.entries.get(key) {
            Some(entry) => Lookup::Hit(entry.value.clone()),
            None => Lookup::Miss,
        }
    }

    pub fn get(&mut self, key: &CacheKey, now: DateTime<Utc>) -> Option<V> {
        self.lookup(key, now).into_hit()
    }

    /// Stores `value`, replacing any previous entry and resetting its age.
    pub fn set(&mut self, key: CacheKey, value: V, now: DateTime<Utc>) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    /// Stores `value` only if nothing was invalidated since `generation`
    /// was read.
    ///
    /// A fetch that started before a write must not repopulate the cache
    /// with the pre-write value once the write has invalidated it.
    pub fn set_if_current(
        &mut self,
        key: CacheKey,
        value: V,
        now: DateTime<Utc>,
        generation: u64,
    ) -> bool {
        if generation != self.generation {
            return false;
        }
        self.set(key, value, now);
        true
    }

    /// Removes every entry the scope covers. Returns how many were removed.
    pub fn invalidate(&mut self, scope: &Invalidation) -> usize {
        self.generation += 1;
        let before = self.entries.len();
        match scope {
            Invalidation::All => self.entries.clear(),
            Invalidation::Key(key) => {
                self.entries.remove(key);
            }
            _ => self.entries.retain(|key, _| !scope.covers(key)),
        }
        before - self.entries.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of stored entries, including expired ones not yet touched.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Serialize;
    use std::collections::HashMap;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_entry_valid_strictly_before_ttl() {
        let mut cache = TtlCache::new(Duration::seconds(300));
        let key = CacheKey::new("inventory/items");
        cache.set(key.clone(), 42, t0());

        assert_eq!(cache.get(&key, t0()), Some(42));
        assert_eq!(
            cache.lookup(&key, t0() + Duration::seconds(299)),
            Lookup::Hit(42)
        );
        assert_eq!(
            cache.lookup(&key, t0() + Duration::seconds(300)),
            Lookup::Expired
        );
        assert!(cache.is_empty());
        assert_eq!(cache.lookup(&key, t0() + Duration::seconds(300)), Lookup::Miss);
    }

    #[test]
    fn test_set_resets_age() {
        let mut cache = TtlCache::new(Duration::seconds(60));
        let key = CacheKey::new("finance/budgets");
        cache.set(key.clone(), "old", t0());
        cache.set(key.clone(), "new", t0() + Duration::seconds(50));
        assert_eq!(cache.get(&key, t0() + Duration::seconds(100)), Some("new"));
    }

    #[test]
    fn test_params_signature_is_order_independent() {
        #[derive(Serialize)]
        struct Filter {
            category: &'static str,
            below_minimum: bool,
        }

        let a = CacheKey::with_params(
            "inventory/items",
            &Filter {
                category: "feed",
                below_minimum: true,
            },
        )
        .unwrap();

        let mut map = HashMap::new();
        map.insert("category", serde_json::json!("feed"));
        map.insert("below_minimum", serde_json::json!(true));
        let b = CacheKey::with_params("inventory/items", &map).unwrap();

        assert_eq!(a, b);
        assert_eq!(
            a.to_string(),
            r#"inventory/items?{"below_minimum":true,"category":"feed"}"#
        );
        assert_eq!(CacheKey::with_params("x", &()).unwrap(), CacheKey::new("x"));
    }

    #[test]
    fn test_invalidation_scopes() {
        let mut cache = TtlCache::new(Duration::seconds(300));
        let list = CacheKey::new("inventory/items");
        let one = CacheKey::new("inventory/items/i-1");
        let budgets = CacheKey::new("finance/budgets");
        for key in [&list, &one, &budgets] {
            cache.set(key.clone(), 1, t0());
        }

        assert_eq!(cache.invalidate(&Invalidation::Key(one.clone())), 1);
        assert_eq!(cache.len(), 2);

        cache.set(one.clone(), 1, t0());
        assert_eq!(cache.invalidate(&Invalidation::endpoint("inventory/")), 2);
        assert_eq!(cache.get(&budgets, t0()), Some(1));

        assert_eq!(cache.invalidate(&Invalidation::All), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stale_fill_is_dropped_after_invalidation() {
        let mut cache = TtlCache::new(Duration::seconds(300));
        let key = CacheKey::new("bovines");
        let generation = cache.generation();

        cache.invalidate(&Invalidation::All);
        assert!(!cache.set_if_current(key.clone(), "pre-write", t0(), generation));
        assert_eq!(cache.get(&key, t0()), None);

        let generation = cache.generation();
        assert!(cache.set_if_current(key.clone(), "fresh", t0(), generation));
        assert_eq!(cache.get(&key, t0()), Some("fresh"));
    }
}
