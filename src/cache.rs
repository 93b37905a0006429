// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::clock::Clock;
use crate::error::{SourceError, SourceResult};
use crate::model::{Credentials, SourceKind};
use crate::store::SessionStore;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3 * 60 * 60);

const TIMESTAMP_SUFFIX: &str = ":timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Categories,
    Streams,
}

impl CacheKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Streams => "streams",
        }
    }
}

/// `cache:{source}:{identity}:{kind}[:{param}]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(source: SourceKind, identity: &str, kind: CacheKind, param: Option<&str>) -> Self {
        let mut key = format!("{}{}", Self::prefix(source, identity), kind.as_str());
        if let Some(param) = param {
            key.push(':');
            key.push_str(param);
        }
        Self(key)
    }

    pub fn for_panel(credentials: &Credentials, kind: CacheKind, param: Option<&str>) -> Self {
        Self::new(SourceKind::Panel, &credentials.identity(), kind, param)
    }

    /// Prefix shared by every entry of one source identity.
    pub fn prefix(source: SourceKind, identity: &str) -> String {
        format!("cache:{}:{}:", source.as_str(), identity)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn timestamp_key(&self) -> String {
        format!("{}{}", self.0, TIMESTAMP_SUFFIX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub written_at: DateTime<Utc>,
    pub data: T,
}

/// TTL cache over a [`SessionStore`].
///
/// Each entry is two keys: the JSON payload and its write timestamp
/// (RFC 3339). An entry whose age is not strictly below the TTL is a miss.
pub struct CacheManager {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl CacheManager {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        self.get_entry(key).map(|entry| entry.data)
    }

    pub fn get_entry<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CachedData<T>> {
        let written_at = self.written_at(key)?;

        if !self.is_fresh(written_at) {
            debug!("Cache expired: {}", key.as_str());
            return None;
        }

        let payload = self.store.get(key.as_str())?;
        match serde_json::from_str(&payload) {
            Ok(data) => Some(CachedData { written_at, data }),
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", key.as_str(), e);
                None
            }
        }
    }

    /// Writes payload first, then the timestamp that makes it visible.
    pub fn put<T: Serialize>(&self, key: &CacheKey, value: &T) -> SourceResult<()> {
        let payload = serde_json::to_string(value)
            .map_err(|e| SourceError::Store(format!("failed to serialize cache entry: {}", e)))?;
        self.store.set(key.as_str(), payload)?;
        self.store
            .set(&key.timestamp_key(), self.clock.now().to_rfc3339())?;
        debug!("Cached {}", key.as_str());
        Ok(())
    }

    /// Removes every entry (payload and timestamp) whose key starts with `prefix`.
    pub fn invalidate(&self, prefix: &str) -> SourceResult<usize> {
        let removed = self.store.remove_prefix(prefix)?;
        debug!("Invalidated {} cache keys under {}", removed, prefix);
        Ok(removed)
    }

    pub fn time_until_expiry(&self, key: &CacheKey) -> Duration {
        let Some(written_at) = self.written_at(key) else {
            return Duration::ZERO;
        };
        let age = elapsed(written_at, self.clock.now());
        self.ttl.saturating_sub(age)
    }

    fn written_at(&self, key: &CacheKey) -> Option<DateTime<Utc>> {
        let raw = self.store.get(&key.timestamp_key())?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .ok()
    }

    fn is_fresh(&self, written_at: DateTime<Utc>) -> bool {
        elapsed(written_at, self.clock.now()) < self.ttl
    }
}

// A timestamp in the future counts as age zero.
fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

/// Gates manual cache resets to one per window per (server, username).
pub struct CooldownGuard {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl CooldownGuard {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            store,
            clock,
            window,
        }
    }

    fn key(server_id: &str) -> String {
        format!("cooldown:{}", server_id)
    }

    /// Time left before a reset is allowed, `None` if allowed now.
    pub fn remaining(&self, server_id: &str) -> Option<Duration> {
        let raw = self.store.get(&Self::key(server_id))?;
        let marker = DateTime::parse_from_rfc3339(&raw)
            .ok()?
            .with_timezone(&Utc);
        let age = elapsed(marker, self.clock.now());
        if age < self.window {
            Some(self.window - age)
        } else {
            None
        }
    }

    /// Checks without touching the marker.
    pub fn can_reset(&self, server_id: &str) -> SourceResult<()> {
        match self.remaining(server_id) {
            Some(remaining) => Err(SourceError::Cooldown { remaining }),
            None => Ok(()),
        }
    }

    pub fn mark_reset(&self, server_id: &str) -> SourceResult<()> {
        self.store
            .set(&Self::key(server_id), self.clock.now().to_rfc3339())
    }

    /// `can_reset` then `mark_reset`; a rejection leaves the marker alone.
    pub fn try_reset(&self, server_id: &str) -> SourceResult<()> {
        self.can_reset(server_id)?;
        self.mark_reset(server_id)
    }

    pub fn marker(&self, server_id: &str) -> Option<DateTime<Utc>> {
        let raw = self.store.get(&Self::key(server_id))?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::{TimeDelta, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, CacheManager) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let cache = CacheManager::new(store.clone(), clock.clone(), DEFAULT_TTL);
        (store, clock, cache)
    }

    #[test]
    fn test_ttl_boundary() {
        let (_store, clock, cache) = setup();
        let key = CacheKey::new(SourceKind::Panel, "abc", CacheKind::Categories, None);
        cache.put(&key, &vec!["news".to_string()]).unwrap();

        clock.set(t0() + TimeDelta::minutes(4) + TimeDelta::seconds(59));
        assert_eq!(cache.get::<Vec<String>>(&key), Some(vec!["news".to_string()]));

        clock.set(t0() + TimeDelta::minutes(5) + TimeDelta::seconds(1));
        assert_eq!(cache.get::<Vec<String>>(&key), None);
    }

    #[test]
    fn test_exactly_ttl_is_a_miss() {
        let (_store, clock, cache) = setup();
        let key = CacheKey::new(SourceKind::Panel, "abc", CacheKind::Categories, None);
        cache.put(&key, &1u32).unwrap();

        clock.advance(TimeDelta::minutes(5));
        assert_eq!(cache.get::<u32>(&key), None);
    }

    #[test]
    fn test_payload_and_timestamp_keys() {
        let (store, _clock, cache) = setup();
        let key = CacheKey::new(SourceKind::Panel, "abc", CacheKind::Streams, Some("7"));
        cache.put(&key, &vec![1, 2, 3]).unwrap();

        assert_eq!(key.as_str(), "cache:panel:abc:streams:7");
        assert_eq!(store.get("cache:panel:abc:streams:7").as_deref(), Some("[1,2,3]"));
        assert_eq!(
            store.get("cache:panel:abc:streams:7:timestamp"),
            Some(t0().to_rfc3339())
        );
    }

    #[test]
    fn test_missing_timestamp_is_a_miss() {
        let (store, _clock, cache) = setup();
        let key = CacheKey::new(SourceKind::Panel, "abc", CacheKind::Categories, None);
        store.set(key.as_str(), "[1]".into()).unwrap();
        assert_eq!(cache.get::<Vec<u32>>(&key), None);
    }

    #[test]
    fn test_invalidate_prefix_covers_all_filters() {
        let (store, _clock, cache) = setup();
        let mine = |param| CacheKey::new(SourceKind::Panel, "abc", CacheKind::Streams, param);
        cache.put(&mine(None), &0).unwrap();
        cache.put(&mine(Some("1")), &1).unwrap();
        cache.put(&mine(Some("2")), &2).unwrap();
        let other = CacheKey::new(SourceKind::Panel, "xyz", CacheKind::Streams, Some("1"));
        cache.put(&other, &9).unwrap();

        let removed = cache.invalidate(&CacheKey::prefix(SourceKind::Panel, "abc")).unwrap();

        assert_eq!(removed, 6);
        assert_eq!(cache.get::<i32>(&mine(Some("1"))), None);
        assert_eq!(cache.get::<i32>(&other), Some(9));
        assert_eq!(store.keys().len(), 2);
    }

    #[test]
    fn test_time_until_expiry() {
        let (_store, clock, cache) = setup();
        let key = CacheKey::new(SourceKind::Panel, "abc", CacheKind::Categories, None);
        assert_eq!(cache.time_until_expiry(&key), Duration::ZERO);

        cache.put(&key, &1).unwrap();
        clock.advance(TimeDelta::minutes(2));
        assert_eq!(cache.time_until_expiry(&key), Duration::from_secs(180));
    }

    #[test]
    fn test_cooldown_window() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let guard = CooldownGuard::new(store, clock.clone(), DEFAULT_COOLDOWN);

        assert!(guard.try_reset("srv").is_ok());
        assert_eq!(guard.marker("srv"), Some(t0()));

        clock.set(t0() + TimeDelta::hours(2) + TimeDelta::minutes(59));
        match guard.try_reset("srv") {
            Err(SourceError::Cooldown { remaining }) => {
                assert_eq!(remaining, Duration::from_secs(60));
            }
            other => panic!("expected cooldown rejection, got {:?}", other),
        }
        assert_eq!(guard.marker("srv"), Some(t0()));

        let later = t0() + TimeDelta::hours(3) + TimeDelta::seconds(1);
        clock.set(later);
        assert!(guard.try_reset("srv").is_ok());
        assert_eq!(guard.marker("srv"), Some(later));
    }

    #[test]
    fn test_cooldown_is_per_server() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let guard = CooldownGuard::new(store, clock, DEFAULT_COOLDOWN);

        guard.mark_reset("one").unwrap();
        assert!(guard.can_reset("one").is_err());
        assert!(guard.can_reset("two").is_ok());
    }
}
