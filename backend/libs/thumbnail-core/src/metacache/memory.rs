//! In-process metadata store
//!
//! Entries and sets with a TTL expire lazily on read. Contents are lost with
//! the process, which the engine tolerates.

use super::MetaStore;
use crate::error::CacheResult;
use dashmap::DashMap;
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        is_expired(self.expires_at, now)
    }
}

#[derive(Debug, Default)]
struct Members {
    members: HashSet<String>,
    expires_at: Option<Instant>,
}

impl Members {
    fn is_expired(&self, now: Instant) -> bool {
        is_expired(self.expires_at, now)
    }
}

fn is_expired(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.map(|at| at <= now).unwrap_or(false)
}

#[derive(Debug, Default)]
pub struct MemoryMetaStore {
    entries: DashMap<String, Entry>,
    sets: DashMap<String, Members>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything, simulating a restart of a volatile store
    pub fn clear(&self) {
        self.entries.clear();
        self.sets.clear();
    }
}

#[async_trait::async_trait]
impl MetaStore for MemoryMetaStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        let value = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => None,
            None => return Ok(None),
        };

        // Expired; the read guard is released before removing
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        self.sets.remove(key);
        Ok(())
    }

    async fn add_member(
        &self,
        set: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let now = Instant::now();
        self.sets.remove_if(set, |_, members| members.is_expired(now));

        let mut members = self.sets.entry(set.to_string()).or_default();
        members.members.insert(member.to_string());
        // Without a TTL the current expiry is kept, as with SADD
        if let Some(ttl) = ttl {
            members.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    async fn remove_member(&self, set: &str, member: &str) -> CacheResult<()> {
        if let Some(mut members) = self.sets.get_mut(set) {
            members.members.remove(member);
        }
        self.sets
            .remove_if(set, |_, members| members.members.is_empty());
        Ok(())
    }

    async fn members(&self, set: &str) -> CacheResult<Vec<String>> {
        let now = Instant::now();
        self.sets.remove_if(set, |_, members| members.is_expired(now));
        Ok(self
            .sets
            .get(set)
            .map(|members| members.members.iter().cloned().collect())
            .unwrap_or_default())
    }
}
