//! Process-wide cache of provisioned transports keyed by network identity.
//!
//! One [`TransportCache`] is created at server start and passed by reference
//! to every [`crate::server::Bootstrap::create_all`] call. Entries are never
//! removed; a cached transport lives as long as the cache.

use std::sync::{Mutex, MutexGuard};

use tracing::trace;

use crate::error::{Result, SvcError};
use crate::transport::TransportHandle;

/// A cached transport and the network identity it serves.
#[derive(Debug)]
pub struct CacheEntry {
    pub netid: String,
    pub handle: TransportHandle,
}

/// Lock-protected list of [`CacheEntry`], at most one per netid.
#[derive(Debug, Default)]
pub struct TransportCache {
    entries: Mutex<Vec<CacheEntry>>,
    limit: Option<usize>,
}

impl TransportCache {
    pub fn new() -> Self {
        TransportCache::default()
    }

    /// Cache that refuses to record more than `limit` transports.
    pub fn with_limit(limit: usize) -> Self {
        TransportCache { entries: Mutex::default(), limit: Some(limit) }
    }

    /// Acquires the cache lock. The guard may be held across a lookup and
    /// whatever the caller does before inserting.
    pub fn lock(&self) -> CacheGuard<'_> {
        // Entries are only ever appended whole, so a poisoned list is still consistent.
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        CacheGuard { entries, limit: self.limit }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, netid: &str) -> bool {
        self.lock().lookup(netid).is_some()
    }

    /// Netids of all cached transports.
    pub fn netids(&self) -> Vec<String> {
        self.lock().entries.iter().map(|entry| entry.netid.clone()).collect()
    }
}

/// Exclusive access to the cache contents.
pub struct CacheGuard<'a> {
    entries: MutexGuard<'a, Vec<CacheEntry>>,
    limit: Option<usize>,
}

impl CacheGuard<'_> {
    pub fn lookup(&self, netid: &str) -> Option<&TransportHandle> {
        self.entries.iter().find(|entry| entry.netid == netid).map(|entry| &entry.handle)
    }

    /// Records a new entry. Callers check [`CacheGuard::lookup`] first. It
    /// fails when the bookkeeping cannot grow (out of memory, or the limit
    /// set with [`TransportCache::with_limit`]); the handle is then returned
    /// to the caller untouched.
    pub fn insert(
        &mut self,
        netid: &str,
        handle: TransportHandle,
    ) -> std::result::Result<(), (SvcError, TransportHandle)> {
        if let Err(e) = self.try_reserve() {
            return Err((e, handle));
        }
        trace!("caching transport for {}", netid);
        self.entries.push(CacheEntry { netid: netid.to_string(), handle });
        Ok(())
    }

    fn try_reserve(&mut self) -> Result<()> {
        if let Some(limit) = self.limit {
            if self.entries.len() >= limit {
                return Err(SvcError::CacheFull(limit));
            }
        }
        self.entries.try_reserve(1)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
