// Copyright 2025 Alejandro Martínez Corriá and the Thinkube contributors
// SPDX-License-Identifier: Apache-2.0

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use moka::{future::Cache, Expiry};
use std::time::{Duration, Instant};

/// A raw upstream response as it was received, plus how long to keep it.
#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub status: u16,
    pub body: Bytes,
    pub ttl: Duration,
    pub cached_at: chrono::DateTime<chrono::Utc>,
}

impl CachedResponse {
    pub fn new(status: u16, body: Bytes, ttl: Duration) -> Self {
        Self {
            status,
            body,
            ttl,
            cached_at: chrono::Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Key/value store for upstream responses, keyed by upstream URL.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn lookup(&self, key: &str) -> Option<CachedResponse>;

    async fn store(&self, key: String, response: CachedResponse) -> Result<()>;
}

struct PerEntryTtl;

impl Expiry<String, CachedResponse> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedResponse,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedResponse,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct ResponseCache {
    cache: Cache<String, CachedResponse>,
}

impl ResponseCache {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .expire_after(PerEntryTtl)
            .max_capacity(max_capacity)
            .build();

        Self { cache }
    }
}

#[async_trait]
impl ResponseStore for ResponseCache {
    async fn lookup(&self, key: &str) -> Option<CachedResponse> {
        self.cache.get(key).await
    }

    async fn store(&self, key: String, response: CachedResponse) -> Result<()> {
        self.cache.insert(key, response).await;
        Ok(())
    }
}

/// Store that never holds anything. Every lookup misses.
pub struct NoopStore;

#[async_trait]
impl ResponseStore for NoopStore {
    async fn lookup(&self, _key: &str) -> Option<CachedResponse> {
        None
    }

    async fn store(&self, _key: String, _response: CachedResponse) -> Result<()> {
        Ok(())
    }
}
