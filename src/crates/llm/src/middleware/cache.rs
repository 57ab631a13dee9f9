//! Response caching for `complete`.
//!
//! Keys are a digest of model, system text and user text. Values are stored
//! as JSON so any byte-oriented backend can implement [`ResponseCache`].

use super::Middleware;
use crate::error::Result;
use crate::service::{CompletionService, CompletionStream};
use crate::types::{CompletionRequest, CompletionResponse, ModelInfo};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tooling::serialization::digest_parts;

/// TTL used when none (or zero) is configured.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Longest TTL accepted from configuration.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Byte-oriented cache backend.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Live value for `key`, if any.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
}

/// Cache key for a request.
pub fn cache_key(request: &CompletionRequest) -> String {
    digest_parts(&[&request.model, &request.system, &request.user])
}

struct CacheEntry {
    value: Vec<u8>,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

/// Process-local [`ResponseCache`].
///
/// Expired entries are never returned and are dropped lazily on the next
/// write or by [`purge_expired`](InMemoryCache::purge_expired).
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

#[async_trait]
impl ResponseCache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now.checked_add(ttl),
            },
        );
        Ok(())
    }
}

/// Serves repeated `complete` calls from a [`ResponseCache`].
pub struct CachedService {
    inner: Arc<dyn CompletionService>,
    cache: Arc<dyn ResponseCache>,
    ttl: Duration,
}

impl CachedService {
    /// Wrap `inner`. `None` or a zero TTL uses [`DEFAULT_CACHE_TTL`].
    pub fn new(
        inner: Arc<dyn CompletionService>,
        cache: Arc<dyn ResponseCache>,
        ttl: Option<Duration>,
    ) -> Self {
        let ttl = ttl.filter(|ttl| !ttl.is_zero()).unwrap_or(DEFAULT_CACHE_TTL);
        Self { inner, cache, ttl }
    }

    /// Effective entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Caching layer over `cache`.
pub fn cache(cache: Arc<dyn ResponseCache>, ttl: Option<Duration>) -> Middleware {
    Box::new(move |inner| Arc::new(CachedService::new(inner, cache, ttl)))
}

#[async_trait]
impl CompletionService for CachedService {
    async fn complete(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        let key = cache_key(&request);

        if let Some(raw) = self.cache.get(&key).await {
            match serde_json::from_slice::<CompletionResponse>(&raw) {
                Ok(response) => {
                    tracing::debug!(model = %request.model, "cache hit");
                    return Ok(response);
                }
                Err(e) => tracing::debug!(error = %e, "undecodable cache entry, treating as miss"),
            }
        }

        tracing::trace!(model = %request.model, "cache miss");
        let response = self.inner.complete(cancel, request).await?;

        match serde_json::to_vec(&response) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(&key, raw, self.ttl).await {
                    tracing::warn!(error = %e, "failed to store cached response");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode response for cache"),
        }

        Ok(response)
    }

    async fn stream(
        &self,
        cancel: &CancellationToken,
        request: CompletionRequest,
    ) -> Result<CompletionStream> {
        self.inner.stream(cancel, request).await
    }

    fn model_info(&self, model: &str) -> Result<ModelInfo> {
        self.inner.model_info(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::stream::collect_stream;
    use crate::testing::ScriptedService;

    fn request(user: &str) -> CompletionRequest {
        CompletionRequest::new("gpt-4", user).with_system("sys")
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_within_ttl_hits_cache() {
        let inner = Arc::new(ScriptedService::new().always_ok("answer"));
        let service = cache(Arc::new(InMemoryCache::new()), Some(Duration::from_secs(60)))(inner.clone());
        let cancel = CancellationToken::new();

        let first = service.complete(&cancel, request("q")).await.unwrap();
        let second = service.complete(&cancel, request("q")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_calls_inner_again() {
        let inner = Arc::new(ScriptedService::new().always_ok("answer"));
        let service = cache(Arc::new(InMemoryCache::new()), Some(Duration::from_secs(60)))(inner.clone());
        let cancel = CancellationToken::new();

        service.complete(&cancel, request("q")).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        service.complete(&cancel, request("q")).await.unwrap();

        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_key_covers_model_system_and_user() {
        let inner = Arc::new(ScriptedService::new().always_ok("answer"));
        let service = cache(Arc::new(InMemoryCache::new()), None)(inner.clone());
        let cancel = CancellationToken::new();

        service.complete(&cancel, request("q")).await.unwrap();
        service.complete(&cancel, request("other")).await.unwrap();
        service
            .complete(&cancel, request("q").with_system("different"))
            .await
            .unwrap();
        let mut other_model = request("q");
        other_model.model = "gpt-3.5-turbo".into();
        service.complete(&cancel, other_model).await.unwrap();

        assert_eq!(inner.calls(), 4);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let inner = Arc::new(
            ScriptedService::new()
                .then_err(LlmError::Service("down".into()))
                .then_ok("recovered"),
        );
        let service = cache(Arc::new(InMemoryCache::new()), None)(inner.clone());
        let cancel = CancellationToken::new();

        assert!(service.complete(&cancel, request("q")).await.is_err());
        let response = service.complete(&cancel, request("q")).await.unwrap();

        assert_eq!(response.content, "recovered");
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let backend = Arc::new(InMemoryCache::new());
        backend
            .set(&cache_key(&request("q")), b"not json".to_vec(), DEFAULT_CACHE_TTL)
            .await
            .unwrap();
        let inner = Arc::new(ScriptedService::new().always_ok("fresh"));
        let service = cache(backend, None)(inner.clone());

        let response = service
            .complete(&CancellationToken::new(), request("q"))
            .await
            .unwrap();

        assert_eq!(response.content, "fresh");
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_stream_bypasses_cache() {
        let inner = Arc::new(ScriptedService::new().always_ok("streamed"));
        let service = cache(Arc::new(InMemoryCache::new()), None)(inner.clone());
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            let stream = service.stream(&cancel, request("q")).await.unwrap();
            let (text, _) = collect_stream(stream, &cancel).await.unwrap();
            assert_eq!(text, "streamed");
        }
        assert_eq!(inner.calls(), 2);
    }

    #[test]
    fn test_zero_ttl_uses_default() {
        let inner = Arc::new(ScriptedService::new());
        let service = CachedService::new(inner, Arc::new(InMemoryCache::new()), Some(Duration::ZERO));
        assert_eq!(service.ttl(), DEFAULT_CACHE_TTL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let backend = InMemoryCache::new();
        backend.set("a", vec![1], Duration::from_secs(1)).await.unwrap();
        backend.set("b", vec![2], Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(backend.get("a").await.is_none());
        assert_eq!(backend.purge_expired(), 1);
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.get("b").await, Some(vec![2]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_ttl_never_expires() {
        let inner = Arc::new(ScriptedService::new().always_ok("answer"));
        let service = cache(Arc::new(InMemoryCache::new()), Some(Duration::MAX))(inner.clone());
        let cancel = CancellationToken::new();

        service.complete(&cancel, request("q")).await.unwrap();
        tokio::time::advance(Duration::from_secs(10 * 365 * 24 * 60 * 60)).await;
        let response = service.complete(&cancel, request("q")).await.unwrap();

        assert_eq!(response.content, "answer");
        assert_eq!(inner.calls(), 1);
    }
}
