//! TTL Cache
//!
//! Durable Store 위에 만료 메타데이터를 덧씌웁니다.
//! - 만료는 읽을 때만 판정 (백그라운드 sweep 없음)
//! - 만료/손상 엔트리는 읽는 순간 저장소에서 삭제하고 "없음"으로 취급

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::CoreError;
use crate::store::DurableStore;

/// 저장 형식: `{"value": ..., "expiresAt": <ms|null>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtlEntry<V> {
    pub value: V,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl<V> TtlEntry<V> {
    /// `now >= expires_at`이면 만료
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at, Some(at) if now_ms >= at)
    }
}

/// TTL → 밀리초 (i64 범위를 넘으면 포화)
pub(crate) fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 엔트리 기록. 기존 엔트리는 만료 여부와 상관없이 덮어씀.
    ///
    /// 기록된 만료 시각을 돌려줍니다.
    pub async fn set<V: Serialize>(
        &self,
        key: &str,
        value: &V,
        ttl: Option<Duration>,
    ) -> Result<Option<i64>, CoreError> {
        let expires_at = ttl.map(|ttl| self.clock.now_ms().saturating_add(ttl_millis(ttl)));
        let entry = TtlEntry { value, expires_at };
        let payload = serde_json::to_vec(&entry)?;
        self.store.set(key, payload).await?;
        Ok(expires_at)
    }

    pub async fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>, CoreError> {
        Ok(self.get_entry(key).await?.map(|entry| entry.value))
    }

    /// 만료 메타데이터까지 포함해 조회
    pub async fn get_entry<V: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<TtlEntry<V>>, CoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };

        let entry: TtlEntry<V> = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "corrupt cache entry, purging");
                self.purge(key).await;
                return Ok(None);
            }
        };

        if entry.is_expired(self.clock.now_ms()) {
            debug!(key, expires_at = ?entry.expires_at, "cache entry expired, purging");
            self.purge(key).await;
            return Ok(None);
        }

        Ok(Some(entry))
    }

    pub async fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.store.remove(key).await
    }

    // 읽기 경로의 삭제 실패는 호출자에게 올리지 않음
    async fn purge(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            warn!(key, error = %e, "failed to purge cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn cache() -> (TtlCache, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let cache = TtlCache::new(store.clone(), clock.clone());
        (cache, store, clock)
    }

    #[tokio::test]
    async fn test_get_before_expiry_returns_exact_value() {
        let (cache, _, clock) = cache();
        cache
            .set("k", &"  spaced value ".to_string(), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        clock.advance(9_999);
        let value: Option<String> = cache.get("k").await.unwrap();
        assert_eq!(value.as_deref(), Some("  spaced value "));
    }

    #[tokio::test]
    async fn test_expired_entry_is_purged_on_read() {
        let (cache, store, clock) = cache();
        cache
            .set("k", &"v".to_string(), Some(Duration::from_millis(100)))
            .await
            .unwrap();

        clock.set(100);
        let value: Option<String> = cache.get("k").await.unwrap();
        assert!(value.is_none());
        assert!(!store.contains("k").await);
    }

    #[tokio::test]
    async fn test_entry_without_ttl_never_expires() {
        let (cache, _, clock) = cache();
        cache.set("k", &42u32, None).await.unwrap();
        clock.advance(i64::MAX / 2);
        assert_eq!(cache.get::<u32>("k").await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_huge_ttl_saturates_instead_of_wrapping() {
        let (cache, _, clock) = cache();
        clock.set(1_000);
        let expires_at = cache.set("k", &"v".to_string(), Some(Duration::MAX)).await.unwrap();
        assert_eq!(expires_at, Some(i64::MAX));

        clock.advance(10_000_000);
        assert_eq!(cache.get::<String>("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(ttl_millis(Duration::from_millis(u64::MAX)), i64::MAX);
        assert_eq!(ttl_millis(Duration::from_secs(300)), 300_000);
    }

    #[tokio::test]
    async fn test_set_overwrites_expired_entry() {
        let (cache, _, clock) = cache();
        cache
            .set("k", &"old".to_string(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        clock.advance(50);
        cache
            .set("k", &"new".to_string(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(cache.get::<String>("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_purged_not_raised() {
        let (cache, store, _) = cache();
        store.set("k", b"{not json".to_vec()).await.unwrap();

        let value: Option<String> = cache.get("k").await.unwrap();
        assert!(value.is_none());
        assert!(!store.contains("k").await);
    }

    #[tokio::test]
    async fn test_purge_failure_is_swallowed() {
        let (cache, store, clock) = cache();
        cache
            .set("k", &"v".to_string(), Some(Duration::from_millis(1)))
            .await
            .unwrap();
        clock.advance(5);
        store.set_fail_writes(true);

        let value: Option<String> = cache.get("k").await.unwrap();
        assert!(value.is_none());
        assert!(store.contains("k").await);
    }

    #[tokio::test]
    async fn test_persisted_shape() {
        let (cache, store, clock) = cache();
        clock.set(1_000);
        cache
            .set("k", &"v".to_string(), Some(Duration::from_millis(500)))
            .await
            .unwrap();
        let raw = store.get("k").await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["value"], "v");
        assert_eq!(json["expiresAt"], 1_500);
    }
}
