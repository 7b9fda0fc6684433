//! Secret Key Cache - 잠금 해제 키 단일 슬롯 캐시
//!
//! - 키는 인코딩된 형태로만 저장 (`encryption-key`, 고정 TTL)
//! - 프로세스 수명 동안은 메모리 미러로 동기 조회
//! - 앱 재시작 후 첫 조회 시 TTL 캐시에서 1회 복원
//! - 미러도 만료 시각을 들고 있어 TTL보다 오래된 키는 절대 반환하지 않음
//! - 미러가 바뀔 때마다 세대(generation)가 증가. 진행 중이던 복원/복호화는
//!   세대를 비교해 그 사이 set/clear가 있었는지 판단

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::error::CoreError;
use crate::secrets::codec::{decode_key, encode_key};
use crate::secrets::ttl::{ttl_millis, TtlCache};

/// 기본 TTL (5분)
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(5 * 60);

/// 메모리 미러 (drop 시 zeroize)
struct MirroredKey {
    encoded: Zeroizing<String>,
    expires_at: Option<i64>,
}

impl MirroredKey {
    fn is_live(&self, now_ms: i64) -> bool {
        !matches!(self.expires_at, Some(at) if now_ms >= at)
    }
}

#[derive(Default)]
struct Mirror {
    key: Option<MirroredKey>,
    generation: u64,
}

pub struct SecretKeyCache {
    cache: TtlCache,
    storage_key: String,
    ttl: Duration,
    mirror: RwLock<Mirror>,
    /// 영속 저장소에서 한 번이라도 복원(또는 set/clear)했는지
    hydrated: AtomicBool,
}

impl SecretKeyCache {
    pub fn new(cache: TtlCache, storage_key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            cache,
            storage_key: storage_key.into(),
            ttl,
            mirror: RwLock::new(Mirror::default()),
            hydrated: AtomicBool::new(false),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 미러 세대. set/clear/만료 정리마다 증가
    pub fn generation(&self) -> u64 {
        self.read_mirror().generation
    }

    fn clock(&self) -> &Arc<dyn Clock> {
        self.cache.clock()
    }

    /// 키 저장
    ///
    /// 공백 입력은 I/O 전에 거부합니다. 영속 쓰기 실패는 로그만 남기고
    /// 메모리 미러를 기준으로 계속 동작합니다. TTL은 매번 새로 시작됩니다.
    pub async fn set_key(&self, raw: &str) -> Result<(), CoreError> {
        if raw.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "Unlock key must not be empty.".to_string(),
            ));
        }

        let encoded = encode_key(raw);
        let fallback_expiry = self
            .clock()
            .now_ms()
            .saturating_add(ttl_millis(self.ttl));

        let expires_at = match self
            .cache
            .set(&self.storage_key, &*encoded, Some(self.ttl))
            .await
        {
            Ok(expires_at) => expires_at,
            Err(e) => {
                warn!(error = %e, "failed to persist unlock key, keeping in-memory copy");
                Some(fallback_expiry)
            }
        };

        self.replace_mirror(Some(MirroredKey {
            encoded,
            expires_at,
        }));
        self.hydrated.store(true, Ordering::SeqCst);

        info!(ttl_ms = self.ttl.as_millis() as u64, "unlock key cached");
        Ok(())
    }

    /// 인코딩된 키 조회
    ///
    /// 미러가 있으면 미러를, 아직 복원 전이면 TTL 캐시를 통해 읽습니다.
    pub async fn get_key(&self) -> Option<Zeroizing<String>> {
        let now = self.clock().now_ms();

        if let Some(encoded) = self.live_mirror(now) {
            return Some(encoded);
        }

        if self.has_stale_mirror(now) {
            debug!("unlock key expired in memory, clearing");
            self.replace_mirror(None);
            if let Err(e) = self.cache.remove(&self.storage_key).await {
                warn!(error = %e, "failed to remove expired unlock key");
            }
            return None;
        }

        if self.hydrated.swap(true, Ordering::SeqCst) {
            return None;
        }

        let generation = self.generation();
        match self.cache.get_entry::<String>(&self.storage_key).await {
            Ok(Some(entry)) => {
                let encoded = Zeroizing::new(entry.value);
                let restored = MirroredKey {
                    encoded: encoded.clone(),
                    expires_at: entry.expires_at,
                };
                if !self.install_if_unchanged(generation, restored) {
                    debug!("unlock key changed while restoring, keeping newer value");
                    return self.live_mirror(self.clock().now_ms());
                }
                debug!(expires_at = ?entry.expires_at, "unlock key restored from store");
                Some(encoded)
            }
            Ok(None) => self.live_mirror(self.clock().now_ms()),
            Err(e) => {
                warn!(error = %e, "failed to read unlock key from store");
                // 다음 호출에서 다시 시도
                if self.generation() == generation {
                    self.hydrated.store(false, Ordering::SeqCst);
                }
                None
            }
        }
    }

    /// 미러에서 평문 키 파생 (저장하지 않음)
    pub fn decoded_key(&self) -> Option<Zeroizing<String>> {
        let encoded = self.live_mirror(self.clock().now_ms())?;
        match decode_key(&encoded) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!(error = %e, "cached unlock key could not be decoded");
                None
            }
        }
    }

    /// 메모리 미러 기준 동기 확인 (I/O 없음)
    pub fn has_key(&self) -> bool {
        self.live_mirror(self.clock().now_ms()).is_some()
    }

    /// 키 삭제 (영속 + 미러)
    pub async fn clear_key(&self) {
        self.replace_mirror(None);
        self.hydrated.store(true, Ordering::SeqCst);
        if let Err(e) = self.cache.remove(&self.storage_key).await {
            warn!(error = %e, "failed to remove unlock key from store");
        }
        debug!("unlock key cleared");
    }

    fn live_mirror(&self, now_ms: i64) -> Option<Zeroizing<String>> {
        self.read_mirror()
            .key
            .as_ref()
            .filter(|key| key.is_live(now_ms))
            .map(|key| key.encoded.clone())
    }

    fn has_stale_mirror(&self, now_ms: i64) -> bool {
        self.read_mirror()
            .key
            .as_ref()
            .is_some_and(|key| !key.is_live(now_ms))
    }

    fn replace_mirror(&self, next: Option<MirroredKey>) {
        let mut mirror = self.write_mirror();
        mirror.key = next;
        mirror.generation += 1;
    }

    // 복원 중에 set/clear가 끼어들었으면 설치하지 않음
    fn install_if_unchanged(&self, generation: u64, key: MirroredKey) -> bool {
        let mut mirror = self.write_mirror();
        if mirror.generation != generation {
            return false;
        }
        mirror.key = Some(key);
        mirror.generation += 1;
        true
    }

    fn read_mirror(&self) -> RwLockReadGuard<'_, Mirror> {
        self.mirror.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_mirror(&self) -> RwLockWriteGuard<'_, Mirror> {
        self.mirror.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{DurableStore, GatedStore, MemoryStore};

    const KEY: &str = "vk:encryption-key";

    fn key_cache(store: Arc<MemoryStore>, clock: Arc<ManualClock>) -> SecretKeyCache {
        SecretKeyCache::new(
            TtlCache::new(store, clock),
            KEY,
            Duration::from_millis(300_000),
        )
    }

    #[tokio::test]
    async fn test_key_expires_at_ttl_boundary() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let keys = key_cache(store.clone(), clock.clone());

        keys.set_key("1234").await.unwrap();

        clock.set(299_999);
        assert_eq!(keys.decoded_key().unwrap().as_str(), "1234");
        assert!(keys.get_key().await.is_some());

        clock.set(300_001);
        assert!(keys.get_key().await.is_none());
        assert!(keys.decoded_key().is_none());
        assert!(!store.contains(KEY).await);
    }

    #[tokio::test]
    async fn test_restores_after_relaunch_within_ttl() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        key_cache(store.clone(), clock.clone())
            .set_key("hunter2")
            .await
            .unwrap();

        clock.set(120_000);
        let relaunched = key_cache(store.clone(), clock.clone());
        assert!(!relaunched.has_key());
        assert!(relaunched.get_key().await.is_some());
        assert_eq!(relaunched.decoded_key().unwrap().as_str(), "hunter2");

        // 복원된 미러도 원래 만료 시각을 따름
        clock.set(300_000);
        assert!(relaunched.decoded_key().is_none());
    }

    #[tokio::test]
    async fn test_relaunch_after_ttl_finds_nothing() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        key_cache(store.clone(), clock.clone())
            .set_key("hunter2")
            .await
            .unwrap();

        clock.set(400_000);
        let relaunched = key_cache(store.clone(), clock.clone());
        assert!(relaunched.get_key().await.is_none());
        assert!(!store.contains(KEY).await);
    }

    #[tokio::test]
    async fn test_plaintext_is_never_persisted() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let keys = key_cache(store.clone(), clock);
        keys.set_key("plain-secret").await.unwrap();

        let raw = store.get(KEY).await.unwrap().unwrap();
        let raw = String::from_utf8(raw).unwrap();
        assert!(!raw.contains("plain-secret"));
        assert!(raw.contains(encode_key("plain-secret").as_str()));
    }

    #[tokio::test]
    async fn test_blank_key_rejected_without_io() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let keys = key_cache(store.clone(), clock);

        let result = keys.set_key("   ").await;
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
        assert!(store.is_empty().await);
        assert!(!keys.has_key());
    }

    #[tokio::test]
    async fn test_set_again_restarts_ttl() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let keys = key_cache(store, clock.clone());

        keys.set_key("a").await.unwrap();
        clock.set(200_000);
        keys.set_key("b").await.unwrap();
        clock.set(450_000);
        assert_eq!(keys.decoded_key().unwrap().as_str(), "b");
        clock.set(500_000);
        assert!(keys.decoded_key().is_none());
    }

    #[tokio::test]
    async fn test_write_failure_keeps_mirror() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let keys = key_cache(store.clone(), clock.clone());

        store.set_fail_writes(true);
        keys.set_key("offline").await.unwrap();
        assert_eq!(keys.decoded_key().unwrap().as_str(), "offline");
        assert!(!store.contains(KEY).await);

        clock.set(300_000);
        assert!(keys.get_key().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_key() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let keys = key_cache(store.clone(), clock);

        keys.set_key("1234").await.unwrap();
        keys.clear_key().await;
        assert!(!keys.has_key());
        assert!(keys.get_key().await.is_none());
        assert!(!store.contains(KEY).await);
    }

    #[tokio::test]
    async fn test_restore_does_not_overwrite_key_set_meanwhile() {
        let seed = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        key_cache(seed.clone(), clock.clone())
            .set_key("old")
            .await
            .unwrap();

        let inner = MemoryStore::new();
        inner
            .set(KEY, seed.get(KEY).await.unwrap().unwrap())
            .await
            .unwrap();
        let store = Arc::new(GatedStore::new(inner));
        let keys = Arc::new(SecretKeyCache::new(
            TtlCache::new(store.clone(), clock.clone()),
            KEY,
            Duration::from_millis(300_000),
        ));

        let restoring = {
            let keys = keys.clone();
            tokio::spawn(async move { keys.get_key().await })
        };
        store.entered.notified().await;
        keys.set_key("new").await.unwrap();
        store.release.notify_one();

        let returned = restoring.await.unwrap().unwrap();
        assert_eq!(returned.as_str(), encode_key("new").as_str());
        assert_eq!(keys.decoded_key().unwrap().as_str(), "new");
    }

    #[tokio::test]
    async fn test_generation_moves_on_every_change() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let keys = key_cache(store, clock);

        let g0 = keys.generation();
        keys.set_key("1234").await.unwrap();
        let g1 = keys.generation();
        assert!(g1 > g0);
        assert!(keys.get_key().await.is_some());
        assert_eq!(keys.generation(), g1);
        keys.clear_key().await;
        assert!(keys.generation() > g1);
    }

    #[tokio::test]
    async fn test_huge_ttl_keeps_key_alive() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let keys = SecretKeyCache::new(
            TtlCache::new(store.clone(), clock.clone()),
            KEY,
            Duration::from_millis(u64::MAX),
        );

        keys.set_key("1234").await.unwrap();
        clock.advance(1_000_000_000);
        assert!(keys.has_key());

        store.set_fail_writes(true);
        keys.set_key("5678").await.unwrap();
        clock.advance(1_000_000_000);
        assert_eq!(keys.decoded_key().unwrap().as_str(), "5678");
    }
}
