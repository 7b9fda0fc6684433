//! Durable Store
//!
//! 호스트 플랫폼이 제공하는 영속 키-값 저장소 추상화.
//! 값은 바이트 문자열이며, 배치 연산은 함께 발행되고 함께 await 됩니다.
//! (크래시 시 배치 중간 상태가 남을 수 있음은 허용된 위험)

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CoreError;

/// 영속 키-값 저장소
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CoreError>;

    async fn remove(&self, key: &str) -> Result<(), CoreError>;

    /// 여러 키 한 번에 조회 (입력 순서대로 반환)
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CoreError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    async fn multi_set(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), CoreError> {
        for (key, value) in entries {
            self.set(&key, value).await?;
        }
        Ok(())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), CoreError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// 영속 키 이름 (namespace prefix 포함)
#[derive(Debug, Clone)]
pub struct StoreKeys {
    namespace: String,
}

impl StoreKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn token(&self) -> String {
        format!("{}token", self.namespace)
    }

    pub fn user(&self) -> String {
        format!("{}user", self.namespace)
    }

    pub fn key_configured(&self) -> String {
        format!("{}key-configured", self.namespace)
    }

    pub fn encryption_key(&self) -> String {
        format!("{}encryption-key", self.namespace)
    }

    /// 세션이 소유한 세 키 (token, user, key-configured)
    pub fn session_keys(&self) -> Vec<String> {
        vec![self.token(), self.user(), self.key_configured()]
    }
}

/// 메모리 저장소
///
/// 테스트와 휘발성 호스트에서 사용합니다. `fail_writes`로 쓰기 실패를 흉내낼 수 있습니다.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이후의 set/remove를 실패시킴 (저장 공간 부족 등)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn check_writable(&self) -> Result<(), CoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CoreError::Store("write rejected: storage unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CoreError> {
        self.check_writable()?;
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.check_writable()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn multi_set(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), CoreError> {
        self.check_writable()?;
        let mut map = self.entries.write().await;
        for (key, value) in entries {
            map.insert(key, value);
        }
        Ok(())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), CoreError> {
        self.check_writable()?;
        let mut map = self.entries.write().await;
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }
}

/// 다음 읽기 1회를 값을 읽은 직후 멈추는 저장소 (경합 테스트용)
#[cfg(test)]
pub(crate) struct GatedStore {
    pub inner: MemoryStore,
    armed: AtomicBool,
    /// 읽기가 멈춘 시점에 신호
    pub entered: tokio::sync::Notify,
    /// 멈춘 읽기를 재개
    pub release: tokio::sync::Notify,
}

#[cfg(test)]
impl GatedStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        }
    }

    async fn pause(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[cfg(test)]
#[async_trait]
impl DurableStore for GatedStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        let value = self.inner.get(key).await;
        self.pause().await;
        value
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CoreError> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.inner.remove(key).await
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CoreError> {
        let values = self.inner.multi_get(keys).await;
        self.pause().await;
        values
    }

    async fn multi_set(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), CoreError> {
        self.inner.multi_set(entries).await
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), CoreError> {
        self.inner.multi_remove(keys).await
    }
}
