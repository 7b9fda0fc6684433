//! 코어 상태 (호스트가 보관)
//!
//! 저장소, 시계, 백엔드, 브로드캐스터, 세션/키/reveal 구성요소를 한 번에 묶습니다.
//! 인증 실패 브로드캐스터의 핸들러는 생성 시 자기 자신의 `sign_out`으로 연결됩니다.

use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::api::VaultApi;
use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::db::SqliteStore;
use crate::error::CoreError;
use crate::models::{Session, UserProfile};
use crate::secrets::codec::encode_key;
use crate::secrets::{RevealRegistry, SecretKeyCache, TtlCache};
use crate::session::{SessionStore, UnauthorizedBroadcaster};
use crate::store::{DurableStore, StoreKeys};

struct CoreInner {
    api: Arc<dyn VaultApi>,
    broadcaster: Arc<UnauthorizedBroadcaster>,
    sessions: SessionStore,
    keys: SecretKeyCache,
    reveals: RevealRegistry,
}

impl CoreInner {
    /// 세션 정리: 세션 → 키 캐시 → 표시 중인 값 순서
    ///
    /// 키와 표시 값은 세션 유무와 상관없이 항상 비웁니다.
    async fn teardown(&self) -> bool {
        let signed_out = self.sessions.sign_out().await;
        self.keys.clear_key().await;
        self.reveals.hide_all();
        signed_out
    }
}

/// vaultkeep 코어 핸들
#[derive(Clone)]
pub struct VaultCore {
    inner: Arc<CoreInner>,
}

impl VaultCore {
    pub fn new(
        config: &CoreConfig,
        store: Arc<dyn DurableStore>,
        api: Arc<dyn VaultApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store_keys = StoreKeys::new(config.namespace.clone());
        let broadcaster = Arc::new(UnauthorizedBroadcaster::new());

        let sessions = SessionStore::new(
            store.clone(),
            api.clone(),
            broadcaster.clone(),
            store_keys.clone(),
        );
        let keys = SecretKeyCache::new(
            TtlCache::new(store, clock),
            store_keys.encryption_key(),
            config.key_ttl(),
        );
        let reveals = RevealRegistry::new(config.reveal_delay());

        let inner = Arc::new(CoreInner {
            api,
            broadcaster: broadcaster.clone(),
            sessions,
            keys,
            reveals,
        });

        // 핸들러가 코어를 강하게 잡으면 순환 참조가 되므로 Weak 사용
        let weak: Weak<CoreInner> = Arc::downgrade(&inner);
        broadcaster.register(move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.teardown().await;
                }
                Ok::<(), CoreError>(())
            }
        });

        Self { inner }
    }

    /// 설정의 DB 경로로 SQLite 저장소를 열어 생성
    pub fn open(config: &CoreConfig, api: Arc<dyn VaultApi>) -> Result<Self, CoreError> {
        let path = config
            .database_path
            .as_ref()
            .ok_or_else(|| CoreError::Config("database_path is not set".to_string()))?;
        let store = Arc::new(SqliteStore::open(path)?);
        Ok(Self::new(config, store, api, Arc::new(SystemClock)))
    }

    /// 앱 시작 시 1회: 세션 복원 + 키 캐시 복원
    pub async fn start(&self) -> Result<(), CoreError> {
        self.inner.sessions.hydrate().await?;
        if self.inner.sessions.is_authenticated() {
            let restored = self.inner.keys.get_key().await.is_some();
            debug!(restored, "unlock key restore attempted");
        }
        Ok(())
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    pub fn keys(&self) -> &SecretKeyCache {
        &self.inner.keys
    }

    pub fn reveals(&self) -> &RevealRegistry {
        &self.inner.reveals
    }

    pub fn broadcaster(&self) -> &Arc<UnauthorizedBroadcaster> {
        &self.inner.broadcaster
    }

    pub fn current_session(&self) -> Option<Session> {
        self.inner.sessions.current()
    }

    /// 이메일/비밀번호 로그인
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, CoreError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(CoreError::InvalidInput(
                "Email and password are required.".to_string(),
            ));
        }
        let grant = self
            .inner
            .broadcaster
            .intercept(self.inner.api.login(email.trim(), password).await)
            .await?;
        self.inner
            .sessions
            .complete_login(&grant.token, grant.user, grant.key_configured)
            .await?;
        self.inner
            .sessions
            .current()
            .ok_or_else(|| CoreError::Store("session missing after login".to_string()))
    }

    pub async fn refresh_user(&self) -> Result<Option<UserProfile>, CoreError> {
        self.inner.sessions.refresh_user().await
    }

    /// 사용자가 입력한 잠금 해제 키를 백엔드에서 확인한 뒤 캐시
    pub async fn unlock(&self, raw_key: &str) -> Result<(), CoreError> {
        if raw_key.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "Unlock key must not be empty.".to_string(),
            ));
        }
        let encoded = encode_key(raw_key);
        self.inner
            .broadcaster
            .intercept(self.inner.api.verify_encryption_key(&encoded).await)
            .await?;
        self.inner.keys.set_key(raw_key).await?;
        info!("vault unlocked");
        Ok(())
    }

    /// 백엔드에 잠금 해제 키를 처음 설정
    pub async fn configure_key(&self, raw_key: &str) -> Result<(), CoreError> {
        if raw_key.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "Unlock key must not be empty.".to_string(),
            ));
        }
        let encoded = encode_key(raw_key);
        self.inner
            .broadcaster
            .intercept(self.inner.api.configure_encryption_key(&encoded).await)
            .await?;
        self.inner.sessions.set_key_configured(true).await;
        self.inner.keys.set_key(raw_key).await?;
        info!("unlock key configured");
        Ok(())
    }

    pub async fn lock(&self) {
        self.inner.keys.clear_key().await;
        self.inner.reveals.hide_all();
    }

    /// 레코드 복호화 후 일정 시간 표시
    ///
    /// 캐시된 키가 없으면 `KeyRequired`. 복호화가 401이면 키 캐시를 비우고
    /// 해당 레코드를 숨긴 뒤 브로드캐스터를 1번 발화합니다.
    ///
    /// 복호화 응답을 기다리는 동안 로그아웃/재로그인이 있었으면 `Unauthorized`,
    /// 키가 잠기거나 바뀌었으면 `KeyRequired`로 끝나며 평문은 버립니다.
    pub async fn reveal_record(&self, record_id: &str) -> Result<Zeroizing<String>, CoreError> {
        if record_id.trim().is_empty() {
            return Err(CoreError::InvalidInput("Record id must not be empty.".to_string()));
        }
        let epoch = self.inner.sessions.epoch();
        let Some(encoded) = self.inner.keys.get_key().await else {
            return Err(CoreError::KeyRequired);
        };
        let key_generation = self.inner.keys.generation();

        let result = self.inner.api.decrypt_record(record_id, &encoded).await;
        if let Err(e) = &result {
            if e.is_unauthorized() {
                warn!(record_id, "decrypt rejected, dropping cached unlock key");
                self.inner.keys.clear_key().await;
                self.inner.reveals.hide(record_id);
            }
        }
        let plaintext = Zeroizing::new(self.inner.broadcaster.intercept(result).await?);

        if self.inner.sessions.epoch() != epoch {
            warn!(record_id, "session changed during decrypt, discarding plaintext");
            return Err(CoreError::Unauthorized);
        }
        if self.inner.keys.generation() != key_generation {
            warn!(record_id, "unlock key changed during decrypt, discarding plaintext");
            return Err(CoreError::KeyRequired);
        }

        self.inner.reveals.reveal(record_id, plaintext.as_str());
        Ok(plaintext)
    }

    pub fn hide_record(&self, record_id: &str) -> bool {
        self.inner.reveals.hide(record_id)
    }

    pub fn hide_all(&self) -> usize {
        self.inner.reveals.hide_all()
    }

    /// 로그아웃 (멱등)
    pub async fn sign_out(&self) -> bool {
        self.inner.teardown().await
    }
}
