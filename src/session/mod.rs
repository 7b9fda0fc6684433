//! Session 모듈
//!
//! 인증 세션(토큰 + 사용자 프로필)과 인증 실패 브로드캐스터.
//!
//! - 세션은 TTL 없이 Durable Store에 직접 저장 (`token`, `user`, `key-configured`)
//! - 수명은 로그아웃/인증 실패로만 끝남
//! - 프로세스 시작 시 `hydrate()`로 1회 복원

pub mod broadcaster;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::VaultApi;
use crate::error::CoreError;
use crate::models::{Session, UserProfile};
use crate::store::{DurableStore, StoreKeys};

pub use broadcaster::{UnauthorizedBroadcaster, UnauthorizedHandler};

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    user: Option<UserProfile>,
    key_configured: bool,
    /// login/sign-out마다 증가. 진행 중이던 hydrate/refresh 결과가
    /// 더 새로운 상태를 덮어쓰지 않도록 비교용으로 사용
    epoch: u64,
}

/// Session Store
pub struct SessionStore {
    store: Arc<dyn DurableStore>,
    api: Arc<dyn VaultApi>,
    broadcaster: Arc<UnauthorizedBroadcaster>,
    keys: StoreKeys,
    state: RwLock<SessionState>,
    hydrated: watch::Sender<bool>,
}

impl SessionStore {
    pub fn new(
        store: Arc<dyn DurableStore>,
        api: Arc<dyn VaultApi>,
        broadcaster: Arc<UnauthorizedBroadcaster>,
        keys: StoreKeys,
    ) -> Self {
        let (hydrated, _) = watch::channel(false);
        Self {
            store,
            api,
            broadcaster,
            keys,
            state: RwLock::new(SessionState::default()),
            hydrated,
        }
    }

    /// 영속 저장소에서 세션 복원 (앱 시작 시 1회)
    ///
    /// 세 키를 한 번에 읽습니다. 손상된 `user`는 삭제하고 없는 것으로 취급하며,
    /// 읽기 자체가 실패해도 hydrated 플래그는 세워 "미인증"으로 확정합니다.
    pub async fn hydrate(&self) -> Result<(), CoreError> {
        let epoch = self.read_state().epoch;

        let values = match self.store.multi_get(&self.keys.session_keys()).await {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, "session hydration read failed");
                self.mark_hydrated();
                return Err(e);
            }
        };
        let mut values = values.into_iter();
        let token_raw = values.next().flatten();
        let user_raw = values.next().flatten();
        let flag_raw = values.next().flatten();

        let token = token_raw
            .and_then(|raw| String::from_utf8(raw).ok())
            .filter(|token| !token.trim().is_empty());

        let (user, user_corrupt) = match user_raw {
            Some(raw) => match serde_json::from_slice::<UserProfile>(&raw) {
                Ok(user) => (Some(user), false),
                Err(e) => {
                    warn!(error = %e, "discarding corrupt persisted user");
                    (None, true)
                }
            },
            None => (None, false),
        };

        let key_configured = flag_raw.as_deref() == Some(b"true".as_slice());

        let applied = {
            let mut state = self.write_state();
            if state.epoch == epoch {
                state.token = token.clone();
                state.user = user;
                state.key_configured = key_configured;
                true
            } else {
                false
            }
        };

        if applied {
            if token.is_some() {
                self.api.set_authorization(token.clone());
            }
            // 그 사이 로그인이 새 user를 썼다면 지우지 않음
            let still_current = self.read_state().epoch == epoch;
            if user_corrupt && still_current {
                if let Err(e) = self.store.remove(&self.keys.user()).await {
                    warn!(error = %e, "failed to remove corrupt user entry");
                }
            }
            info!(authenticated = token.is_some(), key_configured, "session hydrated");
        } else {
            debug!("session changed during hydration, keeping newer state");
        }

        self.mark_hydrated();
        Ok(())
    }

    /// login/sign-out마다 증가하는 세션 세대
    pub fn epoch(&self) -> u64 {
        self.read_state().epoch
    }

    /// hydrate 완료 여부 ("아직 모름"과 "미인증 확정" 구분)
    pub fn is_hydrated(&self) -> bool {
        *self.hydrated.borrow()
    }

    /// hydrate가 끝날 때까지 대기
    pub async fn wait_hydrated(&self) {
        let mut rx = self.hydrated.subscribe();
        // sender는 self가 들고 있으므로 닫히지 않음
        let _ = rx.wait_for(|hydrated| *hydrated).await;
    }

    /// 로그인 완료 처리
    ///
    /// 메모리 상태 → 전송 계층 토큰 → 영속 저장(세 키 일괄) 순서로 반영합니다.
    pub async fn complete_login(
        &self,
        token: &str,
        user: UserProfile,
        key_configured: bool,
    ) -> Result<(), CoreError> {
        if token.trim().is_empty() {
            return Err(CoreError::InvalidInput("Session token must not be empty.".to_string()));
        }
        let user_json = serde_json::to_vec(&user)?;
        let user_id = user.id.clone();

        {
            let mut state = self.write_state();
            state.epoch += 1;
            state.token = Some(token.to_string());
            state.user = Some(user);
            state.key_configured = key_configured;
        }
        self.api.set_authorization(Some(token.to_string()));
        self.mark_hydrated();

        let entries = vec![
            (self.keys.token(), token.as_bytes().to_vec()),
            (self.keys.user(), user_json),
            (self.keys.key_configured(), flag_bytes(key_configured)),
        ];
        if let Err(e) = self.store.multi_set(entries).await {
            warn!(error = %e, "failed to persist session, continuing in memory");
        }

        info!(user_id = %user_id, key_configured, "login completed");
        Ok(())
    }

    /// 로그아웃
    ///
    /// 세션이 이미 없으면 아무것도 하지 않고 false를 돌려줍니다 (멱등).
    pub async fn sign_out(&self) -> bool {
        let had_session = {
            let mut state = self.write_state();
            let had_session = state.token.is_some() || state.user.is_some();
            if !had_session && self.is_hydrated() {
                return false;
            }
            let epoch = state.epoch + 1;
            *state = SessionState {
                epoch,
                ..SessionState::default()
            };
            had_session
        };

        self.api.set_authorization(None);
        self.mark_hydrated();

        if let Err(e) = self.store.multi_remove(&self.keys.session_keys()).await {
            warn!(error = %e, "failed to remove persisted session");
        }

        if had_session {
            info!("signed out");
        }
        had_session
    }

    /// 백엔드에서 사용자 프로필을 다시 받아 덮어씀 (토큰은 유지)
    ///
    /// 토큰이 없으면 아무것도 하지 않습니다.
    pub async fn refresh_user(&self) -> Result<Option<UserProfile>, CoreError> {
        let Some(token) = self.token() else {
            debug!("refresh_user skipped: not authenticated");
            return Ok(None);
        };

        let user = self
            .broadcaster
            .intercept(self.api.fetch_current_user().await)
            .await?;

        {
            let mut state = self.write_state();
            if state.token.as_deref() != Some(token.as_str()) {
                debug!("session changed while refreshing user, discarding profile");
                return Ok(None);
            }
            state.user = Some(user.clone());
        }

        match serde_json::to_vec(&user) {
            Ok(json) => {
                if let Err(e) = self.store.set(&self.keys.user(), json).await {
                    warn!(error = %e, "failed to persist refreshed user");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize refreshed user"),
        }

        debug!(user_id = %user.id, "user refreshed");
        Ok(Some(user))
    }

    /// 백엔드 키 설정 여부 플래그 (로컬 키 캐시 TTL과 독립)
    pub async fn set_key_configured(&self, configured: bool) {
        self.write_state().key_configured = configured;
        if let Err(e) = self
            .store
            .set(&self.keys.key_configured(), flag_bytes(configured))
            .await
        {
            warn!(error = %e, "failed to persist key-configured flag");
        }
    }

    pub fn current(&self) -> Option<Session> {
        let state = self.read_state();
        state.token.as_ref().map(|token| Session {
            token: token.clone(),
            user: state.user.clone(),
            key_configured: state.key_configured,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_state().token.is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.read_state().token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read_state().user.clone()
    }

    pub fn key_configured(&self) -> bool {
        self.read_state().key_configured
    }

    fn mark_hydrated(&self) {
        self.hydrated.send_replace(true);
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn flag_bytes(value: bool) -> Vec<u8> {
    if value { b"true".to_vec() } else { b"false".to_vec() }
}
