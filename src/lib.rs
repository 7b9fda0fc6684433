//! vaultkeep - 클라이언트 세션/잠금 해제 키/레코드 표시 수명주기 코어
//!
//! 로그인 세션 영속화, TTL이 걸린 잠금 해제 키 캐시, 복호화된 값의 자동 숨김,
//! 인증 실패(401) 시 일괄 정리를 담당합니다.

pub mod api;
pub mod clock;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod secrets;
pub mod session;
pub mod state;
pub mod store;

pub use api::{ApiError, HttpVaultApi, VaultApi};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CoreConfig;
pub use db::SqliteStore;
pub use error::{CommandError, CommandResult, CoreError};
pub use models::{LoginGrant, Session, UserProfile};
pub use secrets::{RevealRegistry, RevealState, SecretKeyCache, TtlCache};
pub use session::{SessionStore, UnauthorizedBroadcaster};
pub use state::VaultCore;
pub use store::{DurableStore, MemoryStore, StoreKeys};

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "vaultkeep=info";

/// 로깅 초기화
///
/// `RUST_LOG`가 있으면 그 필터를, 없으면 `vaultkeep=info`를 사용합니다.
/// 호스트가 이미 subscriber를 설치했다면 아무 것도 하지 않습니다.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 환경 변수 기반 기본 구성으로 코어 생성
///
/// `.env.local`/`.env`를 읽고, HTTP 백엔드와 SQLite 저장소를 연결합니다.
pub fn bootstrap() -> Result<VaultCore, CoreError> {
    init_tracing();
    let config = CoreConfig::from_env()?;
    let api = Arc::new(api::http::client_from_base(&config.api_base_url)?);
    let core = VaultCore::open(&config, api)?;
    tracing::info!(
        namespace = %config.namespace,
        key_ttl_ms = config.key_ttl_ms,
        "vaultkeep core ready"
    );
    Ok(core)
}
