//! 잠금 해제 키 명령어
//!
//! - 키 입력은 백엔드 확인 후에만 캐시
//! - 조회는 상태만 돌려주며 평문 키는 호스트로 내보내지 않음

use serde::{Deserialize, Serialize};

use crate::error::CommandResult;
use crate::state::VaultCore;

/// 키 입력 요청
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyArgs {
    pub key: String,
}

/// 키 상태
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatus {
    /// 로컬 캐시에 유효한 키가 있는지
    pub unlocked: bool,
    /// 백엔드에 키가 설정되어 있는지 (로컬 TTL과 독립)
    pub configured: bool,
    pub ttl_ms: u64,
}

impl KeyStatus {
    fn from_core(core: &VaultCore, unlocked: bool) -> Self {
        Self {
            unlocked,
            configured: core.sessions().key_configured(),
            ttl_ms: core.keys().ttl().as_millis() as u64,
        }
    }
}

/// 기존 키로 잠금 해제
pub async fn key_submit(core: &VaultCore, args: KeyArgs) -> CommandResult<KeyStatus> {
    core.unlock(&args.key).await?;
    Ok(KeyStatus::from_core(core, true))
}

/// 백엔드에 키 최초 설정
pub async fn key_configure(core: &VaultCore, args: KeyArgs) -> CommandResult<KeyStatus> {
    core.configure_key(&args.key).await?;
    Ok(KeyStatus::from_core(core, true))
}

/// 키 상태 조회 (필요 시 영속 캐시에서 복원)
pub async fn key_status(core: &VaultCore) -> KeyStatus {
    let unlocked = core.keys().get_key().await.is_some();
    KeyStatus::from_core(core, unlocked)
}

/// 키 캐시 비우기 (표시 중인 값도 함께 숨김)
pub async fn key_clear(core: &VaultCore) -> KeyStatus {
    core.lock().await;
    KeyStatus::from_core(core, false)
}
