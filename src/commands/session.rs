//! Session 명령어
//!
//! 호스트 UI가 세션 상태를 조회하고 로그인/로그아웃 하는 진입점.

use serde::{Deserialize, Serialize};

use crate::error::CommandResult;
use crate::models::{Session, UserProfile};
use crate::state::VaultCore;

/// 로그인 요청
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginArgs {
    pub email: String,
    pub password: String,
}

/// 세션 조회 결과
///
/// `is_hydrated`가 false면 아직 복원 전이므로 UI는 "미인증"으로 단정하면 안 됩니다.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub is_hydrated: bool,
    pub is_authenticated: bool,
    pub encryption_key_configured: bool,
    pub user: Option<UserProfile>,
}

impl SessionView {
    fn from_core(core: &VaultCore) -> Self {
        let sessions = core.sessions();
        let session: Option<Session> = sessions.current();
        Self {
            is_hydrated: sessions.is_hydrated(),
            is_authenticated: session.is_some(),
            encryption_key_configured: session.as_ref().is_some_and(|s| s.key_configured),
            user: session.and_then(|s| s.user),
        }
    }
}

/// 앱 시작 시 세션/키 복원
pub async fn session_hydrate(core: &VaultCore) -> CommandResult<SessionView> {
    core.start().await?;
    Ok(SessionView::from_core(core))
}

/// 현재 세션 조회 (I/O 없음)
pub fn session_get(core: &VaultCore) -> SessionView {
    SessionView::from_core(core)
}

pub async fn session_login(core: &VaultCore, args: LoginArgs) -> CommandResult<SessionView> {
    core.login(&args.email, &args.password).await?;
    Ok(SessionView::from_core(core))
}

pub async fn session_refresh_user(core: &VaultCore) -> CommandResult<SessionView> {
    core.refresh_user().await?;
    Ok(SessionView::from_core(core))
}

pub async fn session_sign_out(core: &VaultCore) -> SessionView {
    core.sign_out().await;
    SessionView::from_core(core)
}
