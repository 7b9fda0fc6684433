//! vaultkeep Data Models
//!
//! 백엔드/호스트 JSON과 매핑되는 Rust 데이터 모델

use serde::{Deserialize, Serialize};

/// 사용자 프로필
///
/// 백엔드가 내려준 그대로 직렬화되어 `user` 키에 저장됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "avatarUrl", default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(rename = "dateOfBirth", default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    /// 백엔드가 인코딩한 형태 그대로 보관 (복호화하지 않음)
    #[serde(rename = "secretAnswer", default, skip_serializing_if = "Option::is_none")]
    pub secret_answer: Option<String>,
}

/// 인증 세션
///
/// `user`는 손상된 프로필을 버린 직후(hydrate) `refresh_user` 전까지 비어 있을 수 있습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: String,
    pub user: Option<UserProfile>,
    #[serde(rename = "keyConfigured")]
    pub key_configured: bool,
}

/// 로그인 응답
#[derive(Debug, Clone, Deserialize)]
pub struct LoginGrant {
    pub token: String,
    pub user: UserProfile,
    #[serde(rename = "encryptionKeyConfigured", default)]
    pub key_configured: bool,
}
