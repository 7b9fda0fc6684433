//! Remote Vault API
//!
//! 원격 vault 백엔드와의 경계. 전송 계층은 외부 협력자이며
//! 코어는 인증 토큰 설정과 응답 상태(401 여부)만 신경씁니다.

pub mod http;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{LoginGrant, UserProfile};

pub use http::HttpVaultApi;

/// 백엔드 호출 오류
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to send request: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Decode(String),
}

impl ApiError {
    /// 인증 실패 (401) 여부
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Status { status: 401, .. })
    }
}

/// 원격 vault 백엔드
///
/// 키 인자는 모두 인코딩된 형식(`secrets::codec::encode_key`)입니다.
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// 이후 요청의 Authorization 헤더 설정 (None이면 제거)
    fn set_authorization(&self, token: Option<String>);

    async fn login(&self, email: &str, password: &str) -> Result<LoginGrant, ApiError>;

    async fn fetch_current_user(&self) -> Result<UserProfile, ApiError>;

    /// 사용자가 입력한 키가 백엔드에 설정된 키와 일치하는지 확인
    async fn verify_encryption_key(&self, encoded_key: &str) -> Result<(), ApiError>;

    /// 백엔드에 잠금 해제 키 최초 설정
    async fn configure_encryption_key(&self, encoded_key: &str) -> Result<(), ApiError>;

    /// 레코드 복호화 요청
    async fn decrypt_record(&self, record_id: &str, encoded_key: &str)
        -> Result<String, ApiError>;
}
