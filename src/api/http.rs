//! vault REST API 클라이언트
//!
//! reqwest로 백엔드를 직접 호출합니다. 응답 상태 해석만 하고
//! 401 처리(세션 정리)는 호출하는 쪽(`UnauthorizedBroadcaster::intercept`)이 담당합니다.

use std::sync::RwLock;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::api::{ApiError, VaultApi};
use crate::error::CoreError;
use crate::models::{LoginGrant, UserProfile};

/// 복호화 응답
#[derive(Debug, Deserialize)]
struct DecryptResponse {
    content: String,
}

pub struct HttpVaultApi {
    base: Url,
    http: reqwest::Client,
    /// Bearer 토큰 (세션 스토어가 설정)
    token: RwLock<Option<String>>,
}

impl HttpVaultApi {
    pub fn new(base: Url) -> Self {
        Self::with_client(base, reqwest::Client::new())
    }

    pub fn with_client(base: Url, http: reqwest::Client) -> Self {
        Self {
            base: normalize_base(base),
            http,
            token: RwLock::new(None),
        }
    }

    #[cfg(test)]
    fn has_authorization(&self) -> bool {
        self.token
            .read()
            .map(|t| t.is_some())
            .unwrap_or(false)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::Network(format!("Invalid endpoint {}: {}", path, e)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self.token.read().ok().and_then(|t| t.clone());
        match token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, ApiError> {
        let response = self
            .authorize(request)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("Failed to read response: {}", e)))?;

        debug!(status = status.as_u16(), "vault api response");
        check_status(status.as_u16(), body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let body = self.send(request).await?;
        parse_body(&body)
    }
}

#[async_trait]
impl VaultApi for HttpVaultApi {
    fn set_authorization(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    async fn login(&self, email: &str, password: &str) -> Result<LoginGrant, ApiError> {
        let url = self.endpoint("auth/login")?;
        let body = serde_json::json!({ "email": email, "password": password });
        self.send_json(self.http.post(url).json(&body)).await
    }

    async fn fetch_current_user(&self) -> Result<UserProfile, ApiError> {
        let url = self.endpoint("users/me")?;
        self.send_json(self.http.get(url)).await
    }

    async fn verify_encryption_key(&self, encoded_key: &str) -> Result<(), ApiError> {
        let url = self.endpoint("vault/key/verify")?;
        let body = serde_json::json!({ "key": encoded_key });
        self.send(self.http.post(url).json(&body)).await.map(|_| ())
    }

    async fn configure_encryption_key(&self, encoded_key: &str) -> Result<(), ApiError> {
        let url = self.endpoint("vault/key")?;
        let body = serde_json::json!({ "key": encoded_key });
        self.send(self.http.put(url).json(&body)).await.map(|_| ())
    }

    async fn decrypt_record(
        &self,
        record_id: &str,
        encoded_key: &str,
    ) -> Result<String, ApiError> {
        let url = self.endpoint(&format!("vault/records/{}/decrypt", record_id))?;
        let body = serde_json::json!({ "key": encoded_key });
        let response: DecryptResponse = self.send_json(self.http.post(url).json(&body)).await?;
        Ok(response.content)
    }
}

/// `join`이 마지막 세그먼트를 버리지 않도록 끝에 `/` 보장
fn normalize_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

fn check_status(status: u16, body: String) -> Result<String, ApiError> {
    if (200..300).contains(&status) {
        Ok(body)
    } else {
        Err(ApiError::Status { status, body })
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Decode(format!("{} - {}", e, body)))
}

/// 설정 문자열로부터 클라이언트 생성
pub fn client_from_base(base: &str) -> Result<HttpVaultApi, CoreError> {
    let url = Url::parse(base).map_err(|e| CoreError::Config(format!("Invalid API base URL: {}", e)))?;
    Ok(HttpVaultApi::new(url))
}
