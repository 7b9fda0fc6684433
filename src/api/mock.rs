//! 테스트용 VaultApi

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::{ApiError, VaultApi};
use crate::models::{LoginGrant, UserProfile};

pub(crate) fn user(id: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        avatar_url: Some("https://cdn.example.com/ada.png".to_string()),
        date_of_birth: Some("1815-12-10".to_string()),
        secret_answer: Some("Q2hhcmxlcw==".to_string()),
    }
}

pub(crate) fn unauthorized() -> ApiError {
    ApiError::Status {
        status: 401,
        body: "token expired".to_string(),
    }
}

#[derive(Default)]
pub(crate) struct MockVaultApi {
    pub authorization: Mutex<Option<String>>,
    pub authorization_clears: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub decrypt_calls: AtomicUsize,
    pub profile: Mutex<Option<Result<UserProfile, ApiError>>>,
    pub login_result: Mutex<Option<Result<LoginGrant, ApiError>>>,
    pub verify_result: Mutex<Option<ApiError>>,
    pub configure_result: Mutex<Option<ApiError>>,
    pub records: Mutex<HashMap<String, Result<String, ApiError>>>,
    pub last_key: Mutex<Option<String>>,
}

impl MockVaultApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, result: Result<UserProfile, ApiError>) -> Self {
        *self.profile.lock().unwrap() = Some(result);
        self
    }

    pub fn with_record(self, id: &str, result: Result<String, ApiError>) -> Self {
        self.records.lock().unwrap().insert(id.to_string(), result);
        self
    }

    pub fn current_authorization(&self) -> Option<String> {
        self.authorization.lock().unwrap().clone()
    }
}

#[async_trait]
impl VaultApi for MockVaultApi {
    fn set_authorization(&self, token: Option<String>) {
        if token.is_none() {
            self.authorization_clears.fetch_add(1, Ordering::SeqCst);
        }
        *self.authorization.lock().unwrap() = token;
    }

    async fn login(&self, _email: &str, _password: &str) -> Result<LoginGrant, ApiError> {
        self.login_result.lock().unwrap().clone().unwrap_or_else(|| {
            Ok(LoginGrant {
                token: "abc".to_string(),
                user: user("u1"),
                key_configured: false,
            })
        })
    }

    async fn fetch_current_user(&self) -> Result<UserProfile, ApiError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.profile
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(user("u1")))
    }

    async fn verify_encryption_key(&self, encoded_key: &str) -> Result<(), ApiError> {
        *self.last_key.lock().unwrap() = Some(encoded_key.to_string());
        match self.verify_result.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn configure_encryption_key(&self, encoded_key: &str) -> Result<(), ApiError> {
        *self.last_key.lock().unwrap() = Some(encoded_key.to_string());
        match self.configure_result.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn decrypt_record(
        &self,
        record_id: &str,
        encoded_key: &str,
    ) -> Result<String, ApiError> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_key.lock().unwrap() = Some(encoded_key.to_string());
        self.records
            .lock()
            .unwrap()
            .get(record_id)
            .cloned()
            .unwrap_or_else(|| {
                Err(ApiError::Status {
                    status: 404,
                    body: "record not found".to_string(),
                })
            })
    }
}
