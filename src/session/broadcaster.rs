//! Unauthorized Broadcaster
//!
//! 백엔드가 인증 실패(401)를 알리면 등록된 단일 핸들러(세션 정리)를 실행합니다.
//!
//! - 핸들러는 1개 (마지막 등록이 이김)
//! - `notify()`는 실패/패닉한 핸들러도 삼키고 절대 에러를 올리지 않음
//! - 호출자는 핸들러 완료까지 await 한 뒤 원래 에러를 전파

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::api::ApiError;
use crate::error::CoreError;

pub type UnauthorizedHandler =
    Arc<dyn Fn() -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync>;

#[derive(Default)]
pub struct UnauthorizedBroadcaster {
    handler: RwLock<Option<UnauthorizedHandler>>,
    notifications: AtomicU64,
}

impl UnauthorizedBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// 핸들러 등록 (기존 핸들러 교체)
    pub fn register<F, Fut>(&self, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        let handler: UnauthorizedHandler = Arc::new(move || handler().boxed());
        let mut slot = self.handler.write().unwrap_or_else(|e| e.into_inner());
        if slot.replace(handler).is_some() {
            debug!("unauthorized handler replaced");
        }
    }

    pub fn unregister(&self) {
        let mut slot = self.handler.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    pub fn has_handler(&self) -> bool {
        self.handler
            .read()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// 지금까지 받은 인증 실패 알림 수
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::SeqCst)
    }

    /// 인증 실패 1건 알림
    pub async fn notify(&self) {
        let count = self.notifications.fetch_add(1, Ordering::SeqCst) + 1;
        let handler = self
            .handler
            .read()
            .ok()
            .and_then(|slot| slot.clone());

        let Some(handler) = handler else {
            debug!(count, "unauthorized notification with no handler registered");
            return;
        };

        info!(count, "authorization failure, running session teardown");

        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| handler())) {
            Ok(future) => future,
            Err(_) => {
                error!("unauthorized handler panicked");
                return;
            }
        };

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "unauthorized handler failed"),
            Err(_) => error!("unauthorized handler panicked"),
        }
    }

    /// 백엔드 응답 검사
    ///
    /// 401이면 `notify()`를 정확히 1번 await 한 뒤 `CoreError::Unauthorized`를 돌려줍니다.
    pub async fn intercept<T>(&self, result: Result<T, ApiError>) -> Result<T, CoreError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_unauthorized() => {
                self.notify().await;
                Err(CoreError::Unauthorized)
            }
            Err(e) => Err(e.into()),
        }
    }
}
