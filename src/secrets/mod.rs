//! Secrets 모듈
//!
//! 잠금 해제 키와 복호화된 값의 노출 시간을 제한합니다.
//!
//! - `ttl`: 읽기 시점 만료 판정을 하는 TTL 캐시
//! - `key_cache`: TTL 캐시 단일 슬롯 위의 잠금 해제 키 캐시 (인코딩 저장)
//! - `reveal`: 레코드별 자동 숨김 타이머 (메모리 전용)

pub mod codec;
pub mod key_cache;
pub mod reveal;
pub mod ttl;

pub use key_cache::{SecretKeyCache, DEFAULT_KEY_TTL};
pub use reveal::{RevealRegistry, RevealState, DEFAULT_REVEAL_DELAY};
pub use ttl::{TtlCache, TtlEntry};
