//! Host Commands Module
//!
//! 호스트 UI(데스크톱/모바일 셸)에서 호출하는 명령어 정의.
//! 모든 실패는 `CommandError { code, message, details }`로 직렬화됩니다.

pub mod reveal;
pub mod secrets;
pub mod session;
