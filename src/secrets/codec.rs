//! 잠금 해제 키 인코딩
//!
//! 저장/전송 형식은 평문 키의 base64(STANDARD) 표현입니다.
//! 가역 인코딩이며 암호화가 아닙니다. 백엔드 계약이 이 형식을 기대합니다.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use zeroize::Zeroizing;

use crate::error::CoreError;

/// 평문 키 → 인코딩 형식
pub fn encode_key(raw: &str) -> Zeroizing<String> {
    Zeroizing::new(BASE64.encode(raw.as_bytes()))
}

/// 인코딩 형식 → 평문 키
pub fn decode_key(encoded: &str) -> Result<Zeroizing<String>, CoreError> {
    let bytes = Zeroizing::new(
        BASE64
            .decode(encoded)
            .map_err(|e| CoreError::InvalidInput(format!("malformed encoded key: {}", e)))?,
    );
    let text = std::str::from_utf8(&bytes)
        .map_err(|_| CoreError::InvalidInput("encoded key is not UTF-8".to_string()))?;
    Ok(Zeroizing::new(text.to_string()))
}
