//! Reveal 명령어
//!
//! 레코드를 복호화해 일정 시간만 표시합니다.
//! 만료 후 UI는 `reveal_get`으로 다시 조회해 Hidden을 확인해야 합니다.

use serde::Serialize;

use crate::error::CommandResult;
use crate::secrets::RevealState;
use crate::state::VaultCore;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealView {
    pub record_id: String,
    pub revealed: bool,
    pub plaintext: Option<String>,
    pub hide_after_ms: u64,
}

impl RevealView {
    fn new(core: &VaultCore, record_id: &str, state: RevealState) -> Self {
        let plaintext = state.plaintext().map(|s| s.to_string());
        Self {
            record_id: record_id.to_string(),
            revealed: plaintext.is_some(),
            plaintext,
            hide_after_ms: core.reveals().delay().as_millis() as u64,
        }
    }
}

pub async fn reveal_record(core: &VaultCore, record_id: String) -> CommandResult<RevealView> {
    core.reveal_record(&record_id).await?;
    let state = core.reveals().state(&record_id);
    Ok(RevealView::new(core, &record_id, state))
}

pub fn reveal_get(core: &VaultCore, record_id: String) -> RevealView {
    let state = core.reveals().state(&record_id);
    RevealView::new(core, &record_id, state)
}

pub fn reveal_hide(core: &VaultCore, record_id: String) -> RevealView {
    core.hide_record(&record_id);
    RevealView::new(core, &record_id, RevealState::Hidden)
}

/// 화면 이탈 시 호출
pub fn reveal_hide_all(core: &VaultCore) -> usize {
    core.hide_all()
}
