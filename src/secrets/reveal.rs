//! Reveal Timeout Registry
//!
//! 복호화된 레코드 값을 잠깐 보여준 뒤 자동으로 잊습니다.
//!
//! - 레코드 ID당 최대 1개의 `Revealed` 슬롯 (슬롯 없음 = `Hidden`)
//! - 같은 ID로 다시 reveal 하면 기존 타이머를 취소하고 교체 (중첩 없음)
//! - 취소는 타이머 abort + 세대(generation) 비교로 확정됨:
//!   이미 깨어난 타이머라도 세대가 다르면 아무것도 지우지 않음
//! - 평문은 메모리에만 존재하며 drop 시 zeroize

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;
use zeroize::Zeroizing;

/// 기본 표시 시간 (5초)
pub const DEFAULT_REVEAL_DELAY: Duration = Duration::from_secs(5);

/// 레코드 표시 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealState {
    Hidden,
    Revealed(Zeroizing<String>),
}

impl RevealState {
    pub fn plaintext(&self) -> Option<&str> {
        match self {
            RevealState::Hidden => None,
            RevealState::Revealed(text) => Some(text.as_str()),
        }
    }
}

struct RevealSlot {
    plaintext: Zeroizing<String>,
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct Slots {
    entries: HashMap<String, RevealSlot>,
    next_generation: u64,
}

pub struct RevealRegistry {
    slots: Arc<Mutex<Slots>>,
    delay: Duration,
}

impl RevealRegistry {
    pub fn new(delay: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots::default())),
            delay,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// 레코드 값 표시 시작
    ///
    /// tokio 런타임 안에서 호출해야 합니다 (만료 타이머를 spawn).
    pub fn reveal(&self, record_id: &str, plaintext: impl Into<String>) {
        let mut slots = lock(&self.slots);
        slots.next_generation += 1;
        let generation = slots.next_generation;

        let timer = spawn_expiry(
            Arc::downgrade(&self.slots),
            record_id.to_string(),
            generation,
            self.delay,
        );

        let previous = slots.entries.insert(
            record_id.to_string(),
            RevealSlot {
                plaintext: Zeroizing::new(plaintext.into()),
                generation,
                timer,
            },
        );

        if let Some(previous) = previous {
            previous.timer.abort();
            debug!(record_id, "reveal replaced, previous timer cancelled");
        } else {
            debug!(record_id, delay_ms = self.delay.as_millis() as u64, "record revealed");
        }
    }

    /// 현재 상태 조회
    pub fn state(&self, record_id: &str) -> RevealState {
        match lock(&self.slots).entries.get(record_id) {
            Some(slot) => RevealState::Revealed(slot.plaintext.clone()),
            None => RevealState::Hidden,
        }
    }

    pub fn get(&self, record_id: &str) -> Option<Zeroizing<String>> {
        lock(&self.slots)
            .entries
            .get(record_id)
            .map(|slot| slot.plaintext.clone())
    }

    pub fn is_revealed(&self, record_id: &str) -> bool {
        lock(&self.slots).entries.contains_key(record_id)
    }

    /// 즉시 숨김 (수동 접기). 표시 중이었으면 true
    pub fn hide(&self, record_id: &str) -> bool {
        let removed = lock(&self.slots).entries.remove(record_id);
        match removed {
            Some(slot) => {
                slot.timer.abort();
                debug!(record_id, "record hidden");
                true
            }
            None => false,
        }
    }

    /// 모든 타이머 취소 및 평문 삭제 (화면 이탈, 로그아웃)
    pub fn hide_all(&self) -> usize {
        let drained: Vec<RevealSlot> = {
            let mut slots = lock(&self.slots);
            slots.entries.drain().map(|(_, slot)| slot).collect()
        };
        for slot in &drained {
            slot.timer.abort();
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "all reveals hidden");
        }
        drained.len()
    }

    /// 아직 만료되지 않은 타이머 수
    pub fn pending_timers(&self) -> usize {
        lock(&self.slots)
            .entries
            .values()
            .filter(|slot| !slot.timer.is_finished())
            .count()
    }

    pub fn revealed_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.slots).entries.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Drop for RevealRegistry {
    fn drop(&mut self) {
        self.hide_all();
    }
}

fn lock(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(|e| e.into_inner())
}

fn spawn_expiry(
    slots: Weak<Mutex<Slots>>,
    record_id: String,
    generation: u64,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        let Some(slots) = slots.upgrade() else {
            return;
        };
        let expired = {
            let mut slots = lock(&slots);
            match slots.entries.get(&record_id) {
                Some(slot) if slot.generation == generation => slots.entries.remove(&record_id),
                _ => None,
            }
        };
        if expired.is_some() {
            debug!(record_id = %record_id, "reveal expired");
        }
    })
}
