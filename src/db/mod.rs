//! Database Module
//!
//! SQLite 기반 Durable Store 구현

mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};

use crate::error::CoreError;
use crate::store::DurableStore;

/// SQLite 키-값 저장소
///
/// 연결은 하나이며 mutex로 직렬화됩니다. 쿼리는 짧으므로 await 지점 없이 바로 실행합니다.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// 파일 DB 열기 (스키마 초기화 포함)
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    #[cfg(test)]
    fn open_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    /// 데이터베이스 스키마 초기화
    fn initialize(&self) -> Result<(), CoreError> {
        self.lock()?.execute_batch(schema::CREATE_SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Store("sqlite connection lock poisoned".to_string()))
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            (key, &value, Self::now()),
        )?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let value = stmt
                .query_row([key], |row| row.get::<_, Vec<u8>>(0))
                .optional()?;
            out.push(value);
        }
        Ok(out)
    }

    async fn multi_set(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let now = Self::now();
        for (key, value) in &entries {
            tx.execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                (key, value, now),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        for key in keys {
            tx.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        }
        tx.commit()?;
        Ok(())
    }
}
