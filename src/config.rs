//! 코어 설정
//!
//! 기본값 → `.env.local`/`.env` → 프로세스 환경변수 순으로 적용됩니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::CoreError;
use crate::secrets::{DEFAULT_KEY_TTL, DEFAULT_REVEAL_DELAY};

pub const ENV_KEY_TTL_MS: &str = "VAULTKEEP_KEY_TTL_MS";
pub const ENV_REVEAL_DELAY_MS: &str = "VAULTKEEP_REVEAL_DELAY_MS";
pub const ENV_NAMESPACE: &str = "VAULTKEEP_NAMESPACE";
pub const ENV_API_BASE_URL: &str = "VAULTKEEP_API_BASE_URL";
pub const ENV_DB_PATH: &str = "VAULTKEEP_DB_PATH";

const DEFAULT_NAMESPACE: &str = "vaultkeep:";
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// 잠금 해제 키 TTL
    pub key_ttl_ms: u64,
    /// 복호화 값 자동 숨김 지연
    pub reveal_delay_ms: u64,
    /// 영속 키 prefix
    pub namespace: String,
    pub api_base_url: String,
    /// SQLite 저장소 경로 (없으면 호스트가 저장소를 직접 주입)
    pub database_path: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            key_ttl_ms: DEFAULT_KEY_TTL.as_millis() as u64,
            reveal_delay_ms: DEFAULT_REVEAL_DELAY.as_millis() as u64,
            namespace: DEFAULT_NAMESPACE.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            database_path: None,
        }
    }
}

impl CoreConfig {
    /// `.env.local`/`.env`를 읽은 뒤 환경변수에서 설정 구성
    pub fn from_env() -> Result<Self, CoreError> {
        load_env_files();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// 임의의 조회 함수로 설정 구성 (테스트/호스트 주입용)
    pub fn from_vars<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(raw) = get(ENV_KEY_TTL_MS) {
            config.key_ttl_ms = parse_millis(ENV_KEY_TTL_MS, &raw)?;
        }
        if let Some(raw) = get(ENV_REVEAL_DELAY_MS) {
            config.reveal_delay_ms = parse_millis(ENV_REVEAL_DELAY_MS, &raw)?;
        }
        if let Some(namespace) = get(ENV_NAMESPACE) {
            config.namespace = namespace;
        }
        if let Some(url) = get(ENV_API_BASE_URL) {
            config.api_base_url = url;
        }
        if let Some(path) = get(ENV_DB_PATH) {
            config.database_path = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.key_ttl_ms == 0 {
            return Err(CoreError::Config(format!("{} must be greater than 0", ENV_KEY_TTL_MS)));
        }
        if self.reveal_delay_ms == 0 {
            return Err(CoreError::Config(format!(
                "{} must be greater than 0",
                ENV_REVEAL_DELAY_MS
            )));
        }
        self.api_base_url()?;
        Ok(())
    }

    pub fn key_ttl(&self) -> Duration {
        Duration::from_millis(self.key_ttl_ms)
    }

    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_delay_ms)
    }

    pub fn api_base_url(&self) -> Result<Url, CoreError> {
        Url::parse(&self.api_base_url)
            .map_err(|e| CoreError::Config(format!("Invalid API base URL {}: {}", self.api_base_url, e)))
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<u64, CoreError> {
    raw.parse::<u64>()
        .map_err(|_| CoreError::Config(format!("{} must be a number of milliseconds, got {:?}", key, raw)))
}

const ENV_PREFIX: &str = "VAULTKEEP_";

/// `KEY=VALUE` 한 줄 해석 (`export ` 접두어, 따옴표 허용)
fn parse_env_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if !key.starts_with(ENV_PREFIX)
        || !key.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    {
        return None;
    }
    let value = value.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| value.strip_prefix(*q).and_then(|v| v.strip_suffix(*q)))
        .unwrap_or(value);
    Some((key, unquoted))
}

/// dotenvy가 거부한 파일에서 `VAULTKEEP_*` 항목만 적용
///
/// 이미 비어있지 않은 환경변수는 덮어쓰지 않습니다.
fn load_env_lenient(path: &Path) -> std::io::Result<usize> {
    let text = std::fs::read_to_string(path)?;
    let mut loaded = 0;
    for (key, value) in text.lines().filter_map(parse_env_line) {
        let present = std::env::var(key).is_ok_and(|v| !v.trim().is_empty());
        if !present {
            std::env::set_var(key, value);
            loaded += 1;
        }
    }
    Ok(loaded)
}

fn find_upwards(start: &Path, filename: &str, max_hops: usize) -> Option<PathBuf> {
    start
        .ancestors()
        .take(max_hops + 1)
        .map(|dir| dir.join(filename))
        .find(|candidate| candidate.exists())
}

fn load_env_files() {
    if dotenvy::from_filename(".env.local").is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        if let Some(path) = find_upwards(&cwd, ".env.local", 6) {
            if dotenvy::from_path(&path).is_ok() {
                return;
            }
            if let Ok(loaded) = load_env_lenient(&path) {
                if loaded > 0 {
                    return;
                }
            }
        }
    }

    let _ = dotenvy::dotenv();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CoreConfig::from_vars(|_| None).unwrap();
        assert_eq!(config.key_ttl(), Duration::from_secs(300));
        assert_eq!(config.reveal_delay(), Duration::from_secs(5));
        assert_eq!(config.namespace, "vaultkeep:");
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = CoreConfig::from_vars(lookup(&[
            (ENV_KEY_TTL_MS, "60000"),
            (ENV_REVEAL_DELAY_MS, " 2500 "),
            (ENV_NAMESPACE, "test:"),
            (ENV_API_BASE_URL, "https://vault.example.com/api"),
            (ENV_DB_PATH, "/tmp/vk.db"),
        ]))
        .unwrap();
        assert_eq!(config.key_ttl_ms, 60_000);
        assert_eq!(config.reveal_delay_ms, 2_500);
        assert_eq!(config.namespace, "test:");
        assert_eq!(config.api_base_url().unwrap().host_str(), Some("vault.example.com"));
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/vk.db")));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        assert!(matches!(
            CoreConfig::from_vars(lookup(&[(ENV_KEY_TTL_MS, "five minutes")])),
            Err(CoreError::Config(_))
        ));
        assert!(matches!(
            CoreConfig::from_vars(lookup(&[(ENV_REVEAL_DELAY_MS, "0")])),
            Err(CoreError::Config(_))
        ));
        assert!(matches!(
            CoreConfig::from_vars(lookup(&[(ENV_API_BASE_URL, "::nope")])),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: CoreConfig = serde_json::from_str(r#"{"key_ttl_ms": 1000}"#).unwrap();
        assert_eq!(config.key_ttl_ms, 1000);
        assert_eq!(config.reveal_delay_ms, 5000);
    }

    #[test]
    fn test_parse_env_line() {
        assert_eq!(
            parse_env_line("export VAULTKEEP_NAMESPACE='team:'"),
            Some(("VAULTKEEP_NAMESPACE", "team:"))
        );
        assert_eq!(
            parse_env_line(" VAULTKEEP_KEY_TTL_MS = 60000 "),
            Some(("VAULTKEEP_KEY_TTL_MS", "60000"))
        );
        assert_eq!(parse_env_line("# VAULTKEEP_NAMESPACE=x"), None);
        assert_eq!(parse_env_line("OTHER_APP_KEY=1"), None);
        assert_eq!(parse_env_line("vaultkeep_namespace=x"), None);
        assert_eq!(parse_env_line("not a pair"), None);
    }

    #[test]
    fn test_lenient_loader_applies_only_own_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.local");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# Local settings").unwrap();
        writeln!(file, "export VAULTKEEP_TEST_LENIENT_A=\"quoted\"").unwrap();
        writeln!(file, "UNRELATED_TEST_LENIENT_B=1").unwrap();
        writeln!(file, "not a pair").unwrap();
        drop(file);

        let loaded = load_env_lenient(&path).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(std::env::var("VAULTKEEP_TEST_LENIENT_A").unwrap(), "quoted");
        assert!(std::env::var("UNRELATED_TEST_LENIENT_B").is_err());
    }

    #[test]
    fn test_find_upwards() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(".env.local"), "X=1").unwrap();

        let found = find_upwards(&nested, ".env.local", 4).unwrap();
        assert!(find_upwards(&nested, ".env.missing", 4).is_none());
        assert_eq!(found, dir.path().join(".env.local"));
    }
}
