// Token persistence
// Loads and atomically replaces the JSON token record on disk

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::types::{PersistedRecord, Token};
use crate::error::{AuthError, Result};

/// Default token file name, relative to the working directory
pub const DEFAULT_TOKEN_FILE: &str = "token.json";

/// Keys owned by the record itself; pass-through fields never override them
const RESERVED_KEYS: [&str; 3] = ["accessToken", "expiresAt", "expiresIn"];

/// File-backed cache of exactly one token
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached token.
    /// A missing or unparseable record is a cache miss, not an error.
    pub fn load(&self) -> Option<Token> {
        self.load_record().map(|record| Token {
            access_token: record.access_token,
            expires_at: record.expires_at,
        })
    }

    /// Load the cached token together with its pass-through fields
    pub fn load_with_extra(&self) -> Option<(Token, Map<String, Value>)> {
        self.load_record().map(|record| {
            let token = Token {
                access_token: record.access_token,
                expires_at: record.expires_at,
            };
            (token, record.extra)
        })
    }

    fn load_record(&self) -> Option<PersistedRecord> {
        match self.read_record() {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                tracing::debug!("No token file at {}", self.path.display());
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring token file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn read_record(&self) -> Result<Option<PersistedRecord>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AuthError::CacheUnreadable(e.to_string())),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| AuthError::CacheUnreadable(e.to_string()))
    }

    /// Persist a token and the extra login-response fields.
    /// Writes a sibling temp file and renames it over the target so readers never
    /// observe a partial record.
    pub fn save(&self, token: &Token, extra: &Map<String, Value>) -> Result<()> {
        let mut extra = extra.clone();
        for key in RESERVED_KEYS {
            extra.remove(key);
        }

        let record = PersistedRecord {
            access_token: token.access_token.clone(),
            expires_at: token.expires_at,
            extra,
        };
        let contents = serde_json::to_vec(&record).map_err(|e| self.persist_error(e.into()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.persist_error(e))?;
        }

        let tmp_path = self.tmp_path();
        if let Err(e) = write_synced(&tmp_path, &contents) {
            let _ = fs::remove_file(&tmp_path);
            return Err(self.persist_error(e));
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(self.persist_error(e));
        }

        tracing::debug!(
            "Token persisted to {} (expires: {})",
            self.path.display(),
            token.expires_at.to_rfc3339()
        );
        Ok(())
    }

    /// Freshness check, `now < expiresAt`
    pub fn is_fresh(token: &Token, now: DateTime<Utc>) -> bool {
        token.is_fresh(now)
    }

    fn tmp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_TOKEN_FILE.to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()))
    }

    fn persist_error(&self, source: std::io::Error) -> AuthError {
        AuthError::PersistFailed {
            path: self.path.clone(),
            source,
        }
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_FILE)
    }
}

fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Temp directory removed when dropped
    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("bayes-token-store-{}", uuid::Uuid::new_v4()));
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn join(&self, path: &str) -> PathBuf {
            self.0.join(path)
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let scratch = ScratchDir::new();
        let store = TokenStore::new(scratch.join("token.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let scratch = ScratchDir::new();
        let store = TokenStore::new(scratch.join("token.json"));
        let token = Token {
            access_token: "abc123".to_string(),
            expires_at: at(1_700_003_600),
        };
        let mut extra = Map::new();
        extra.insert("refreshToken".to_string(), json!("r-1"));
        extra.insert("scopes".to_string(), json!(["games", "assets"]));

        store.save(&token, &extra).unwrap();

        assert_eq!(store.load(), Some(token.clone()));
        let (loaded, loaded_extra) = store.load_with_extra().unwrap();
        assert_eq!(loaded, token);
        assert_eq!(loaded_extra, extra);
    }

    #[test]
    fn test_save_writes_expected_json() {
        let scratch = ScratchDir::new();
        let store = TokenStore::new(scratch.join("token.json"));
        let token = Token {
            access_token: "abc123".to_string(),
            expires_at: at(1_700_003_600),
        };
        let mut extra = Map::new();
        extra.insert("userId".to_string(), json!(42));
        store.save(&token, &extra).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(
            raw,
            json!({ "accessToken": "abc123", "expiresAt": 1_700_003_600, "userId": 42 })
        );
    }

    #[test]
    fn test_reserved_extra_keys_do_not_shadow_token() {
        let scratch = ScratchDir::new();
        let store = TokenStore::new(scratch.join("token.json"));
        let token = Token {
            access_token: "real".to_string(),
            expires_at: at(1_700_003_600),
        };
        let mut extra = Map::new();
        extra.insert("accessToken".to_string(), json!("bogus"));
        extra.insert("expiresAt".to_string(), json!(0));
        extra.insert("expiresIn".to_string(), json!(3600));

        store.save(&token, &extra).unwrap();

        let (loaded, loaded_extra) = store.load_with_extra().unwrap();
        assert_eq!(loaded, token);
        assert!(loaded_extra.is_empty());
    }

    #[test]
    fn test_save_overwrites_previous_record() {
        let scratch = ScratchDir::new();
        let store = TokenStore::new(scratch.join("token.json"));
        let first = Token {
            access_token: "first".to_string(),
            expires_at: at(1_700_000_000),
        };
        let second = Token {
            access_token: "second".to_string(),
            expires_at: at(1_700_007_200),
        };
        let mut extra = Map::new();
        extra.insert("stale".to_string(), json!(true));

        store.save(&first, &extra).unwrap();
        store.save(&second, &Map::new()).unwrap();

        let (loaded, loaded_extra) = store.load_with_extra().unwrap();
        assert_eq!(loaded, second);
        assert!(loaded_extra.is_empty());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let scratch = ScratchDir::new();
        let dir = scratch.0.clone();
        let store = TokenStore::new(dir.join("token.json"));
        let token = Token {
            access_token: "abc".to_string(),
            expires_at: at(1_700_000_000),
        };
        store.save(&token, &Map::new()).unwrap();

        let names: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["token.json".to_string()]);
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let scratch = ScratchDir::new();
        let store = TokenStore::new(scratch.join("nested/cache/token.json"));
        let token = Token {
            access_token: "abc".to_string(),
            expires_at: at(1_700_000_000),
        };
        store.save(&token, &Map::new()).unwrap();
        assert_eq!(store.load(), Some(token));
    }

    #[test]
    fn test_corrupt_file_is_cache_miss() {
        let scratch = ScratchDir::new();
        let dir = scratch.0.clone();
        let path = dir.join("token.json");
        let store = TokenStore::new(&path);

        fs::write(&path, "{\"accessToken\": \"abc\", \"expiresAt\": 17").unwrap();
        assert!(store.load().is_none());

        fs::write(&path, "{\"accessToken\": \"abc\"}").unwrap();
        assert!(store.load().is_none());

        fs::write(&path, "").unwrap();
        assert!(store.load().is_none());
        assert!(store.load_with_extra().is_none());
    }

    #[test]
    fn test_unreadable_location_is_cache_miss_for_both_loaders() {
        let scratch = ScratchDir::new();
        // Reading a directory fails with an I/O error other than NotFound
        let store = TokenStore::new(scratch.0.clone());
        assert!(matches!(store.read_record(), Err(AuthError::CacheUnreadable(_))));
        assert!(store.load().is_none());
        assert!(store.load_with_extra().is_none());
    }

    #[test]
    fn test_save_into_directory_path_fails_with_persist_error() {
        let scratch = ScratchDir::new();
        let dir = scratch.0.clone();
        // Target is an existing directory, so the rename cannot replace it
        let store = TokenStore::new(&dir);
        let token = Token {
            access_token: "abc".to_string(),
            expires_at: at(1_700_000_000),
        };

        let err = store.save(&token, &Map::new()).unwrap_err();
        assert!(matches!(err, AuthError::PersistFailed { .. }));
    }

    #[test]
    fn test_is_fresh_is_strict() {
        let token = Token {
            access_token: "abc".to_string(),
            expires_at: at(1_700_000_000),
        };
        assert!(TokenStore::is_fresh(&token, at(1_699_999_999)));
        assert!(!TokenStore::is_fresh(&token, at(1_700_000_000)));
    }
}
