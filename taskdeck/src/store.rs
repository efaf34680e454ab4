use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;

/// The current access/refresh token pair. Field names double as the durable
/// storage keys (plain strings, no encryption).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Durable key-value storage for the token pair, surviving restarts.
///
/// Access is confined to the single execution thread, so implementations do
/// not need any locking.
pub trait TokenStore {
    /// Loads the stored pair, or None if nothing (readable) is stored.
    fn load(&self) -> Option<TokenPair>;
    fn save(&mut self, tokens: &TokenPair) -> io::Result<()>;
    fn clear(&mut self) -> io::Result<()>;
}

/// Token pair persisted as a small JSON file.
#[derive(Debug, Clone)]
pub struct FsTokenStore {
    path: PathBuf,
}

impl FsTokenStore {
    pub fn new(path: PathBuf) -> Self {
        FsTokenStore { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl TokenStore for FsTokenStore {
    fn load(&self) -> Option<TokenPair> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(tokens) => Some(tokens),
            Err(err) => {
                warn!(
                    "ignoring unparseable session file {}: {}",
                    self.path.display(),
                    err
                );
                None
            }
        }
    }

    fn save(&mut self, tokens: &TokenPair) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(tokens)?;
        fs::write(&self.path, raw)
    }

    fn clear(&mut self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// In-memory store, for tests and for embedding without a filesystem.
#[derive(Debug, Default)]
pub struct MemTokenStore {
    tokens: Option<TokenPair>,
}

impl MemTokenStore {
    pub fn new() -> Self {
        MemTokenStore::default()
    }

    pub fn with_tokens(access_token: &str, refresh_token: &str) -> Self {
        MemTokenStore {
            tokens: Some(TokenPair {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
            }),
        }
    }
}

impl TokenStore for MemTokenStore {
    fn load(&self) -> Option<TokenPair> {
        self.tokens.clone()
    }

    fn save(&mut self, tokens: &TokenPair) -> io::Result<()> {
        self.tokens = Some(tokens.clone());
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        self.tokens = None;
        Ok(())
    }
}

#[test]
fn test_fs_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deep").join("session.json");
    let mut store = FsTokenStore::new(path.clone());

    assert_eq!(store.load(), None);

    let tokens = TokenPair {
        access_token: "access.abc".to_string(),
        refresh_token: "refresh.xyz".to_string(),
    };
    store.save(&tokens).unwrap();
    assert_eq!(store.load(), Some(tokens));

    // the storage keys are the camelCase names, not the field names
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("accessToken"));
    assert!(raw.contains("refreshToken"));

    store.clear().unwrap();
    assert_eq!(store.load(), None);
    // clearing twice is fine
    store.clear().unwrap();
}

#[test]
fn test_fs_store_unparseable_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "not json at all").unwrap();
    let store = FsTokenStore::new(path);
    assert_eq!(store.load(), None);
}

#[test]
fn test_mem_store() {
    let mut store = MemTokenStore::new();
    assert_eq!(store.load(), None);
    store
        .save(&TokenPair {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        })
        .unwrap();
    assert_eq!(store.load().unwrap().access_token, "a");
    store.clear().unwrap();
    assert_eq!(store.load(), None);

    let store = MemTokenStore::with_tokens("a2", "r2");
    assert_eq!(store.load().unwrap().refresh_token, "r2");
}
