//! Hash-oriented key-value backends.
//!
//! Each key maps to a flat hash of field -> value. Values are written as
//! strings, but hosted clients may hand back decoded JSON, so reads are typed
//! as `serde_json::Value`.

pub mod memory;
pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use configs::{StoreBackend, StoreConfig};
use thiserror::Error;

pub use memory::MemoryHashStore;
pub use rest::RestHashStore;

/// A hash as read from or written to the store.
pub type Fields = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote error: {0}")]
    Remote(String),
    #[error("unexpected response: {0}")]
    Protocol(String),
}

/// Storage protocol the story store talks to.
/// Implementations can be the hosted REST service or an in-process map.
#[async_trait]
pub trait HashStore: Send + Sync {
    /// Set the given fields on the hash at `key`, creating it if needed.
    async fn hset(&self, key: &str, fields: &Fields) -> Result<(), KvError>;
    /// All fields of the hash at `key`; `None` when the key does not exist.
    async fn hgetall(&self, key: &str) -> Result<Option<Fields>, KvError>;
    async fn exists(&self, key: &str) -> Result<bool, KvError>;
    /// Delete `key`; returns the number of keys removed.
    async fn del(&self, key: &str) -> Result<u64, KvError>;
    /// Keys matching a glob pattern (`*` and `?`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError>;
}

/// Build the backend selected in config. Credentials were validated by
/// `configs`, so a REST backend here always has a URL and token.
pub fn from_config(cfg: &StoreConfig) -> Result<Arc<dyn HashStore>, KvError> {
    match cfg.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryHashStore::new())),
        StoreBackend::Rest => {
            let mut store = RestHashStore::new(&cfg.url, &cfg.token, cfg.request_timeout())?;
            store.set_decode_values(cfg.decode_values);
            Ok(Arc::new(store))
        }
    }
}

/// Glob match in the style of the store's KEYS command, limited to `*` and `?`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            // backtrack: let the last star swallow one more char
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
