//! Storage backends for the client-side consent snapshot.
//!
//! Two backends exist:
//!
//! - **Cookie** — canonical. Readable by the server through the request header and
//!   by the page through its [`CookieDocument`](crate::cookies::CookieDocument).
//! - **Local storage** — a client-only, best-effort mirror backed by a
//!   [`StorageArea`].
//!
//! The [`StorageAdapter`] reads and writes them in a configured priority order and
//! absorbs backend failures: a failing backend is logged and skipped, never
//! surfaced to the caller.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use consentify_engine::config::CookieConfig;
//! use consentify_engine::cookies::{CookieDocumentHandle, DefaultCookieJar};
//! use consentify_engine::storage::{InMemoryLocalArea, StorageAdapter, StorageKind};
//!
//! let document: CookieDocumentHandle = DefaultCookieJar::new().into();
//! let adapter = StorageAdapter::new(
//!     vec![StorageKind::LocalStorage, StorageKind::Cookie],
//!     CookieConfig::default(),
//!     Some(document),
//!     Some(Arc::new(InMemoryLocalArea::new())),
//! );
//!
//! adapter.write("value");
//! assert_eq!(adapter.read().as_deref(), Some("value"));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Storage area module, defining the key/value storage interface.
pub mod area;
/// Priority/fallback adapter over the configured backends.
pub mod adapter;

pub use adapter::StorageAdapter;
pub use area::{InMemoryLocalArea, StorageArea, StorageAreaHandle};

/// A client storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKind {
    #[serde(rename = "cookie")]
    Cookie,
    #[serde(rename = "localStorage")]
    LocalStorage,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Cookie => write!(f, "cookie"),
            StorageKind::LocalStorage => write!(f, "localStorage"),
        }
    }
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = s.trim();
        if val.eq_ignore_ascii_case("cookie") {
            Ok(StorageKind::Cookie)
        } else if val.eq_ignore_ascii_case("localstorage") {
            Ok(StorageKind::LocalStorage)
        } else {
            Err(format!("unknown storage backend: {val}"))
        }
    }
}
