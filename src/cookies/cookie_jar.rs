//! Client-side cookie access and a simple in-memory implementation.
//!
//! A [`CookieDocument`] is the page's view of its cookies: reading returns every
//! visible cookie as a `Cookie` header style string, writing takes one
//! `Set-Cookie` style string. It is the same contract a document exposes to
//! scripts.
//!
//! [`DefaultCookieJar`] keeps cookies **in memory only** and parses the subset of
//! RFC 6265 attributes the consent engine writes.
//!
//! ## Notes & limitations
//! - Cookies are keyed by `(name, path, domain)`; writing the same key replaces it.
//! - `Max-Age=0` (or negative) deletes the matching cookie. Positive max-ages are
//!   recorded but not counted down.
//! - No domain/path filtering is applied on read: the jar represents a single page.
//! - The jar is internally synchronized and can be shared by several tabs through a
//!   [`CookieDocumentHandle`].

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cookies::SameSite;

/// Script-level access to the cookies of one document.
pub trait CookieDocument: Send + Sync {
    /// Returns all visible cookies as `name=value` pairs joined by `"; "`.
    fn cookie(&self) -> Result<String>;

    /// Applies one `Set-Cookie` style string.
    fn set_cookie(&self, set_cookie: &str) -> Result<()>;
}

/// A shared handle to a cookie document.
pub type CookieDocumentHandle = Arc<dyn CookieDocument>;

/// A cookie as stored by [`DefaultCookieJar`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name (case-sensitive).
    pub name: String,
    /// Raw cookie value (not URL-decoded).
    pub value: String,
    pub path: Option<String>,
    /// Domain scoping, leading dot stripped.
    pub domain: Option<String>,
    pub secure: bool,
    pub max_age: Option<i64>,
    pub same_site: Option<SameSite>,
}

impl Cookie {
    /// Parses a single `Set-Cookie` string. Returns `None` without a `name=` pair.
    pub fn parse(set_cookie: &str) -> Option<Self> {
        let mut parts = set_cookie.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            path: None,
            domain: None,
            secure: false,
            max_age: None,
            same_site: None,
        };

        for part in parts {
            let part = part.trim();
            if let Some((k, v)) = part.split_once('=') {
                let v = v.trim();
                match k.trim().to_ascii_lowercase().as_str() {
                    "path" => cookie.path = Some(v.to_string()),
                    "domain" => cookie.domain = Some(v.trim_start_matches('.').to_string()),
                    "max-age" => cookie.max_age = v.parse().ok(),
                    "samesite" => cookie.same_site = v.parse().ok(),
                    _ => {}
                }
            } else if part.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            }
        }

        Some(cookie)
    }

    fn same_slot(&self, other: &Cookie) -> bool {
        self.name == other.name && self.path == other.path && self.domain == other.domain
    }

    fn is_expired(&self) -> bool {
        matches!(self.max_age, Some(age) if age <= 0)
    }
}

/// In-memory cookie jar for one document.
#[derive(Debug, Default)]
pub struct DefaultCookieJar {
    entries: RwLock<Vec<Cookie>>,
}

impl DefaultCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all stored cookies.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl From<DefaultCookieJar> for CookieDocumentHandle {
    fn from(jar: DefaultCookieJar) -> Self {
        Arc::new(jar)
    }
}

impl CookieDocument for DefaultCookieJar {
    fn cookie(&self) -> Result<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "))
    }

    fn set_cookie(&self, set_cookie: &str) -> Result<()> {
        let cookie = Cookie::parse(set_cookie)
            .ok_or_else(|| anyhow::anyhow!("malformed cookie string: {set_cookie:?}"))?;

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if cookie.is_expired() {
            entries.retain(|c| !c.same_slot(&cookie));
        } else if let Some(existing) = entries.iter_mut().find(|c| c.same_slot(&cookie)) {
            *existing = cookie;
        } else {
            entries.push(cookie);
        }
        Ok(())
    }
}
