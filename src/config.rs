//! Consent configuration.
//!
//! `ConsentConfig` describes one consent policy together with where and how its
//! decision is stored. It provides defaults via [`Default`] and a fluent
//! [`ConsentConfig::builder()`] for customization with validation.
//!
//! # Examples
//!
//! ## Customize with the builder
//! ```rust
//! use consentify_engine::config::ConsentConfig;
//! use consentify_engine::cookies::SameSite;
//! use consentify_engine::storage::StorageKind;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = ConsentConfig::builder()
//!     .categories(["analytics", "marketing"])
//!     .identifier("2025-06")
//!     .cookie_name("site_consent")
//!     .same_site(SameSite::Strict)
//!     .consent_max_age_days(180.0)
//!     .storage([StorageKind::LocalStorage, StorageKind::Cookie])
//!     .build()?; // returns Result<ConsentConfig, ConfigError>
//! assert_eq!(cfg.cookie.name, "site_consent");
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `policy.categories`: declared consent categories (`necessary` is implicit).
//! - `policy.identifier`: optional stable version key, used as the policy identity.
//! - `cookie`: name, max-age, `SameSite`, secure flag, path and optional domain.
//! - `consent_max_age_days`: optional re-consent window; `None` means never expires.
//! - `storage`: client backend priority (default: cookie only).

use std::collections::HashSet;

use thiserror::Error;

use crate::cookies::SameSite;
use crate::engine::NECESSARY;
use crate::policy::Policy;
use crate::storage::StorageKind;

pub const DEFAULT_COOKIE_NAME: &str = "consentify";
pub const DEFAULT_COOKIE_MAX_AGE_SEC: u64 = 60 * 60 * 24 * 365;

/// Attributes of the consent cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieConfig {
    pub name: String,
    pub max_age_sec: u64,
    pub same_site: SameSite,
    /// Ignored (treated as `true`) when `same_site` is `None`.
    pub secure: bool,
    pub path: String,
    pub domain: Option<String>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            max_age_sec: DEFAULT_COOKIE_MAX_AGE_SEC,
            same_site: SameSite::Lax,
            secure: true,
            path: "/".to_string(),
            domain: None,
        }
    }
}

impl CookieConfig {
    /// Secure flag as written on the wire.
    pub fn effective_secure(&self) -> bool {
        self.secure || self.same_site == SameSite::None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsentConfig {
    pub policy: Policy,
    pub cookie: CookieConfig,
    pub consent_max_age_days: Option<f64>,
    pub storage: Vec<StorageKind>,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            cookie: CookieConfig::default(),
            consent_max_age_days: None,
            storage: vec![StorageKind::Cookie],
        }
    }
}

impl ConsentConfig {
    pub fn builder() -> ConsentConfigBuilder {
        ConsentConfigBuilder::default()
    }

    /// Client storage order, falling back to cookie-only when none is configured.
    pub fn storage_order(&self) -> Vec<StorageKind> {
        if self.storage.is_empty() {
            vec![StorageKind::Cookie]
        } else {
            self.storage.clone()
        }
    }
}

/// Builder for [`ConsentConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConsentConfigBuilder {
    inner: ConsentConfig,
}

impl ConsentConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut ConsentConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn categories<I, S>(self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let categories: Vec<String> = categories.into_iter().map(Into::into).collect();
        self.map(|c| c.policy.categories = categories)
    }

    pub fn identifier<S: Into<String>>(self, id: S) -> Self { self.map(|c| c.policy.identifier = Some(id.into())) }
    pub fn cookie_name<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.cookie.name = name.into()) }
    pub fn max_age_sec(self, secs: u64) -> Self { self.map(|c| c.cookie.max_age_sec = secs) }
    pub fn same_site(self, same_site: SameSite) -> Self { self.map(|c| c.cookie.same_site = same_site) }
    pub fn secure(self, on: bool) -> Self { self.map(|c| c.cookie.secure = on) }
    pub fn path<S: Into<String>>(self, path: S) -> Self { self.map(|c| c.cookie.path = path.into()) }
    pub fn domain<S: Into<String>>(self, domain: S) -> Self { self.map(|c| c.cookie.domain = Some(domain.into())) }
    pub fn consent_max_age_days(self, days: f64) -> Self { self.map(|c| c.consent_max_age_days = Some(days)) }

    pub fn storage<I: IntoIterator<Item = StorageKind>>(self, order: I) -> Self {
        let order: Vec<StorageKind> = order.into_iter().collect();
        self.map(|c| c.storage = order)
    }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut ConsentConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<ConsentConfig, ConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("cookie name must not be empty")]
    EmptyCookieName,

    #[error("cookie name {0:?} contains a reserved character")]
    InvalidCookieName(String),

    #[error("cookie {attribute} {value:?} contains a reserved or control character")]
    InvalidCookieAttribute { attribute: &'static str, value: String },

    #[error("category names must not be empty")]
    EmptyCategory,

    #[error("category {0:?} is declared more than once")]
    DuplicateCategory(String),

    #[error("category \"necessary\" is implicit and cannot be declared")]
    ReservedCategory,

    #[error("consent_max_age_days {0} must be a finite, non-negative number")]
    InvalidMaxAgeDays(f64),

    #[error("storage backend {0} is listed more than once")]
    DuplicateStorage(StorageKind),
}

fn validate(c: &ConsentConfig) -> Result<(), ConfigError> {
    let name = &c.cookie.name;
    if name.is_empty() {
        return Err(ConfigError::EmptyCookieName);
    }
    if name.chars().any(|ch| matches!(ch, '=' | ';' | ',') || ch.is_whitespace()) {
        return Err(ConfigError::InvalidCookieName(name.clone()));
    }
    check_attribute("path", &c.cookie.path)?;
    if let Some(domain) = &c.cookie.domain {
        check_attribute("domain", domain)?;
    }

    let mut seen = HashSet::new();
    for category in &c.policy.categories {
        if category.is_empty() {
            return Err(ConfigError::EmptyCategory);
        }
        if category == NECESSARY {
            return Err(ConfigError::ReservedCategory);
        }
        if !seen.insert(category.as_str()) {
            return Err(ConfigError::DuplicateCategory(category.clone()));
        }
    }

    if let Some(days) = c.consent_max_age_days {
        if !days.is_finite() || days < 0.0 {
            return Err(ConfigError::InvalidMaxAgeDays(days));
        }
    }

    let mut kinds = HashSet::new();
    for kind in &c.storage {
        if !kinds.insert(*kind) {
            return Err(ConfigError::DuplicateStorage(*kind));
        }
    }

    Ok(())
}

/// Attribute values are written verbatim after `Path=`/`Domain=`.
fn check_attribute(attribute: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.chars().any(|ch| matches!(ch, ';' | ',') || ch.is_control()) {
        return Err(ConfigError::InvalidCookieAttribute {
            attribute,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ConsentConfig::default();
        assert_eq!(cfg.cookie.name, "consentify");
        assert_eq!(cfg.cookie.max_age_sec, 31_536_000);
        assert_eq!(cfg.cookie.same_site, SameSite::Lax);
        assert_eq!(cfg.cookie.path, "/");
        assert!(cfg.cookie.domain.is_none());
        assert!(cfg.consent_max_age_days.is_none());
        assert_eq!(cfg.storage, vec![StorageKind::Cookie]);
    }

    #[test]
    fn builder_sets_every_field() {
        let cfg = ConsentConfig::builder()
            .categories(["analytics"])
            .identifier("v1")
            .cookie_name("c")
            .max_age_sec(10)
            .same_site(SameSite::Strict)
            .secure(false)
            .path("/app")
            .domain("example.com")
            .consent_max_age_days(30.0)
            .storage([StorageKind::LocalStorage])
            .build()
            .unwrap();

        assert_eq!(cfg.policy.categories, vec!["analytics".to_string()]);
        assert_eq!(cfg.policy.identifier.as_deref(), Some("v1"));
        assert_eq!(
            cfg.cookie,
            CookieConfig {
                name: "c".into(),
                max_age_sec: 10,
                same_site: SameSite::Strict,
                secure: false,
                path: "/app".into(),
                domain: Some("example.com".into()),
            }
        );
        assert_eq!(cfg.consent_max_age_days, Some(30.0));
        assert_eq!(cfg.storage, vec![StorageKind::LocalStorage]);
    }

    #[test]
    fn empty_storage_falls_back_to_cookie() {
        let cfg = ConsentConfig::builder().storage(Vec::<StorageKind>::new()).build().unwrap();
        assert_eq!(cfg.storage_order(), vec![StorageKind::Cookie]);
    }

    #[test]
    fn secure_is_forced_for_same_site_none() {
        let mut c = CookieConfig { secure: false, ..CookieConfig::default() };
        assert!(!c.effective_secure());
        c.same_site = SameSite::None;
        assert!(c.effective_secure());
    }

    #[test]
    fn validation_errors() {
        let err = |b: ConsentConfigBuilder| b.build().unwrap_err();

        assert_eq!(err(ConsentConfig::builder().cookie_name("")), ConfigError::EmptyCookieName);
        assert!(matches!(
            err(ConsentConfig::builder().cookie_name("a b")),
            ConfigError::InvalidCookieName(_)
        ));
        assert!(matches!(
            err(ConsentConfig::builder().cookie_name("a;b")),
            ConfigError::InvalidCookieName(_)
        ));
        assert_eq!(err(ConsentConfig::builder().categories([""])), ConfigError::EmptyCategory);
        assert_eq!(
            err(ConsentConfig::builder().categories(["a", "b", "a"])),
            ConfigError::DuplicateCategory("a".into())
        );
        assert_eq!(
            err(ConsentConfig::builder().categories(["necessary"])),
            ConfigError::ReservedCategory
        );
        assert!(matches!(
            err(ConsentConfig::builder().consent_max_age_days(-1.0)),
            ConfigError::InvalidMaxAgeDays(_)
        ));
        assert!(matches!(
            err(ConsentConfig::builder().consent_max_age_days(f64::NAN)),
            ConfigError::InvalidMaxAgeDays(_)
        ));
        assert_eq!(
            err(ConsentConfig::builder().storage([StorageKind::Cookie, StorageKind::Cookie])),
            ConfigError::DuplicateStorage(StorageKind::Cookie)
        );
    }

    #[test]
    fn path_and_domain_cannot_smuggle_attributes() {
        let err = |b: ConsentConfigBuilder| b.build().unwrap_err();

        assert_eq!(
            err(ConsentConfig::builder().domain("x; HttpOnly")),
            ConfigError::InvalidCookieAttribute { attribute: "domain", value: "x; HttpOnly".into() }
        );
        assert!(matches!(
            err(ConsentConfig::builder().domain("example.com\nX-Injected: 1")),
            ConfigError::InvalidCookieAttribute { attribute: "domain", .. }
        ));
        assert!(matches!(
            err(ConsentConfig::builder().path("/a,b")),
            ConfigError::InvalidCookieAttribute { attribute: "path", .. }
        ));
        assert!(matches!(
            err(ConsentConfig::builder().path("/\t")),
            ConfigError::InvalidCookieAttribute { attribute: "path", .. }
        ));

        assert!(ConsentConfig::builder().path("/app/v2").domain(".example.com").build().is_ok());
    }

    #[test]
    fn error_messages_are_readable() {
        assert_eq!(
            ConfigError::DuplicateStorage(StorageKind::LocalStorage).to_string(),
            "storage backend localStorage is listed more than once"
        );
    }
}
