//! Stateless server-side access to consent.
//!
//! Every call takes the request's `Cookie` header (if any) as input and returns a
//! value; nothing is written anywhere. Setting or clearing consent produces a
//! `Set-Cookie` string the caller attaches to its response.
//!
//! ```rust
//! use consentify_engine::config::ConsentConfig;
//! use consentify_engine::server::ServerFacade;
//! use consentify_engine::snapshot::Choices;
//!
//! let cfg = ConsentConfig::builder().categories(["analytics"]).secure(false).build().unwrap();
//! let server = ServerFacade::from_config(&cfg);
//!
//! let update = Choices::from([("analytics".to_string(), true)]);
//! let set_cookie = server.set(&update, None);
//!
//! // Next request carries the cookie back.
//! let request_header = set_cookie.split(';').next().unwrap();
//! assert!(server.get(Some(request_header)).is_granted("analytics"));
//! ```

use std::sync::Arc;

use http::header::COOKIE;
use http::{HeaderMap, HeaderValue};

use crate::config::{ConsentConfig, CookieConfig};
use crate::cookies::{expire_cookie, read_cookie, set_cookie};
use crate::engine::{ConsentEngine, ConsentState};
use crate::errors::ConsentError;
use crate::snapshot::{encode, Choices};

#[derive(Debug, Clone)]
pub struct ServerFacade {
    engine: Arc<ConsentEngine>,
    cookie: CookieConfig,
}

impl ServerFacade {
    pub fn new(engine: Arc<ConsentEngine>, cookie: CookieConfig) -> Self {
        Self { engine, cookie }
    }

    pub fn from_config(config: &ConsentConfig) -> Self {
        let engine = ConsentEngine::new(config.policy.clone(), config.consent_max_age_days);
        Self::new(Arc::new(engine), config.cookie.clone())
    }

    pub fn policy_hash(&self) -> &str {
        self.engine.policy_hash()
    }

    /// Resolves consent from a raw `Cookie` request header.
    pub fn get(&self, cookie_header: Option<&str>) -> ConsentState {
        let raw = cookie_header
            .filter(|h| !h.is_empty())
            .and_then(|h| read_cookie(h, &self.cookie.name));
        self.engine.resolve_raw(raw.as_deref())
    }

    /// Resolves consent from every `Cookie` header in `headers`.
    pub fn get_from_headers(&self, headers: &HeaderMap) -> ConsentState {
        let joined = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ");
        self.get(Some(joined.as_str()))
    }

    /// Merges `update` onto the consent carried by `current_cookie_header` and
    /// returns the `Set-Cookie` string storing the result.
    pub fn set(&self, update: &Choices, current_cookie_header: Option<&str>) -> String {
        let prior = self.get(current_cookie_header);
        let choices = self.engine.merge(&prior, update);
        let snapshot = self.engine.stamp(choices);
        set_cookie(&self.cookie, &encode(&snapshot))
    }

    /// Returns the `Set-Cookie` string that deletes the consent cookie.
    pub fn clear(&self) -> String {
        expire_cookie(&self.cookie)
    }

    pub fn set_header_value(
        &self,
        update: &Choices,
        current_cookie_header: Option<&str>,
    ) -> Result<HeaderValue, ConsentError> {
        Ok(HeaderValue::from_str(&self.set(update, current_cookie_header))?)
    }

    pub fn clear_header_value(&self) -> Result<HeaderValue, ConsentError> {
        Ok(HeaderValue::from_str(&self.clear())?)
    }
}
