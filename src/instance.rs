use std::sync::Arc;

use crate::client::{BrowserContext, ClientStore};
use crate::config::{ConsentConfig, ConsentConfigBuilder};
use crate::engine::ConsentEngine;
use crate::errors::ConsentError;
use crate::server::ServerFacade;

/// One configured consent instance: a server facade and a client store that share
/// the same policy, cookie settings and engine.
#[derive(Debug, Clone)]
pub struct Consentify {
    /// Configuration the instance was created from.
    config: Arc<ConsentConfig>,
    /// Stateless request/response access.
    server: ServerFacade,
    /// Cached, observable store for this runtime.
    client: ClientStore,
}

impl Consentify {
    /// Create a new instance from an already validated configuration.
    ///
    /// ```
    /// # use consentify_engine as ce;
    /// let config = ce::ConsentConfig::builder().categories(["analytics"]).build().unwrap();
    /// let consent = ce::Consentify::new(config, ce::BrowserContext::detached());
    /// assert!(!consent.client().get_category("analytics"));
    /// ```
    pub fn new(config: ConsentConfig, context: BrowserContext) -> Self {
        let engine = Arc::new(ConsentEngine::new(
            config.policy.clone(),
            config.consent_max_age_days,
        ));

        let server = ServerFacade::new(engine.clone(), config.cookie.clone());
        let client = ClientStore::new(engine, config.cookie.clone(), config.storage_order(), context);

        Self {
            config: Arc::new(config),
            server,
            client,
        }
    }

    /// Validate `builder` and create the instance.
    pub fn build(builder: ConsentConfigBuilder, context: BrowserContext) -> Result<Self, ConsentError> {
        let config = builder.build()?;
        Ok(Self::new(config, context))
    }

    pub fn config(&self) -> &ConsentConfig {
        &self.config
    }

    pub fn server(&self) -> &ServerFacade {
        &self.server
    }

    pub fn client(&self) -> &ClientStore {
        &self.client
    }

    pub fn policy_hash(&self) -> &str {
        self.server.policy_hash()
    }
}
