pub mod broadcast;
pub mod client;
pub mod config;
pub mod cookies;
pub mod engine;
pub mod errors;
pub mod instance;
pub mod policy;
pub mod server;
pub mod snapshot;
pub mod storage;

pub use client::{BrowserContext, ClientStore, GuardHandle, GuardPhase, Subscription};
pub use config::{ConfigError, ConsentConfig, ConsentConfigBuilder, CookieConfig};
pub use engine::{ConsentEngine, ConsentState, NECESSARY};
pub use errors::ConsentError;
pub use instance::Consentify;
pub use policy::{policy_hash, Policy};
pub use server::ServerFacade;
pub use snapshot::{Choices, Snapshot};
