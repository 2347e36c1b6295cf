//! Stateful client-side consent store.
//!
//! A [`ClientStore`] caches the resolved [`ConsentState`] of one policy, notifies
//! subscribers when it changes and keeps other tabs in step over a
//! [`ChangeChannel`]. It exposes the external-store contract reactive UI adapters
//! consume:
//!
//! - [`ClientStore::subscribe`] registers a change callback,
//! - [`ClientStore::get`] returns the cached state (cheap, referentially stable),
//! - [`ClientStore::get_server_snapshot`] returns the constant server-side default.
//!
//! # Concurrency model
//! - Everything is synchronous. Listeners run inline, in registration order, inside
//!   the call that caused the change.
//! - Storage is the single source of truth. `set` merges onto a fresh storage read,
//!   never onto the cache, and the cache is always re-derived from storage.
//! - No locks are held while listeners run, so a listener may call back into the
//!   store (read, write, subscribe or unsubscribe).
//!
//! # Cross-tab updates
//! A local `set`/`clear` that changed storage fires local listeners first and then
//! posts a signal on the `"consentify:<cookie name>"` topic. Other stores on that
//! topic pick it up in [`ClientStore::pump_broadcasts`], re-read storage and fire
//! their own listeners. The posting store never sees its own signal.

pub mod guard;

use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use crate::broadcast::{BroadcastTransport, ChangeChannel, NoopChannel};
use crate::config::{ConsentConfig, CookieConfig};
use crate::cookies::CookieDocumentHandle;
use crate::engine::{ConsentEngine, ConsentState};
use crate::snapshot::{encode, Choices};
use crate::storage::{StorageAdapter, StorageAreaHandle, StorageKind};

pub use guard::{GuardHandle, GuardPhase};

/// Topic prefix for cross-tab change signals.
pub const CHANNEL_PREFIX: &str = "consentify:";

type Listener = Arc<dyn Fn() + Send + Sync>;

/// The runtime capabilities a client store can use.
///
/// A context without a cookie document is not a browser: the store then caches
/// `Unset` forever and every write is a no-op.
#[derive(Clone, Default)]
pub struct BrowserContext {
    pub document: Option<CookieDocumentHandle>,
    pub local_storage: Option<StorageAreaHandle>,
    pub broadcast: Option<Arc<dyn BroadcastTransport>>,
    /// Handle foreign signals as they are posted instead of in `pump_broadcasts`.
    pub push_broadcasts: bool,
}

impl Debug for BrowserContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserContext")
            .field("document", &self.document.is_some())
            .field("local_storage", &self.local_storage.is_some())
            .field("broadcast", &self.broadcast.is_some())
            .field("push_broadcasts", &self.push_broadcasts)
            .finish()
    }
}

impl BrowserContext {
    pub fn new(document: CookieDocumentHandle) -> Self {
        Self {
            document: Some(document),
            ..Self::default()
        }
    }

    /// A server-side (non-browser) context.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn local_storage(mut self, area: StorageAreaHandle) -> Self {
        self.local_storage = Some(area);
        self
    }

    pub fn broadcast(mut self, transport: Arc<dyn BroadcastTransport>) -> Self {
        self.broadcast = Some(transport);
        self
    }

    /// Asks the transport to deliver signals by callback. Transports that cannot
    /// call back stay pull-based.
    pub fn push_broadcasts(mut self) -> Self {
        self.push_broadcasts = true;
        self
    }

    pub fn is_browser(&self) -> bool {
        self.document.is_some()
    }
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

struct ClientInner {
    engine: Arc<ConsentEngine>,
    storage: StorageAdapter,
    in_browser: bool,
    cache: RwLock<Arc<ConsentState>>,
    server_snapshot: Arc<ConsentState>,
    listeners: Mutex<Listeners>,
    channel: Box<dyn ChangeChannel>,
}

impl ClientInner {
    fn read_state(&self) -> ConsentState {
        self.engine.resolve_raw(self.storage.read().as_deref())
    }

    fn cached(&self) -> Arc<ConsentState> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_granted(&self, category: &str) -> bool {
        self.cached().is_granted(category)
    }

    /// Re-derives the cache from storage, keeping the old `Arc` when unchanged.
    fn sync(&self) {
        let fresh = self.read_state();
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if **cache != fresh {
            *cache = Arc::new(fresh);
        }
    }

    fn on_signal(&self) {
        log::debug!("consent change signal received on {}", self.engine.policy_hash());
        self.sync();
        self.notify();
    }

    fn notify(&self) {
        let ids: Vec<u64> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(id, _)| *id)
            .collect();

        // Looked up per call: an earlier listener may have unsubscribed a later one.
        for id in ids {
            let Some(listener) = self.listener(id) else {
                continue;
            };
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                log::error!("consent listener panicked; continuing with remaining listeners");
            }
        }
    }

    fn listener(&self, id: u64) -> Option<Listener> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, l)| Arc::clone(l))
    }

    fn subscribe(self: &Arc<Self>, listener: Listener) -> Subscription {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, listener));

        Subscription {
            id,
            store: Arc::downgrade(self),
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .retain(|(entry, _)| *entry != id);
    }
}

/// Handle returned by [`ClientStore::subscribe`].
///
/// Dropping the handle does **not** unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    store: Weak<ClientInner>,
}

impl Subscription {
    /// Removes exactly this callback. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
    }
}

/// Cached, observable consent store for one runtime (one tab).
#[derive(Clone)]
pub struct ClientStore {
    inner: Arc<ClientInner>,
}

impl Debug for ClientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientStore")
            .field("policy", &self.inner.engine.policy_hash())
            .field("in_browser", &self.inner.in_browser)
            .field("state", &self.inner.cached())
            .finish_non_exhaustive()
    }
}

impl Debug for ClientInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientInner").finish_non_exhaustive()
    }
}

impl ClientStore {
    pub fn new(
        engine: Arc<ConsentEngine>,
        cookie: CookieConfig,
        order: Vec<StorageKind>,
        context: BrowserContext,
    ) -> Self {
        let in_browser = context.is_browser();
        let push = context.push_broadcasts;
        let topic = format!("{CHANNEL_PREFIX}{}", cookie.name);

        let (storage, channel): (StorageAdapter, Box<dyn ChangeChannel>) = if in_browser {
            let channel = match &context.broadcast {
                Some(transport) => transport.open(&topic),
                None => Box::new(NoopChannel),
            };
            let storage = StorageAdapter::new(order, cookie, context.document, context.local_storage);
            (storage, channel)
        } else {
            (StorageAdapter::new(order, cookie, None, None), Box::new(NoopChannel))
        };

        let inner = Arc::new(ClientInner {
            engine,
            storage,
            in_browser,
            cache: RwLock::new(Arc::new(ConsentState::Unset)),
            server_snapshot: Arc::new(ConsentState::Unset),
            listeners: Mutex::new(Listeners::default()),
            channel,
        });

        if in_browser {
            inner.sync();
        }

        if in_browser && push {
            let store = Arc::downgrade(&inner);
            let accepted = inner.channel.on_message(Arc::new(move || {
                if let Some(store) = store.upgrade() {
                    store.on_signal();
                }
            }));
            if !accepted {
                log::debug!("consent channel {topic} has no push delivery; use pump_broadcasts");
            }
        }

        Self { inner }
    }

    pub fn from_config(config: &ConsentConfig, context: BrowserContext) -> Self {
        let engine = ConsentEngine::new(config.policy.clone(), config.consent_max_age_days);
        Self::new(Arc::new(engine), config.cookie.clone(), config.storage_order(), context)
    }

    pub fn policy_hash(&self) -> &str {
        self.inner.engine.policy_hash()
    }

    pub fn is_browser(&self) -> bool {
        self.inner.in_browser
    }

    /// The cached state. Never touches storage.
    pub fn get(&self) -> Arc<ConsentState> {
        self.inner.cached()
    }

    /// Whether `category` is granted in the cached state. `necessary` always is.
    pub fn get_category(&self, category: &str) -> bool {
        self.inner.is_granted(category)
    }

    /// Constant `Unset`, matching what a server renders without a cookie.
    pub fn get_server_snapshot(&self) -> Arc<ConsentState> {
        Arc::clone(&self.inner.server_snapshot)
    }

    /// Merges `update` onto the stored decision and writes it if anything changed.
    ///
    /// The merge base is read from storage, not the cache. When the resulting
    /// choices equal the stored ones under the current policy nothing is written
    /// and nobody is notified.
    pub fn set(&self, update: &Choices) {
        if !self.inner.in_browser {
            log::debug!("consent set ignored outside a browser context");
            return;
        }

        let engine = &self.inner.engine;
        let current = self.inner.read_state();
        let choices = engine.merge(&current, update);

        if current.choices() == Some(&choices) {
            log::debug!("consent set skipped: choices unchanged");
            return;
        }

        let snapshot = engine.stamp(choices);
        self.inner.storage.write(&encode(&snapshot));
        self.changed();
    }

    /// Removes the decision from every backend.
    pub fn clear(&self) {
        if !self.inner.in_browser {
            log::debug!("consent clear ignored outside a browser context");
            return;
        }

        self.inner.storage.clear();
        self.changed();
    }

    /// Registers `callback` to run after every change.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.subscribe(Arc::new(callback))
    }

    /// Processes change signals from other tabs. Returns how many were handled.
    ///
    /// Each signal re-reads storage and fires the listeners once. Always `0` when
    /// signals are pushed.
    pub fn pump_broadcasts(&self) -> usize {
        let received = self.inner.channel.drain();
        for _ in 0..received {
            self.inner.on_signal();
        }
        received
    }

    fn changed(&self) {
        self.inner.sync();
        self.inner.notify();
        self.inner.channel.publish();
    }
}
