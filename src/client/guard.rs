//! Watch a category until it is granted, and optionally until it is revoked again.
//!
//! ```text
//!            granted, no on_revoke
//!   Waiting ───────────────────────────────▶ Done
//!      │                                      ▲
//!      │ granted, on_revoke                   │ revoked
//!      ▼                                      │
//!   Granted ──────────────────────────────────┘
//! ```
//!
//! `dispose` moves any phase straight to `Done`. `Done` is terminal and owns no
//! subscription.

use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::{ClientInner, ClientStore, Subscription};

type Callback = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    Waiting,
    Granted,
    Done,
}

struct GuardState {
    phase: GuardPhase,
    on_grant: Option<Callback>,
    on_revoke: Option<Callback>,
    subscription: Option<Subscription>,
}

impl GuardState {
    /// Applies one observation of the category. Returns the callback to run, if any,
    /// and the subscription to drop when the guard just finished.
    fn advance(&mut self, granted: bool) -> (Option<Callback>, Option<Subscription>) {
        let callback = match (self.phase, granted) {
            (GuardPhase::Waiting, true) => {
                self.phase = if self.on_revoke.is_some() {
                    GuardPhase::Granted
                } else {
                    GuardPhase::Done
                };
                self.on_grant.take()
            }
            (GuardPhase::Granted, false) => {
                self.phase = GuardPhase::Done;
                self.on_revoke.take()
            }
            _ => None,
        };

        let finished = if self.phase == GuardPhase::Done {
            self.finish()
        } else {
            None
        };
        (callback, finished)
    }

    fn finish(&mut self) -> Option<Subscription> {
        self.phase = GuardPhase::Done;
        self.on_grant = None;
        self.on_revoke = None;
        self.subscription.take()
    }
}

/// Handle to a running guard.
///
/// Dropping the handle leaves the guard running; call [`GuardHandle::dispose`] to
/// stop it.
#[derive(Clone)]
pub struct GuardHandle {
    state: Arc<Mutex<GuardState>>,
}

impl Debug for GuardHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardHandle").field("phase", &self.phase()).finish()
    }
}

impl GuardHandle {
    pub fn phase(&self) -> GuardPhase {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).phase
    }

    /// Stops watching. No callback runs after this returns. Safe to call repeatedly.
    pub fn dispose(&self) {
        let subscription = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finish();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
    }
}

fn evaluate(state: &Mutex<GuardState>, granted: bool) {
    let (callback, finished) = state
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .advance(granted);

    if let Some(subscription) = finished {
        subscription.unsubscribe();
    }
    if let Some(callback) = callback {
        callback();
    }
}

impl ClientStore {
    /// Runs `on_grant` once, as soon as `category` is granted.
    pub fn guard<G>(&self, category: &str, on_grant: G) -> GuardHandle
    where
        G: FnOnce() + Send + 'static,
    {
        self.start_guard(category, Box::new(on_grant), None)
    }

    /// Runs `on_grant` once when `category` is granted, then `on_revoke` once if it
    /// is later withdrawn.
    pub fn guard_with_revoke<G, R>(&self, category: &str, on_grant: G, on_revoke: R) -> GuardHandle
    where
        G: FnOnce() + Send + 'static,
        R: FnOnce() + Send + 'static,
    {
        self.start_guard(category, Box::new(on_grant), Some(Box::new(on_revoke)))
    }

    fn start_guard(&self, category: &str, on_grant: Callback, on_revoke: Option<Callback>) -> GuardHandle {
        let state = Arc::new(Mutex::new(GuardState {
            phase: GuardPhase::Waiting,
            on_grant: Some(on_grant),
            on_revoke,
            subscription: None,
        }));

        // The listener owns the state, so the guard outlives a dropped handle. The
        // entry is removed (and the state released) once the guard reaches `Done`.
        let watched = Arc::clone(&state);
        let store: Weak<ClientInner> = Arc::downgrade(&self.inner);
        let category_owned = category.to_string();
        let subscription = self.subscribe(move || {
            let Some(store) = store.upgrade() else {
                return;
            };
            evaluate(&watched, store.is_granted(&category_owned));
        });

        state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscription = Some(subscription);

        evaluate(&state, self.get_category(category));
        GuardHandle { state }
    }
}
