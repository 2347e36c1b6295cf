//! Consent decision logic shared by the server facade and the client store.
//!
//! Nothing in here touches storage. The engine turns raw decoded data into a
//! [`ConsentState`], normalizes and merges choices, and stamps new snapshots.
//!
//! # Resolution
//!
//! A stored value resolves to [`ConsentState::Decided`] only when all hold:
//! 1. it is a structurally valid snapshot ([`is_valid_snapshot`]),
//! 2. its `policy` equals the current policy identity exactly,
//! 3. it is not expired under `consent_max_age_days`.
//!
//! Everything else resolves to [`ConsentState::Unset`]. Stale data is never
//! repaired; it is simply ignored until the next write replaces it.
//!
//! # Expiry boundary
//!
//! The window is exclusive: a snapshot exactly `consent_max_age_days` old is still
//! valid, one millisecond more and it is expired.

use serde_json::Value;
use time::OffsetDateTime;

use crate::policy::Policy;
use crate::snapshot::{decode, format_timestamp, is_valid_snapshot, parse_timestamp, Choices, Snapshot};

/// The always-granted category.
pub const NECESSARY: &str = "necessary";

const MS_PER_DAY: f64 = 86_400_000.0;

/// Derived consent state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConsentState {
    /// No valid decision for the current policy.
    #[default]
    Unset,
    /// A valid decision.
    Decided(Snapshot),
}

impl ConsentState {
    pub fn is_decided(&self) -> bool {
        matches!(self, ConsentState::Decided(_))
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            ConsentState::Decided(snapshot) => Some(snapshot),
            ConsentState::Unset => None,
        }
    }

    pub fn choices(&self) -> Option<&Choices> {
        self.snapshot().map(|s| &s.choices)
    }

    /// `necessary` is always granted; anything else needs a decided `true`.
    pub fn is_granted(&self, category: &str) -> bool {
        category == NECESSARY
            || self
                .choices()
                .and_then(|c| c.get(category))
                .copied()
                .unwrap_or(false)
    }
}

/// Starts from all-false defaults, overlays known keys, forces `necessary`.
pub fn normalize<S: AsRef<str>>(partial: &Choices, declared: &[S]) -> Choices {
    let mut out = Choices::new();
    out.insert(NECESSARY.to_string(), true);
    for category in declared {
        out.insert(category.as_ref().to_string(), false);
    }

    for (key, value) in partial {
        if let Some(slot) = out.get_mut(key) {
            *slot = *value;
        }
    }

    out.insert(NECESSARY.to_string(), true);
    out
}

/// Overlays `update` onto `prior` (or the all-false defaults) and normalizes.
pub fn merge<S: AsRef<str>>(prior: Option<&Choices>, update: &Choices, declared: &[S]) -> Choices {
    let mut base = normalize(prior.unwrap_or(&Choices::new()), declared);
    base.extend(update.iter().map(|(k, v)| (k.clone(), *v)));
    normalize(&base, declared)
}

/// Whether a decision given at `given_at` is past the re-consent window now.
pub fn is_expired(given_at: &str, max_age_days: Option<f64>) -> bool {
    is_expired_at(given_at, max_age_days, OffsetDateTime::now_utc())
}

/// [`is_expired`] against an explicit clock. Unparseable timestamps are expired.
pub fn is_expired_at(given_at: &str, max_age_days: Option<f64>, now: OffsetDateTime) -> bool {
    let Some(days) = max_age_days else {
        return false;
    };
    let Some(given) = parse_timestamp(given_at) else {
        return true;
    };

    let elapsed_ms = (now - given).whole_milliseconds() as f64;
    elapsed_ms > days * MS_PER_DAY
}

/// Resolves decoded data against the current policy identity and expiry window.
pub fn resolve(raw: Option<&Value>, policy_hash: &str, max_age_days: Option<f64>) -> ConsentState {
    resolve_at(raw, policy_hash, max_age_days, OffsetDateTime::now_utc())
}

/// [`resolve`] against an explicit clock.
pub fn resolve_at(
    raw: Option<&Value>,
    policy_hash: &str,
    max_age_days: Option<f64>,
    now: OffsetDateTime,
) -> ConsentState {
    let Some(raw) = raw.filter(|v| is_valid_snapshot(v)) else {
        return ConsentState::Unset;
    };
    let Some(snapshot) = Snapshot::from_value(raw) else {
        return ConsentState::Unset;
    };

    if snapshot.policy != policy_hash || is_expired_at(&snapshot.given_at, max_age_days, now) {
        return ConsentState::Unset;
    }

    ConsentState::Decided(snapshot)
}

/// Policy-bound decision logic. Immutable once built.
#[derive(Debug, Clone)]
pub struct ConsentEngine {
    policy: Policy,
    policy_hash: String,
    consent_max_age_days: Option<f64>,
}

impl ConsentEngine {
    pub fn new(policy: Policy, consent_max_age_days: Option<f64>) -> Self {
        let policy_hash = policy.identity();
        Self { policy, policy_hash, consent_max_age_days }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn policy_hash(&self) -> &str {
        &self.policy_hash
    }

    pub fn categories(&self) -> &[String] {
        &self.policy.categories
    }

    pub fn consent_max_age_days(&self) -> Option<f64> {
        self.consent_max_age_days
    }

    /// Decodes a raw stored value and resolves it. Absent or garbage is `Unset`.
    pub fn resolve_raw(&self, raw: Option<&str>) -> ConsentState {
        let decoded = raw.and_then(decode);
        resolve(decoded.as_ref(), &self.policy_hash, self.consent_max_age_days)
    }

    pub fn normalize(&self, partial: &Choices) -> Choices {
        normalize(partial, &self.policy.categories)
    }

    /// Merges `update` onto the choices of `prior` (defaults when `Unset`).
    pub fn merge(&self, prior: &ConsentState, update: &Choices) -> Choices {
        merge(prior.choices(), update, &self.policy.categories)
    }

    /// Stamps choices into a new snapshot given now under this policy.
    pub fn stamp(&self, choices: Choices) -> Snapshot {
        self.stamp_at(choices, OffsetDateTime::now_utc())
    }

    pub fn stamp_at(&self, choices: Choices, at: OffsetDateTime) -> Snapshot {
        Snapshot {
            policy: self.policy_hash.clone(),
            given_at: format_timestamp(at),
            choices,
        }
    }
}
