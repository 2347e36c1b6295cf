//! Policy identity.
//!
//! A [`Policy`] is the set of consent categories an engine enforces. Every stored
//! snapshot is tagged with the policy identity it was given under, so changing the
//! category set (or bumping the identifier) invalidates earlier decisions.
//!
//! The identity is the explicit `identifier` when one is configured, otherwise the
//! [`policy_hash`] of the categories: an FNV-1a 32-bit digest over the UTF-16 code
//! units of a canonical, key-sorted JSON rendering. Category order never matters.
//!
//! ```rust
//! use consentify_engine::policy::policy_hash;
//!
//! let a = policy_hash(&["analytics", "marketing"], None);
//! let b = policy_hash(&["marketing", "analytics"], None);
//! assert_eq!(a, b);
//! assert_eq!(a.len(), 8);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// The versioned set of categories an engine instance enforces.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Policy {
    /// Declared categories, in declaration order. `necessary` is implicit.
    pub categories: Vec<String>,
    /// Optional stable version key. Overrides the computed hash as identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl Policy {
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
            identifier: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Identity stored in every snapshot given under this policy.
    pub fn identity(&self) -> String {
        match &self.identifier {
            Some(id) => id.clone(),
            None => policy_hash(&self.categories, None),
        }
    }
}

/// Hashes a category set (and optional identifier) into 8 lowercase hex chars.
pub fn policy_hash<S: AsRef<str>>(categories: &[S], identifier: Option<&str>) -> String {
    let mut sorted: Vec<&str> = categories.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();

    let canonical = serde_json::json!({
        "categories": sorted,
        "identifier": identifier,
    });

    format!("{:08x}", fnv1a_utf16(&stable_stringify(&canonical)))
}

/// FNV-1a over UTF-16 code units, one unit per round.
fn fnv1a_utf16(input: &str) -> u32 {
    input.encode_utf16().fold(FNV_OFFSET_BASIS, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

/// JSON rendering with object keys sorted recursively.
fn stable_stringify(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(stable_stringify).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), stable_stringify(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        other => other.to_string(),
    }
}
