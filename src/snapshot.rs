//! Consent snapshots and their transport encoding.
//!
//! A [`Snapshot`] records one decision: the policy identity it was given under,
//! when it was given, and the per-category choices. It is encoded as JSON and then
//! percent-encoded so it fits in a single cookie or storage value.
//!
//! Decoding never fails loudly. Anything that cannot be percent-decoded or parsed
//! comes back as `None` and is treated exactly like "nothing stored".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Category name to decision.
pub type Choices = BTreeMap<String, bool>;

/// An immutable record of one consent decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Policy identity (hash or explicit identifier).
    pub policy: String,
    /// ISO-8601 timestamp of the decision.
    pub given_at: String,
    pub choices: Choices,
}

impl Snapshot {
    pub fn to_value(&self) -> Value {
        let choices: Map<String, Value> = self
            .choices
            .iter()
            .map(|(k, v)| (k.clone(), Value::Bool(*v)))
            .collect();

        let mut obj = Map::new();
        obj.insert("policy".into(), Value::String(self.policy.clone()));
        obj.insert("givenAt".into(), Value::String(self.given_at.clone()));
        obj.insert("choices".into(), Value::Object(choices));
        Value::Object(obj)
    }

    /// Builds a snapshot from decoded data, or `None` if it is structurally invalid.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !is_valid_snapshot(value) {
            return None;
        }

        let choices = value["choices"]
            .as_object()?
            .iter()
            .filter_map(|(k, v)| v.as_bool().map(|b| (k.clone(), b)))
            .collect();

        Some(Self {
            policy: value["policy"].as_str()?.to_string(),
            given_at: value["givenAt"].as_str()?.to_string(),
            choices,
        })
    }
}

/// JSON-serializes and percent-encodes a snapshot.
pub fn encode(snapshot: &Snapshot) -> String {
    urlencoding::encode(&snapshot.to_value().to_string()).into_owned()
}

/// Percent-decodes and parses a raw value. Any failure yields `None`.
pub fn decode(raw: &str) -> Option<Value> {
    let json = urlencoding::decode(raw).ok()?;
    serde_json::from_str(&json).ok()
}

/// Structural check: non-empty `policy`, parseable `givenAt`, all-boolean `choices`.
///
/// Passing this check does not mean the snapshot is accepted; policy identity and
/// expiry are checked by the engine.
pub fn is_valid_snapshot(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };

    let policy_ok = obj
        .get("policy")
        .and_then(Value::as_str)
        .is_some_and(|p| !p.is_empty());

    let given_at_ok = obj
        .get("givenAt")
        .and_then(Value::as_str)
        .is_some_and(|g| parse_timestamp(g).is_some());

    let choices_ok = obj
        .get("choices")
        .and_then(Value::as_object)
        .is_some_and(|c| c.values().all(Value::is_boolean));

    policy_ok && given_at_ok && choices_ok
}

/// Renders a UTC timestamp as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn format_timestamp(at: OffsetDateTime) -> String {
    let fmt = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    );
    at.to_offset(UtcOffset::UTC)
        .format(fmt)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Parses RFC 3339, ISO-8601 date-times (no offset means UTC) or bare dates.
pub fn parse_timestamp(input: &str) -> Option<OffsetDateTime> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(at) = OffsetDateTime::parse(input, &Rfc3339) {
        return Some(at);
    }
    if let Ok(at) = OffsetDateTime::parse(input, &Iso8601::DEFAULT) {
        return Some(at);
    }
    if let Ok(at) = PrimitiveDateTime::parse(input, &Iso8601::DEFAULT) {
        return Some(at.assume_utc());
    }

    Date::parse(input, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}
