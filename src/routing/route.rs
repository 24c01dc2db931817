//! Route records.
//!
//! A route associates a normalized prefix with a backend target. Besides
//! `target` and `last_activity`, callers may attach arbitrary JSON fields;
//! those are stored and returned verbatim.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A stored route record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Backend base URL.
    pub target: String,

    /// Last time traffic was proxied through this route.
    #[serde(with = "timestamp")]
    pub last_activity: DateTime<Utc>,

    /// Opaque caller-supplied fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Input for creating a route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteData {
    pub target: String,
    /// Explicit activity timestamp; `None` means "now" at insertion time.
    pub last_activity: Option<DateTime<Utc>>,
    pub extra: Map<String, Value>,
}

/// Why a JSON body could not be turned into [`RouteData`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidRoute {
    #[error("Must specify 'target' as string")]
    Target,

    #[error("Invalid 'last_activity' {0}: must be ISO8601")]
    LastActivity(String),
}

impl RouteData {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            last_activity: None,
            extra: Map::new(),
        }
    }

    pub fn with_last_activity(mut self, at: DateTime<Utc>) -> Self {
        self.last_activity = Some(at);
        self
    }

    /// Build route data from a control-API request body.
    ///
    /// `null` and non-object bodies are treated as an empty object, which
    /// then fails on the missing `target`.
    pub fn from_json(body: Value) -> Result<Self, InvalidRoute> {
        let mut fields = match body {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };

        let target = match fields.remove("target") {
            Some(Value::String(target)) => target,
            _ => return Err(InvalidRoute::Target),
        };

        let last_activity = match fields.remove("last_activity") {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => Some(
                parse_timestamp(&raw).ok_or_else(|| InvalidRoute::LastActivity(raw.clone()))?,
            ),
            Some(other) => return Err(InvalidRoute::LastActivity(other.to_string())),
        };

        Ok(Self {
            target,
            last_activity,
            extra: fields,
        })
    }

    /// Materialize the record, stamping `now` when no activity was given.
    pub fn into_route(self, now: DateTime<Utc>) -> Route {
        Route {
            target: self.target,
            last_activity: self.last_activity.unwrap_or(now),
            extra: self.extra,
        }
    }
}

/// Partial update merged into an existing route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutePatch {
    pub target: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
    pub extra: Map<String, Value>,
}

impl RoutePatch {
    /// A patch that only records activity.
    pub fn touch(at: DateTime<Utc>) -> Self {
        Self {
            last_activity: Some(at),
            ..Self::default()
        }
    }

    pub fn apply(self, route: &mut Route) {
        if let Some(target) = self.target {
            route.target = target;
        }
        if let Some(at) = self.last_activity {
            route.last_activity = at;
        }
        route.extra.extend(self.extra);
    }
}

/// Parse an ISO8601 timestamp.
///
/// Accepts RFC 3339 with an offset, a naive date-time (taken as UTC), or a
/// bare date (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Millisecond-precision RFC 3339 (de)serialization.
mod timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {raw:?}")))
    }
}
