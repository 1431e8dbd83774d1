//! Persisted record types and their on-disk encoding.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access held by one identity. `expires_at == None` means permanent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    #[serde(default, with = "timestamp::option")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Entitlement {
    pub fn permanent() -> Self {
        Self { expires_at: None }
    }

    pub fn until(expires_at: DateTime<Utc>) -> Self {
        Self {
            expires_at: Some(expires_at),
        }
    }

    /// Expired when the expiry is at or before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A single-use code granting `days` of access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemCode {
    pub days: i64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub used: bool,
    #[serde(default)]
    pub used_by: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub used_at: Option<DateTime<Utc>>,
}

pub type EntitlementMap = BTreeMap<String, Entitlement>;
pub type CodeMap = BTreeMap<String, RedeemCode>;
pub type NotifiedMap = BTreeMap<String, DateTime<Utc>>;

/// Shapes the entitlements file has had over time.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum EntitlementsFile {
    Current(EntitlementMap),
    /// A bare list of identities, each holding permanent access.
    Legacy(Vec<serde_json::Value>),
}

impl Default for EntitlementsFile {
    fn default() -> Self {
        EntitlementsFile::Current(EntitlementMap::new())
    }
}

impl EntitlementsFile {
    /// Returns the map and whether it had to be converted.
    pub(crate) fn into_current(self) -> (EntitlementMap, bool) {
        match self {
            EntitlementsFile::Current(map) => (map, false),
            EntitlementsFile::Legacy(ids) => {
                let map = ids
                    .into_iter()
                    .filter_map(|id| match id {
                        serde_json::Value::String(s) => Some(s),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .map(|id| (id, Entitlement::permanent()))
                    .collect();
                (map, true)
            }
        }
    }
}

/// Timestamps are written as RFC 3339. Reading also accepts naive ISO 8601
/// timestamps, which are taken to be local time.
pub(crate) mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => super::serialize(dt, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp '{}'", raw))),
                None => Ok(None),
            }
        }
    }
}
