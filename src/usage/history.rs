//! Per-user download history document
//!
//! Stored shape: `{"v1": <legacy payload>?, "v2": {"<dataset id>": {date, url, title}}}`.
//! A stored value without a `v2` key is a legacy (v1) document; it is moved
//! verbatim under `v1` the first time it is loaded and never touched again.

use crate::types::DatasetId;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// `date` format written by the legacy site (`YYYY-MM-DD HH:MM:SS`, no offset)
const LEGACY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One dataset in a user's history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
    /// Last time the user downloaded the dataset
    #[serde(rename = "date", deserialize_with = "deserialize_date")]
    pub last_accessed_at: DateTime<Utc>,
    /// Dataset permalink at the time of the last download
    pub url: String,
    /// Dataset title at the time of the last download
    pub title: String,
}

/// Accepts RFC 3339 and the legacy offset-less form, read as UTC
fn deserialize_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date: {}", raw)))
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, LEGACY_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// A user's download history in the current (v2) schema
#[derive(Clone, Debug, Default, PartialEq, Serialize, ToSchema)]
pub struct DownloadHistory {
    /// Legacy payload preserved from before the v2 migration
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub v1: Option<Value>,

    /// Dataset ID -> last download
    #[schema(value_type = Object)]
    pub v2: BTreeMap<DatasetId, HistoryEntry>,

    /// v2 entries that could not be parsed, written back untouched
    #[serde(skip)]
    pub unparsed: BTreeMap<String, Value>,
}

impl DownloadHistory {
    /// Load a stored document, migrating it to v2 if needed
    ///
    /// Returns the history and whether a migration happened. Loading a v2
    /// document is a no-op migration. Malformed v2 entries are kept aside in
    /// [`DownloadHistory::unparsed`] instead of failing the whole document.
    pub fn from_stored(stored: Option<Value>) -> (Self, bool) {
        let Some(value) = stored else {
            return (Self::default(), false);
        };

        match value {
            Value::Object(mut map) if map.contains_key("v2") => {
                let v1 = map.remove("v1").filter(|v| !v.is_null());
                let mut history = Self {
                    v1,
                    ..Self::default()
                };
                match map.remove("v2") {
                    Some(Value::Object(entries)) => history.load_entries(entries),
                    // PHP encodes an empty map as []
                    Some(Value::Array(a)) if a.is_empty() => {}
                    Some(Value::Null) | None => {}
                    Some(other) => {
                        tracing::warn!(value = %other, "Ignoring non-object v2 download history");
                    }
                }
                (history, false)
            }
            value => {
                let v1 = (!is_empty_payload(&value)).then_some(value);
                (
                    Self {
                        v1,
                        ..Self::default()
                    },
                    true,
                )
            }
        }
    }

    fn load_entries(&mut self, entries: Map<String, Value>) {
        for (key, raw) in entries {
            let id = key.parse::<i64>().ok().map(DatasetId);
            match (id, serde_json::from_value::<HistoryEntry>(raw.clone())) {
                (Some(id), Ok(entry)) => {
                    self.v2.insert(id, entry);
                }
                (_, Err(e)) => {
                    tracing::warn!(key = %key, error = %e, "Keeping unparsable download history entry as-is");
                    self.unparsed.insert(key, raw);
                }
                (None, Ok(_)) => {
                    tracing::warn!(key = %key, "Keeping download history entry with non-numeric key as-is");
                    self.unparsed.insert(key, raw);
                }
            }
        }
    }

    /// Record a download, replacing any previous entry for the dataset
    pub fn record(
        &mut self,
        dataset_id: DatasetId,
        url: impl Into<String>,
        title: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.unparsed.remove(&dataset_id.to_string());
        self.v2.insert(
            dataset_id,
            HistoryEntry {
                last_accessed_at: now,
                url: url.into(),
                title: title.into(),
            },
        );
    }

    /// Serialize to the stored shape
    pub fn to_value(&self) -> serde_json::Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(Value::Object(v2)) = value.get_mut("v2") {
            for (key, raw) in &self.unparsed {
                v2.entry(key.clone()).or_insert_with(|| raw.clone());
            }
        }
        Ok(value)
    }
}

fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
    }
}
