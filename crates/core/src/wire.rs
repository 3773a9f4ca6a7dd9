//! Lenient JSON decoding for project documents.
//!
//! Stored and transmitted projects have drifted over time: some carry a single
//! `type` string instead of a `types` array, some omit `notes` or `links`, and
//! timestamps have been written as RFC 3339 strings, SQL datetimes, epoch
//! milliseconds, or `{seconds, nanoseconds}` objects. [`ProjectDocument`]
//! accepts all of them; converting it into a [`Project`] is the single point
//! where the legacy shapes are folded into the canonical one.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::project::{default_types, Link, Project, ProjectId, ProjectType};
use crate::types::Timestamp;

/// A project as it appears on the wire, before normalization.
///
/// Fields whose absence is meaningful to the server's merge-on-update rules
/// stay `Option`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocument {
    #[serde(default)]
    pub id: Option<ProjectId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub links: Option<Vec<Link>>,
    #[serde(default)]
    pub types: Option<Vec<ProjectType>>,
    /// Legacy single-tag field.
    #[serde(default, rename = "type")]
    pub legacy_type: Option<ProjectType>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub marked: Option<bool>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub date_added: Option<Timestamp>,
    /// `None` when the key is absent, `Some(None)` when explicitly null (or
    /// unparseable).
    #[serde(default, deserialize_with = "explicit_timestamp")]
    pub date_completed: Option<Option<Timestamp>>,
}

impl ProjectDocument {
    /// The document's tag set, preferring `types` over the legacy `type`.
    ///
    /// Returns `None` when neither is present.
    pub fn tags(&self) -> Option<BTreeSet<ProjectType>> {
        match (&self.types, self.legacy_type) {
            (Some(types), _) => Some(types.iter().copied().collect()),
            (None, Some(single)) => Some(BTreeSet::from([single])),
            (None, None) => None,
        }
    }

    /// Trimmed name, or an empty string when absent.
    pub fn name(&self) -> &str {
        self.name.as_deref().map(str::trim).unwrap_or("")
    }
}

impl TryFrom<ProjectDocument> for Project {
    type Error = String;

    fn try_from(doc: ProjectDocument) -> Result<Self, Self::Error> {
        let types = match doc.tags() {
            Some(tags) if !tags.is_empty() => tags,
            _ => default_types(),
        };
        let id = doc
            .id
            .ok_or_else(|| "project document has no id".to_string())?;
        let completed = doc.completed.unwrap_or(false);

        Ok(Project {
            id,
            name: doc.name.unwrap_or_default(),
            notes: doc.notes.filter(|n| !n.is_empty()),
            links: doc.links.unwrap_or_default(),
            types,
            completed,
            marked: doc.marked.unwrap_or(false),
            date_added: doc.date_added,
            date_completed: doc.date_completed.flatten(),
        })
    }
}

/// Decode every element of a fetched array, skipping documents that cannot be
/// normalized (e.g. missing ids) instead of failing the whole fetch.
pub fn decode_projects(values: Vec<Value>) -> Vec<Project> {
    values
        .into_iter()
        .filter_map(|value| serde_json::from_value::<Project>(value).ok())
        .collect()
}

/// Parse any of the timestamp encodings seen in stored data.
pub fn parse_timestamp(value: &Value) -> Option<Timestamp> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(map) => {
            let seconds = map.get("seconds")?.as_i64()?;
            let nanos = map
                .get("nanoseconds")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
        }
        _ => None,
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_timestamp(&value))
}

fn explicit_timestamp<'de, D>(deserializer: D) -> Result<Option<Option<Timestamp>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Some(parse_timestamp(&value)))
}
