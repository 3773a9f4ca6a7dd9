//! Project entity: the only record the tracker stores.
//!
//! [`Project`] is the normalized in-memory shape. Its `Deserialize` impl goes
//! through [`ProjectDocument`](crate::wire::ProjectDocument), so the legacy
//! single-tag `type` field and lenient timestamps are resolved once at the
//! wire boundary and never seen by the rest of the code.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{DbId, Timestamp};
use crate::validation::normalize_url;
use crate::wire::ProjectDocument;

/// Prefix of client-side placeholder ids handed out before the server
/// assigns a real one.
pub const TEMP_ID_PREFIX: &str = "temp-";

// ---------------------------------------------------------------------------
// ProjectId
// ---------------------------------------------------------------------------

/// Opaque project identifier.
///
/// The server issues numeric ids, older data used document-style string ids,
/// and the client mints `temp-*` placeholders. All of them are carried as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a placeholder id for an optimistic insert.
    pub fn temporary(millis: i64, seq: u64) -> Self {
        Self(format!("{TEMP_ID_PREFIX}{millis}-{seq}"))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric database id, if this id came from the server.
    pub fn as_db_id(&self) -> Option<DbId> {
        self.0.parse().ok()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<DbId> for ProjectId {
    fn from(id: DbId) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for ProjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Self(n.to_string()),
            RawId::Text(s) => Self(s),
        })
    }
}

// ---------------------------------------------------------------------------
// ProjectType
// ---------------------------------------------------------------------------

/// Category tag from the fixed vocabulary.
///
/// Unknown strings decode as [`ProjectType::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Daily,
    Testnet,
    Retro,
    Node,
    Depin,
    #[serde(other)]
    Other,
}

impl ProjectType {
    pub const ALL: [ProjectType; 6] = [
        ProjectType::Daily,
        ProjectType::Testnet,
        ProjectType::Retro,
        ProjectType::Node,
        ProjectType::Depin,
        ProjectType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectType::Daily => "daily",
            ProjectType::Testnet => "testnet",
            ProjectType::Retro => "retro",
            ProjectType::Node => "node",
            ProjectType::Depin => "depin",
            ProjectType::Other => "other",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag set assumed when a record carries no tags at all.
pub fn default_types() -> BTreeSet<ProjectType> {
    BTreeSet::from([ProjectType::Daily])
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// A named external link attached to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub url: String,
}

impl Link {
    /// Build a link, trimming both parts and adding `https://` when the url
    /// has no scheme.
    pub fn new(name: impl AsRef<str>, url: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim().to_string(),
            url: normalize_url(url.as_ref()),
        }
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// Which of the two collections a project lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Active,
    Completed,
}

/// A tracked airdrop opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ProjectDocument")]
pub struct Project {
    /// Temporary ids never leave the client.
    #[serde(skip_serializing_if = "ProjectId::is_temporary")]
    pub id: ProjectId,
    pub name: String,
    pub notes: Option<String>,
    pub links: Vec<Link>,
    pub types: BTreeSet<ProjectType>,
    pub completed: bool,
    pub marked: bool,
    pub date_added: Option<Timestamp>,
    pub date_completed: Option<Timestamp>,
}

impl Project {
    /// The collection this project belongs in, decided by `completed` alone.
    pub fn collection(&self) -> Collection {
        if self.completed {
            Collection::Completed
        } else {
            Collection::Active
        }
    }

    /// Set `completed` and keep `date_completed` consistent with it.
    pub fn set_completed(&mut self, completed: bool, now: Timestamp) {
        if completed && !self.completed {
            self.date_completed = Some(now);
        } else if !completed {
            self.date_completed = None;
        }
        self.completed = completed;
    }
}

/// User input for a new project, before any id exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub types: BTreeSet<ProjectType>,
}

impl NewProject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_link(mut self, name: &str, url: &str) -> Self {
        self.links.push(Link::new(name, url));
        self
    }

    pub fn with_type(mut self, project_type: ProjectType) -> Self {
        self.types.insert(project_type);
        self
    }

    /// Materialize as a fresh active, unmarked project.
    pub fn into_project(self, id: ProjectId, now: Timestamp) -> Project {
        Project {
            id,
            name: self.name,
            notes: self.notes,
            links: self.links,
            types: if self.types.is_empty() {
                default_types()
            } else {
                self.types
            },
            completed: false,
            marked: false,
            date_added: Some(now),
            date_completed: None,
        }
    }
}
