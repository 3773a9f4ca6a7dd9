//! Project entity model and DTOs.

use airdrop_core::error::CoreError;
use airdrop_core::project::{default_types, Link, ProjectType};
use airdrop_core::types::{DbId, Timestamp};
use airdrop_core::validation::{normalize_links, validate_links, validate_name};
use airdrop_core::wire::ProjectDocument;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

/// A project row from the `projects` table.
///
/// Serializes to the camelCase wire shape clients expect.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: DbId,
    #[serde(skip_serializing)]
    pub user_id: DbId,
    pub name: String,
    pub notes: Option<String>,
    pub links: Json<Vec<Link>>,
    pub types: Json<Vec<ProjectType>>,
    pub completed: bool,
    pub marked: bool,
    pub date_added: Timestamp,
    pub date_completed: Option<Timestamp>,
    #[serde(skip_serializing)]
    pub updated_at: Timestamp,
}

/// DTO for inserting a new project. New projects always start active and
/// unmarked; `date_added` is assigned by the database.
#[derive(Debug, Clone)]
pub struct CreateProject {
    pub user_id: DbId,
    pub name: String,
    pub notes: Option<String>,
    pub links: Vec<Link>,
    pub types: Vec<ProjectType>,
}

/// Full replacement for an existing project, already merged with the stored
/// row by [`UpdateProject::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateProject {
    pub name: String,
    pub notes: Option<String>,
    pub links: Vec<Link>,
    pub types: Vec<ProjectType>,
    pub completed: bool,
    pub marked: bool,
    pub date_completed: Option<Timestamp>,
}

fn clean_notes(notes: String) -> Option<String> {
    (!notes.trim().is_empty()).then_some(notes)
}

fn clean_links(mut links: Vec<Link>) -> Result<Vec<Link>, CoreError> {
    normalize_links(&mut links);
    validate_links(&links)?;
    Ok(links)
}

impl CreateProject {
    /// Validate a request body and build the insert DTO for `user_id`.
    ///
    /// Missing tags default to `daily`.
    pub fn from_document(user_id: DbId, doc: ProjectDocument) -> Result<Self, CoreError> {
        validate_name(doc.name())?;
        let types = doc
            .tags()
            .filter(|tags| !tags.is_empty())
            .unwrap_or_else(default_types);

        Ok(Self {
            user_id,
            name: doc.name().to_string(),
            notes: doc.notes.and_then(clean_notes),
            links: clean_links(doc.links.unwrap_or_default())?,
            types: types.into_iter().collect(),
        })
    }
}

impl UpdateProject {
    /// Merge a request body over the stored row.
    ///
    /// Absent optional fields keep their stored values. `date_completed`
    /// follows the completion transition: stamped with `now` when a project
    /// becomes completed, cleared when it becomes active again, otherwise an
    /// explicit value in the body wins over the stored one.
    pub fn resolve(
        existing: &Project,
        doc: ProjectDocument,
        now: Timestamp,
    ) -> Result<Self, CoreError> {
        validate_name(doc.name())?;
        let name = doc.name().to_string();

        let completed = doc.completed.unwrap_or(existing.completed);
        let date_completed = if !completed {
            None
        } else if !existing.completed {
            Some(now)
        } else {
            doc.date_completed
                .flatten()
                .or(existing.date_completed)
                .or(Some(now))
        };

        let types = match doc.tags() {
            Some(tags) if !tags.is_empty() => tags.into_iter().collect(),
            _ => existing.types.0.clone(),
        };

        let links = match doc.links {
            Some(links) => clean_links(links)?,
            None => existing.links.0.clone(),
        };

        let notes = match doc.notes {
            Some(notes) => clean_notes(notes),
            None => existing.notes.clone(),
        };

        Ok(Self {
            name,
            notes,
            links,
            types,
            completed,
            marked: doc.marked.unwrap_or(existing.marked),
            date_completed,
        })
    }
}
