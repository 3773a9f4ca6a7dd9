//! The remote side of the optimistic protocol.
//!
//! [`RemoteGateway`] is the narrow CRUD contract the coordinator depends on;
//! [`HttpGateway`] implements it against the `/api/projects` endpoints using
//! [`reqwest`].

use std::collections::BTreeSet;

use airdrop_core::project::{Link, NewProject, Project, ProjectId, ProjectType};
use airdrop_core::types::Timestamp;
use airdrop_core::wire::decode_projects;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Authenticated CRUD over the caller's project collection.
///
/// Every call carries a bearer credential obtained from the
/// [`IdentityProvider`](crate::identity::IdentityProvider) just before it.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Every project the caller owns, active and completed mixed.
    async fn fetch_all(&self, token: &str) -> Result<Vec<Project>, GatewayError>;

    async fn fetch_one(&self, token: &str, id: &ProjectId) -> Result<Project, GatewayError>;

    /// Returns the server-assigned id. `None` when the server acknowledged the
    /// write without one.
    async fn create(
        &self,
        token: &str,
        input: &NewProject,
    ) -> Result<Option<ProjectId>, GatewayError>;

    /// Full replacement of the stored record.
    async fn update(&self, token: &str, project: &Project) -> Result<(), GatewayError>;

    async fn delete(&self, token: &str, id: &ProjectId) -> Result<(), GatewayError>;
}

/// Response body of `POST /projects`.
#[derive(Debug, Deserialize)]
struct CreatedResponse {
    #[serde(default)]
    id: Option<ProjectId>,
}

/// Error body the server sends with every non-2xx response.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// PUT body. Notes are always sent as a string so that clearing them is not
/// mistaken for "leave unchanged".
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBody<'a> {
    name: &'a str,
    notes: &'a str,
    links: &'a [Link],
    types: &'a BTreeSet<ProjectType>,
    completed: bool,
    marked: bool,
    date_added: Option<Timestamp>,
    date_completed: Option<Timestamp>,
}

impl<'a> From<&'a Project> for UpdateBody<'a> {
    fn from(project: &'a Project) -> Self {
        Self {
            name: &project.name,
            notes: project.notes.as_deref().unwrap_or(""),
            links: &project.links,
            types: &project.types,
            completed: project.completed,
            marked: project.marked,
            date_added: project.date_added,
            date_completed: project.date_completed,
        }
    }
}

/// [`RemoteGateway`] over HTTP.
pub struct HttpGateway {
    client: reqwest::Client,
    api_url: String,
}

impl HttpGateway {
    /// * `api_url` - Base URL including the `/api` prefix, e.g.
    ///   `http://localhost:3000/api`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn projects_url(&self) -> String {
        format!("{}/projects", self.api_url)
    }

    fn project_url(&self, id: &ProjectId) -> String {
        format!("{}/projects/{}", self.api_url, id)
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn fetch_all(&self, token: &str) -> Result<Vec<Project>, GatewayError> {
        let response = self
            .client
            .get(self.projects_url())
            .bearer_auth(token)
            .send()
            .await?;

        let documents: Vec<serde_json::Value> = parse_response(response).await?;
        let total = documents.len();
        let projects = decode_projects(documents);
        if projects.len() != total {
            tracing::warn!(
                skipped = total - projects.len(),
                "Skipped undecodable project documents"
            );
        }
        Ok(projects)
    }

    async fn fetch_one(&self, token: &str, id: &ProjectId) -> Result<Project, GatewayError> {
        let response = self
            .client
            .get(self.project_url(id))
            .bearer_auth(token)
            .send()
            .await?;

        parse_response(response).await
    }

    async fn create(
        &self,
        token: &str,
        input: &NewProject,
    ) -> Result<Option<ProjectId>, GatewayError> {
        let response = self
            .client
            .post(self.projects_url())
            .bearer_auth(token)
            .json(input)
            .send()
            .await?;

        let created: CreatedResponse = parse_response(response).await?;
        Ok(created.id)
    }

    async fn update(&self, token: &str, project: &Project) -> Result<(), GatewayError> {
        let response = self
            .client
            .put(self.project_url(&project.id))
            .bearer_auth(token)
            .json(&UpdateBody::from(project))
            .send()
            .await?;

        check_status(response).await
    }

    async fn delete(&self, token: &str, id: &ProjectId) -> Result<(), GatewayError> {
        let response = self
            .client
            .delete(self.project_url(id))
            .bearer_auth(token)
            .send()
            .await?;

        check_status(response).await
    }
}

// ---- response helpers (shared with the login flow) ----

/// Ensure the response has a success status code. Returns the response
/// unchanged on success, or a [`GatewayError::Api`] carrying the server's
/// `error` message on failure.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);
        return Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body into the expected type.
pub(crate) async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}

/// Assert the response has a success status code, discarding the body.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<(), GatewayError> {
    ensure_success(response).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use airdrop_core::project::ProjectId;
    use chrono::Utc;

    #[test]
    fn update_body_sends_cleared_notes_as_empty_string() {
        let mut project = NewProject::new("Scroll").into_project(ProjectId::from(3), Utc::now());
        project.notes = None;

        let body = serde_json::to_value(UpdateBody::from(&project)).unwrap();
        assert_eq!(body["notes"], "");
        assert_eq!(body["types"], serde_json::json!(["daily"]));
        assert!(body.get("id").is_none());
        assert!(body.get("type").is_none());
        assert!(body["dateAdded"].is_string());
        assert!(body["dateCompleted"].is_null());
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let gateway = HttpGateway::new("http://localhost:3000/api/");
        assert_eq!(
            gateway.project_url(&ProjectId::from(9)),
            "http://localhost:3000/api/projects/9"
        );
    }
}
