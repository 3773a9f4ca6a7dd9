//! Handlers for the `/projects` resource.
//!
//! Every handler requires an [`AuthUser`]. Single-project routes check
//! ownership: a missing row is 404, another user's row is 403.

use airdrop_core::error::CoreError;
use airdrop_core::types::DbId;
use airdrop_core::wire::ProjectDocument;
use airdrop_db::models::project::{CreateProject, Project, UpdateProject};
use airdrop_db::repositories::ProjectRepo;
use airdrop_db::DbPool;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Response body for `POST /projects`.
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: DbId,
}

/// Response body for `DELETE /projects/{id}`.
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub success: bool,
}

/// GET /api/projects
///
/// Both active and completed projects, newest first.
pub async fn list(user: AuthUser, State(state): State<AppState>) -> AppResult<Json<Vec<Project>>> {
    let projects = ProjectRepo::list_for_user(&state.pool, user.user_id).await?;
    tracing::debug!(user_id = user.user_id, count = projects.len(), "Listed projects");
    Ok(Json(projects))
}

/// POST /api/projects
pub async fn create(
    user: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<ProjectDocument>,
) -> AppResult<(StatusCode, Json<CreatedResponse>)> {
    let input = CreateProject::from_document(user.user_id, input)?;
    let project = ProjectRepo::create(&state.pool, &input).await?;
    tracing::info!(user_id = user.user_id, project_id = project.id, "Project created");
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: project.id })))
}

/// GET /api/projects/{id}
pub async fn get_by_id(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<Project>> {
    let project = find_owned(&state.pool, id, &user).await?;
    Ok(Json(project))
}

/// PUT /api/projects/{id}
///
/// Full replacement merged over the stored row; see [`UpdateProject::resolve`]
/// for the `dateCompleted` transition rules.
pub async fn update(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ProjectDocument>,
) -> AppResult<Json<Project>> {
    let existing = find_owned(&state.pool, id, &user).await?;
    let update = UpdateProject::resolve(&existing, input, Utc::now())?;

    if update.completed != existing.completed {
        tracing::info!(
            project_id = id,
            completed = update.completed,
            "Project completion state changed"
        );
    }

    let project = ProjectRepo::update(&state.pool, id, &update)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(project))
}

/// DELETE /api/projects/{id}
///
/// Hard delete; there is no undo.
pub async fn delete(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DeletedResponse>> {
    find_owned(&state.pool, id, &user).await?;
    if !ProjectRepo::delete(&state.pool, id).await? {
        return Err(not_found(id));
    }
    tracing::info!(user_id = user.user_id, project_id = id, "Project deleted");
    Ok(Json(DeletedResponse { success: true }))
}

// ---- private helpers ----

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Project",
        id: id.to_string(),
    })
}

/// Load a project and make sure it belongs to `user`.
async fn find_owned(pool: &DbPool, id: DbId, user: &AuthUser) -> AppResult<Project> {
    let project = ProjectRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| not_found(id))?;

    if project.user_id != user.user_id {
        tracing::warn!(
            user_id = user.user_id,
            project_id = id,
            "Rejected access to another user's project"
        );
        return Err(AppError::Core(CoreError::Forbidden("Unauthorized".into())));
    }
    Ok(project)
}
