//! Optimistic mutation protocol.
//!
//! Each operation runs in the same order:
//!
//! 1. obtain a credential (abandon silently without one),
//! 2. apply the change to the [`RecordStore`] synchronously,
//! 3. issue the remote write,
//! 4. on success reconcile server-assigned fields and notify,
//! 5. on failure notify and replace local state with a full fetch.
//!
//! The store lock is only held for the synchronous parts and never across an
//! `.await`, so operations on different ids may run concurrently.
//!
//! While a write is outstanding its optimistic change stays registered. A full
//! reload triggered by some other record's failure re-applies those changes on
//! top of the fetched state, so it never reverts work that has not failed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use airdrop_core::filter::ProjectQuery;
use airdrop_core::project::{Collection, NewProject, Project, ProjectId};
use airdrop_core::validation::{prepare_new_project, prepare_project};
use chrono::Utc;
use futures::future::join_all;

use crate::error::{ClientError, GatewayError};
use crate::gateway::RemoteGateway;
use crate::identity::IdentityProvider;
use crate::notify::{Notification, NotificationSink};
use crate::store::{RecordStore, Views};

const SIGNED_OUT: &str = "not signed in";

/// What happened to a requested mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Applied locally and confirmed by the server.
    Applied,
    /// No credential was available; nothing changed.
    Unauthenticated,
    /// A previous mutation of the same record has not finished yet.
    InFlight,
    /// The target record is not where the operation expects it.
    Missing,
    /// The remote write failed and local state was reloaded from the server.
    RolledBack { error: String },
}

/// Optimistic change of one record whose remote write has not finished.
#[derive(Debug, Clone)]
enum Pending {
    Upsert(Project),
    Remove,
}

#[derive(Debug, Default)]
struct State {
    store: RecordStore,
    query: ProjectQuery,
    /// Ids with a mutation in flight.
    pending: HashMap<ProjectId, Pending>,
}

impl State {
    fn is_busy(&self, id: &ProjectId) -> bool {
        self.pending.contains_key(id)
    }

    /// Put outstanding optimistic changes back after a full reload.
    fn reapply_pending(&mut self) {
        let State { store, pending, .. } = self;
        for (id, change) in pending.iter() {
            match change {
                Pending::Upsert(project) => match project.collection() {
                    Collection::Active => store.upsert_active(project.clone()),
                    Collection::Completed => store.upsert_completed(project.clone()),
                },
                Pending::Remove => {
                    store.remove_from_active(id);
                    store.remove_from_completed(id);
                }
            }
        }
    }
}

/// Releases in-flight ids when an operation finishes, however it finishes.
struct InFlightGuard<'a> {
    state: &'a Mutex<State>,
    ids: Vec<ProjectId>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for id in &self.ids {
            state.pending.remove(id);
        }
    }
}

pub struct MutationCoordinator {
    gateway: Arc<dyn RemoteGateway>,
    identity: Arc<dyn IdentityProvider>,
    sink: Arc<dyn NotificationSink>,
    state: Mutex<State>,
    temp_seq: AtomicU64,
}

impl MutationCoordinator {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        identity: Arc<dyn IdentityProvider>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            gateway,
            identity,
            sink,
            state: Mutex::new(State::default()),
            temp_seq: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register applied optimistic changes as in flight. Callers check
    /// [`State::is_busy`] first.
    fn claim(&self, state: &mut State, changes: Vec<(ProjectId, Pending)>) -> InFlightGuard<'_> {
        let ids = changes.iter().map(|(id, _)| id.clone()).collect();
        state.pending.extend(changes);
        InFlightGuard {
            state: &self.state,
            ids,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn active_projects(&self) -> Vec<Project> {
        self.lock().store.active().to_vec()
    }

    pub fn completed_projects(&self) -> Vec<Project> {
        self.lock().store.completed().to_vec()
    }

    pub fn project(&self, id: &ProjectId) -> Option<Project> {
        self.lock().store.get(id).cloned()
    }

    /// Error from the most recent failed full load, if it has not been
    /// followed by a successful one.
    pub fn load_error(&self) -> Option<String> {
        self.lock().store.load_error().map(str::to_string)
    }

    pub fn query(&self) -> ProjectQuery {
        self.lock().query.clone()
    }

    pub fn set_query(&self, query: ProjectQuery) {
        self.lock().query = query;
    }

    /// Filtered/sorted views for the current query.
    pub fn views(&self) -> Arc<Views> {
        let mut state = self.lock();
        let query = state.query.clone();
        state.store.views(&query)
    }

    /// Name and notes of a project, for display.
    pub fn view_notes(&self, id: &ProjectId) -> Option<(String, Option<String>)> {
        let (name, notes) = {
            let state = self.lock();
            let project = state.store.get(id)?;
            (project.name.clone(), project.notes.clone())
        };
        self.sink
            .notify(Notification::info(format!("Viewing notes for {name}")));
        Some((name, notes))
    }

    // -----------------------------------------------------------------------
    // Full load
    // -----------------------------------------------------------------------

    /// Replace local state with everything the server has.
    ///
    /// A failure is recorded as the store's load error and returned.
    pub async fn refresh(&self) -> Result<MutationOutcome, ClientError> {
        let Some(token) = self.identity.fresh_credential().await else {
            tracing::debug!("No credential, skipping project load");
            return Ok(MutationOutcome::Unauthenticated);
        };

        match self.gateway.fetch_all(&token).await {
            Ok(projects) => {
                let count = projects.len();
                let mut state = self.lock();
                state.store.replace_from_fetch(projects);
                state.reapply_pending();
                tracing::debug!(count, pending = state.pending.len(), "Loaded projects");
                Ok(MutationOutcome::Applied)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load projects");
                self.lock().store.set_load_error(e.to_string());
                Err(e.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Add a project. It appears at the front of the active collection under
    /// a temporary id until the server assigns the real one.
    pub async fn create(&self, input: NewProject) -> Result<MutationOutcome, ClientError> {
        let input = prepare_new_project(input)?;
        let Some(token) = self.identity.fresh_credential().await else {
            return Ok(MutationOutcome::Unauthenticated);
        };

        let now = Utc::now();
        let temp_id = ProjectId::temporary(
            now.timestamp_millis(),
            self.temp_seq.fetch_add(1, Ordering::Relaxed),
        );
        let name = input.name.clone();

        let guard = {
            let mut state = self.lock();
            let placeholder = input.clone().into_project(temp_id.clone(), now);
            state.store.upsert_active(placeholder.clone());
            self.claim(&mut state, vec![(temp_id.clone(), Pending::Upsert(placeholder))])
        };

        match self.gateway.create(&token, &input).await {
            Ok(Some(id)) => {
                tracing::info!(project_id = %id, temp_id = %temp_id, "Project created");
                let mut state = self.lock();
                state.pending.remove(&temp_id);
                if state.store.get(&id).is_some() {
                    // A reload already brought in the server's copy.
                    state.store.remove_from_active(&temp_id);
                } else if !state.store.replace_id(&temp_id, id.clone()) {
                    state.store.upsert_active(input.clone().into_project(id, now));
                }
            }
            Ok(None) => {
                tracing::warn!(temp_id = %temp_id, "Server returned no id, keeping placeholder");
            }
            Err(e) => return Ok(self.roll_back(guard, "Failed to add project", e).await),
        }

        self.sink
            .notify(Notification::success(format!("Project {name} added successfully")));
        Ok(MutationOutcome::Applied)
    }

    /// Replace a project with an edited copy.
    ///
    /// If the edit flips `completed` the record moves to the other collection
    /// and `date_completed` follows the transition.
    pub async fn update(&self, edited: Project) -> Result<MutationOutcome, ClientError> {
        let mut edited = prepare_project(edited)?;
        let Some(token) = self.identity.fresh_credential().await else {
            return Ok(MutationOutcome::Unauthenticated);
        };

        let guard = {
            let mut state = self.lock();
            let Some(existing) = state.store.get(&edited.id).cloned() else {
                return Ok(MutationOutcome::Missing);
            };
            if state.is_busy(&edited.id) {
                return Ok(MutationOutcome::InFlight);
            }

            if edited.completed != existing.completed {
                let completed = edited.completed;
                edited.completed = existing.completed;
                edited.set_completed(completed, Utc::now());
            }
            edited.date_added = edited.date_added.or(existing.date_added);

            match edited.collection() {
                Collection::Active => state.store.upsert_active(edited.clone()),
                Collection::Completed => state.store.upsert_completed(edited.clone()),
            }
            self.claim(&mut state, vec![(edited.id.clone(), Pending::Upsert(edited.clone()))])
        };

        if let Err(e) = self.gateway.update(&token, &edited).await {
            return Ok(self.roll_back(guard, "Failed to update project", e).await);
        }

        tracing::info!(project_id = %edited.id, "Project updated");
        self.sink.notify(Notification::success(format!(
            "Project {} updated successfully",
            edited.name
        )));
        Ok(MutationOutcome::Applied)
    }

    /// Flip the "checked today" flag of an active project.
    pub async fn toggle_mark(&self, id: &ProjectId) -> Result<MutationOutcome, ClientError> {
        let Some(token) = self.identity.fresh_credential().await else {
            return Ok(MutationOutcome::Unauthenticated);
        };

        let (updated, guard) = {
            let mut state = self.lock();
            let Some(marked) = state.store.active().iter().find(|p| &p.id == id).map(|p| p.marked)
            else {
                return Ok(MutationOutcome::Missing);
            };
            if state.is_busy(id) {
                return Ok(MutationOutcome::InFlight);
            }
            let Some(updated) = state.store.set_marked(id, !marked) else {
                return Ok(MutationOutcome::Missing);
            };
            let guard = self.claim(&mut state, vec![(id.clone(), Pending::Upsert(updated.clone()))]);
            (updated, guard)
        };

        if let Err(e) = self.gateway.update(&token, &updated).await {
            return Ok(self.roll_back(guard, "Failed to update project", e).await);
        }

        let action = if updated.marked { "marked" } else { "unmarked" };
        self.sink.notify(Notification::success(format!(
            "Project {} {action} successfully",
            updated.name
        )));
        Ok(MutationOutcome::Applied)
    }

    /// Move an active project to the completed collection.
    pub async fn complete(&self, id: &ProjectId) -> Result<MutationOutcome, ClientError> {
        let Some(token) = self.identity.fresh_credential().await else {
            return Ok(MutationOutcome::Unauthenticated);
        };

        let (updated, guard) = {
            let mut state = self.lock();
            if !matches!(state.store.locate(id), Some((Collection::Active, _))) {
                return Ok(MutationOutcome::Missing);
            }
            if state.is_busy(id) {
                return Ok(MutationOutcome::InFlight);
            }
            let Some(updated) = state.store.move_active_to_completed(id, Utc::now()) else {
                return Ok(MutationOutcome::Missing);
            };
            let guard = self.claim(&mut state, vec![(id.clone(), Pending::Upsert(updated.clone()))]);
            (updated, guard)
        };

        if let Err(e) = self.gateway.update(&token, &updated).await {
            return Ok(self.roll_back(guard, "Failed to complete project", e).await);
        }

        tracing::info!(project_id = %id, "Project completed");
        self.sink.notify(Notification::success(format!(
            "Project {} marked as completed",
            updated.name
        )));
        Ok(MutationOutcome::Applied)
    }

    /// Move a completed project back to the active collection.
    pub async fn reactivate(&self, id: &ProjectId) -> Result<MutationOutcome, ClientError> {
        let Some(token) = self.identity.fresh_credential().await else {
            return Ok(MutationOutcome::Unauthenticated);
        };

        let (updated, guard) = {
            let mut state = self.lock();
            if !matches!(state.store.locate(id), Some((Collection::Completed, _))) {
                return Ok(MutationOutcome::Missing);
            }
            if state.is_busy(id) {
                return Ok(MutationOutcome::InFlight);
            }
            let Some(updated) = state.store.move_completed_to_active(id) else {
                return Ok(MutationOutcome::Missing);
            };
            let guard = self.claim(&mut state, vec![(id.clone(), Pending::Upsert(updated.clone()))]);
            (updated, guard)
        };

        if let Err(e) = self.gateway.update(&token, &updated).await {
            return Ok(self.roll_back(guard, "Failed to move project to active", e).await);
        }

        tracing::info!(project_id = %id, "Project reactivated");
        self.sink.notify(Notification::success(format!(
            "Project {} moved back to active",
            updated.name
        )));
        Ok(MutationOutcome::Applied)
    }

    /// Delete a project from whichever collection holds it.
    pub async fn delete(&self, id: &ProjectId) -> Result<MutationOutcome, ClientError> {
        let Some(token) = self.identity.fresh_credential().await else {
            return Ok(MutationOutcome::Unauthenticated);
        };

        let (removed, guard) = {
            let mut state = self.lock();
            let Some(collection) = state.store.locate(id).map(|(c, _)| c) else {
                return Ok(MutationOutcome::Missing);
            };
            if state.is_busy(id) {
                return Ok(MutationOutcome::InFlight);
            }
            let removed = match collection {
                Collection::Active => state.store.remove_from_active(id),
                Collection::Completed => state.store.remove_from_completed(id),
            };
            let Some(removed) = removed else {
                return Ok(MutationOutcome::Missing);
            };
            let guard = self.claim(&mut state, vec![(id.clone(), Pending::Remove)]);
            (removed, guard)
        };

        if let Err(e) = self.gateway.delete(&token, id).await {
            return Ok(self.roll_back(guard, "Failed to delete project", e).await);
        }

        tracing::info!(project_id = %id, "Project deleted");
        self.sink.notify(Notification::success(format!(
            "Project {} deleted successfully",
            removed.name
        )));
        Ok(MutationOutcome::Applied)
    }

    /// Clear `marked` on every marked active project.
    ///
    /// One PUT per affected project, issued concurrently. If any of them
    /// fails the whole batch is rolled back by a full reload. Records with a
    /// mutation already in flight are left alone.
    pub async fn reset_all_marks(&self) -> Result<MutationOutcome, ClientError> {
        if self.lock().store.active().is_empty() {
            return Ok(MutationOutcome::Applied);
        }
        let Some(token) = self.identity.fresh_credential().await else {
            return Ok(MutationOutcome::Unauthenticated);
        };

        let (reset, guard) = {
            let mut state = self.lock();
            let ids: Vec<ProjectId> = state
                .store
                .active()
                .iter()
                .filter(|p| p.marked && !state.is_busy(&p.id))
                .map(|p| p.id.clone())
                .collect();
            let reset: Vec<Project> = ids
                .iter()
                .filter_map(|id| state.store.set_marked(id, false))
                .collect();
            let changes = reset
                .iter()
                .map(|p| (p.id.clone(), Pending::Upsert(p.clone())))
                .collect();
            let guard = self.claim(&mut state, changes);
            (reset, guard)
        };

        if reset.is_empty() {
            tracing::debug!("No marked projects to reset");
            return Ok(MutationOutcome::Applied);
        }

        let results = join_all(
            reset
                .iter()
                .map(|project| self.gateway.update(&token, project)),
        )
        .await;

        let failed = results.into_iter().filter_map(Result::err).collect::<Vec<_>>();
        if let Some(first) = failed.into_iter().next() {
            return Ok(self.roll_back(guard, "Failed to reset all marks", first).await);
        }

        tracing::info!(count = reset.len(), "Reset project marks");
        self.sink
            .notify(Notification::success("All project marks have been reset"));
        Ok(MutationOutcome::Applied)
    }

    // -----------------------------------------------------------------------
    // Rollback
    // -----------------------------------------------------------------------

    /// Report a failed write and discard its optimistic state by reloading.
    async fn roll_back(
        &self,
        guard: InFlightGuard<'_>,
        context: &str,
        error: GatewayError,
    ) -> MutationOutcome {
        tracing::warn!(error = %error, "{context}, reloading projects");
        drop(guard);
        if error.is_unauthorized() {
            self.identity.invalidate().await;
        }
        self.sink
            .notify(Notification::error(format!("{context}: {error}")));

        match self.refresh().await {
            Ok(MutationOutcome::Unauthenticated) => {
                tracing::warn!("No credential for reload, local changes kept until next load");
                self.lock().store.set_load_error(SIGNED_OUT);
                self.sink
                    .notify(Notification::error(format!("Failed to load projects: {SIGNED_OUT}")));
            }
            Ok(_) => {}
            Err(e) => {
                self.sink
                    .notify(Notification::error(format!("Failed to load projects: {e}")));
            }
        }

        MutationOutcome::RolledBack {
            error: error.to_string(),
        }
    }
}
