#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use airdrop_client::coordinator::MutationCoordinator;
use airdrop_client::error::GatewayError;
use airdrop_client::gateway::RemoteGateway;
use airdrop_client::identity::{IdentityProvider, StaticCredential};
use airdrop_client::notify::{BroadcastSink, Notification};
use airdrop_core::project::{NewProject, Project, ProjectId};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, Notify};

pub const TOKEN: &str = "test-token";

/// A call the coordinator made against the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchAll,
    FetchOne(ProjectId),
    Create(String),
    Update(ProjectId),
    Delete(ProjectId),
}

#[derive(Default)]
struct Inner {
    projects: Vec<Project>,
    next_id: i64,
    calls: Vec<Call>,
    failing_ids: HashSet<ProjectId>,
    fail_writes: bool,
    fail_fetch: bool,
    omit_created_id: bool,
    reject_token: bool,
    hold: Option<Arc<Notify>>,
    hold_creates: Option<Arc<Notify>>,
    held_ids: HashMap<ProjectId, Arc<Notify>>,
}

/// In-memory stand-in for the server with failure injection.
#[derive(Default)]
pub struct FakeGateway {
    inner: Mutex<Inner>,
}

fn remote_error(message: &str) -> GatewayError {
    GatewayError::Api {
        status: 500,
        message: message.to_string(),
    }
}

impl FakeGateway {
    pub fn with_projects(projects: Vec<Project>) -> Self {
        let next_id = projects
            .iter()
            .filter_map(|p| p.id.as_db_id())
            .max()
            .unwrap_or(0);
        Self {
            inner: Mutex::new(Inner {
                projects,
                next_id,
                ..Inner::default()
            }),
        }
    }

    pub fn server_projects(&self) -> Vec<Project> {
        self.inner.lock().unwrap().projects.clone()
    }

    pub fn server_project(&self, id: &ProjectId) -> Option<Project> {
        self.server_projects().into_iter().find(|p| &p.id == id)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    /// Every write touching `id` fails.
    pub fn fail_writes_for(&self, id: ProjectId) {
        self.inner.lock().unwrap().failing_ids.insert(id);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_writes = fail;
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.inner.lock().unwrap().fail_fetch = fail;
    }

    pub fn omit_created_id(&self) {
        self.inner.lock().unwrap().omit_created_id = true;
    }

    /// Writes fail the way the server rejects an expired credential.
    pub fn reject_token(&self, reject: bool) {
        self.inner.lock().unwrap().reject_token = reject;
    }

    /// Block every write until the returned handle is notified.
    pub fn hold_writes(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.inner.lock().unwrap().hold = Some(Arc::clone(&notify));
        notify
    }

    /// Block creates only.
    pub fn hold_creates(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.inner.lock().unwrap().hold_creates = Some(Arc::clone(&notify));
        notify
    }

    /// Block writes touching `id` only.
    pub fn hold_writes_for(&self, id: ProjectId) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.inner
            .lock()
            .unwrap()
            .held_ids
            .insert(id, Arc::clone(&notify));
        notify
    }

    /// `id` is `None` for creates.
    async fn wait_if_held(&self, id: Option<&ProjectId>) {
        let hold = {
            let inner = self.inner.lock().unwrap();
            inner.hold.clone().or_else(|| match id {
                Some(id) => inner.held_ids.get(id).cloned(),
                None => inner.hold_creates.clone(),
            })
        };
        if let Some(notify) = hold {
            notify.notified().await;
        }
    }

    fn check_write(inner: &Inner, id: Option<&ProjectId>) -> Result<(), GatewayError> {
        if inner.reject_token {
            return Err(GatewayError::Api {
                status: 401,
                message: "Token is invalid or expired".into(),
            });
        }
        if inner.fail_writes || id.is_some_and(|id| inner.failing_ids.contains(id)) {
            return Err(remote_error("Internal server error"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn fetch_all(&self, token: &str) -> Result<Vec<Project>, GatewayError> {
        assert_eq!(token, TOKEN);
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::FetchAll);
        if inner.fail_fetch {
            return Err(remote_error("Failed to fetch projects"));
        }
        Ok(inner.projects.clone())
    }

    async fn fetch_one(&self, _token: &str, id: &ProjectId) -> Result<Project, GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::FetchOne(id.clone()));
        inner
            .projects
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or(GatewayError::Api {
                status: 404,
                message: "Project not found".into(),
            })
    }

    async fn create(
        &self,
        _token: &str,
        input: &NewProject,
    ) -> Result<Option<ProjectId>, GatewayError> {
        self.wait_if_held(None).await;
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Create(input.name.clone()));
        Self::check_write(&inner, None)?;

        inner.next_id += 1;
        let id = ProjectId::from(inner.next_id);
        inner
            .projects
            .insert(0, input.clone().into_project(id.clone(), Utc::now()));
        Ok((!inner.omit_created_id).then_some(id))
    }

    async fn update(&self, _token: &str, project: &Project) -> Result<(), GatewayError> {
        self.wait_if_held(Some(&project.id)).await;
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Update(project.id.clone()));
        Self::check_write(&inner, Some(&project.id))?;

        let stored = inner
            .projects
            .iter_mut()
            .find(|p| p.id == project.id)
            .ok_or(GatewayError::Api {
                status: 404,
                message: "Project not found".into(),
            })?;
        *stored = project.clone();
        Ok(())
    }

    async fn delete(&self, _token: &str, id: &ProjectId) -> Result<(), GatewayError> {
        self.wait_if_held(Some(id)).await;
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Delete(id.clone()));
        Self::check_write(&inner, Some(id))?;

        let before = inner.projects.len();
        inner.projects.retain(|p| &p.id != id);
        if inner.projects.len() == before {
            return Err(GatewayError::Api {
                status: 404,
                message: "Project not found".into(),
            });
        }
        Ok(())
    }
}

/// A coordinator wired to a fake gateway and a broadcast sink.
pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub coordinator: MutationCoordinator,
    pub notifications: broadcast::Receiver<Notification>,
}

impl Harness {
    pub fn new(projects: Vec<Project>) -> Self {
        Self::with_identity(projects, StaticCredential::new(TOKEN))
    }

    pub fn with_identity(projects: Vec<Project>, identity: impl IdentityProvider + 'static) -> Self {
        let gateway = Arc::new(FakeGateway::with_projects(projects));
        let sink = Arc::new(BroadcastSink::default());
        let notifications = sink.subscribe();
        let coordinator = MutationCoordinator::new(gateway.clone(), Arc::new(identity), sink);
        Self {
            gateway,
            coordinator,
            notifications,
        }
    }

    /// A harness whose store has already loaded `projects`.
    pub async fn loaded(projects: Vec<Project>) -> Self {
        Self::loaded_with_identity(projects, StaticCredential::new(TOKEN)).await
    }

    pub async fn loaded_with_identity(
        projects: Vec<Project>,
        identity: impl IdentityProvider + 'static,
    ) -> Self {
        let harness = Self::with_identity(projects, identity);
        harness
            .coordinator
            .refresh()
            .await
            .expect("initial load should succeed");
        harness.gateway.clear_calls();
        harness
    }

    /// Every notification emitted so far.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            out.push(n);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Hands out [`TOKEN`] and counts invalidations. Clones share state.
///
/// Once invalidated it keeps handing out the token if `relogin` is set, and
/// nothing otherwise.
#[derive(Clone, Default)]
pub struct RevocableCredential {
    invalidations: Arc<AtomicUsize>,
    revoked: Arc<AtomicBool>,
    relogin: bool,
}

impl RevocableCredential {
    pub fn relogging() -> Self {
        Self {
            relogin: true,
            ..Self::default()
        }
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for RevocableCredential {
    async fn fresh_credential(&self) -> Option<String> {
        if self.revoked.load(Ordering::SeqCst) && !self.relogin {
            return None;
        }
        Some(TOKEN.to_string())
    }

    async fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.revoked.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn project(id: i64, name: &str) -> Project {
    NewProject::new(name).into_project(ProjectId::from(id), Utc::now())
}

pub fn marked(id: i64, name: &str) -> Project {
    let mut p = project(id, name);
    p.marked = true;
    p
}

pub fn completed(id: i64, name: &str) -> Project {
    let mut p = project(id, name);
    p.set_completed(true, Utc::now());
    p
}
