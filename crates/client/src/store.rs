//! In-memory record store: the active and completed collections plus their
//! cached filtered/sorted views.
//!
//! The store never talks to the network. It keeps one invariant: an id is in
//! at most one collection at a time.

use std::sync::Arc;

use airdrop_core::filter::{self, ProjectQuery};
use airdrop_core::project::{Collection, Project, ProjectId};
use airdrop_core::types::Timestamp;

/// Filtered and sorted projections of both collections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Views {
    pub active: Vec<Project>,
    pub completed: Vec<Project>,
}

#[derive(Debug)]
struct CachedViews {
    revision: u64,
    query: ProjectQuery,
    views: Arc<Views>,
}

#[derive(Debug, Default)]
pub struct RecordStore {
    active: Vec<Project>,
    completed: Vec<Project>,
    /// Bumped on every mutation; keys the view cache.
    revision: u64,
    load_error: Option<String>,
    cache: Option<CachedViews>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> &[Project] {
        &self.active
    }

    pub fn completed(&self) -> &[Project] {
        &self.completed
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn collection_mut(&mut self, collection: Collection) -> &mut Vec<Project> {
        match collection {
            Collection::Active => &mut self.active,
            Collection::Completed => &mut self.completed,
        }
    }

    // ---- wholesale replacement ----

    pub fn replace_all(&mut self, active: Vec<Project>, completed: Vec<Project>) {
        self.active = active;
        self.completed = completed;
        self.touch();
    }

    /// Replace both collections from a mixed fetch result, partitioned by
    /// `completed`. Clears any recorded load error.
    pub fn replace_from_fetch(&mut self, projects: Vec<Project>) {
        let (completed, active) = projects.into_iter().partition(|p| p.completed);
        self.replace_all(active, completed);
        self.load_error = None;
    }

    // ---- per-record mutations ----

    pub fn upsert_active(&mut self, project: Project) {
        self.upsert(Collection::Active, project);
    }

    pub fn upsert_completed(&mut self, project: Project) {
        self.upsert(Collection::Completed, project);
    }

    /// Replace in place when the id is already in `collection`, otherwise
    /// insert at the front. Any same-id entry in the other collection is
    /// removed.
    fn upsert(&mut self, collection: Collection, project: Project) {
        let other = match collection {
            Collection::Active => Collection::Completed,
            Collection::Completed => Collection::Active,
        };
        self.collection_mut(other).retain(|p| p.id != project.id);

        let target = self.collection_mut(collection);
        match target.iter().position(|p| p.id == project.id) {
            Some(index) => target[index] = project,
            None => target.insert(0, project),
        }
        self.touch();
    }

    pub fn remove_from_active(&mut self, id: &ProjectId) -> Option<Project> {
        self.remove_from(Collection::Active, id)
    }

    pub fn remove_from_completed(&mut self, id: &ProjectId) -> Option<Project> {
        self.remove_from(Collection::Completed, id)
    }

    fn remove_from(&mut self, collection: Collection, id: &ProjectId) -> Option<Project> {
        let list = self.collection_mut(collection);
        let index = list.iter().position(|p| &p.id == id)?;
        let removed = list.remove(index);
        self.touch();
        Some(removed)
    }

    /// Move a project to the front of the completed collection, stamping
    /// `date_completed`. Returns the moved record, or `None` if `id` is not
    /// active.
    pub fn move_active_to_completed(
        &mut self,
        id: &ProjectId,
        completed_at: Timestamp,
    ) -> Option<Project> {
        let mut project = self.remove_from_active(id)?;
        project.completed = true;
        project.date_completed = Some(completed_at);
        self.completed.insert(0, project.clone());
        self.touch();
        Some(project)
    }

    /// Inverse of [`move_active_to_completed`](Self::move_active_to_completed).
    pub fn move_completed_to_active(&mut self, id: &ProjectId) -> Option<Project> {
        let mut project = self.remove_from_completed(id)?;
        project.completed = false;
        project.date_completed = None;
        self.active.insert(0, project.clone());
        self.touch();
        Some(project)
    }

    /// Swap a placeholder id for the one the server assigned.
    pub fn replace_id(&mut self, old: &ProjectId, new: ProjectId) -> bool {
        let Some(project) = self
            .active
            .iter_mut()
            .chain(self.completed.iter_mut())
            .find(|p| &p.id == old)
        else {
            return false;
        };
        project.id = new;
        self.touch();
        true
    }

    /// Set `marked` on an active project. Returns the updated record.
    pub fn set_marked(&mut self, id: &ProjectId, marked: bool) -> Option<Project> {
        let project = self.active.iter_mut().find(|p| &p.id == id)?;
        project.marked = marked;
        let updated = project.clone();
        self.touch();
        Some(updated)
    }

    // ---- lookups ----

    pub fn locate(&self, id: &ProjectId) -> Option<(Collection, &Project)> {
        if let Some(p) = self.active.iter().find(|p| &p.id == id) {
            return Some((Collection::Active, p));
        }
        self.completed
            .iter()
            .find(|p| &p.id == id)
            .map(|p| (Collection::Completed, p))
    }

    pub fn get(&self, id: &ProjectId) -> Option<&Project> {
        self.locate(id).map(|(_, p)| p)
    }

    // ---- load error ----

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn set_load_error(&mut self, error: impl Into<String>) {
        self.load_error = Some(error.into());
    }

    // ---- projections ----

    /// Filtered/sorted views for `query`, recomputed only when the store or
    /// the query changed since the last call.
    pub fn views(&mut self, query: &ProjectQuery) -> Arc<Views> {
        if let Some(cache) = &self.cache {
            if cache.revision == self.revision && &cache.query == query {
                return Arc::clone(&cache.views);
            }
        }

        let views = Arc::new(Views {
            active: filter::apply(&self.active, query),
            completed: filter::apply(&self.completed, query),
        });
        self.cache = Some(CachedViews {
            revision: self.revision,
            query: query.clone(),
            views: Arc::clone(&views),
        });
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airdrop_core::project::{NewProject, ProjectType};
    use chrono::{DateTime, Utc};

    fn project(id: i64, name: &str) -> Project {
        NewProject::new(name).into_project(ProjectId::from(id), Utc::now())
    }

    fn ids(projects: &[Project]) -> Vec<&str> {
        projects.iter().map(|p| p.id.as_str()).collect()
    }

    fn assert_disjoint(store: &RecordStore) {
        for p in store.active() {
            assert!(!p.completed);
            assert!(store.completed().iter().all(|c| c.id != p.id));
        }
        for p in store.completed() {
            assert!(p.completed);
        }
    }

    #[test]
    fn replace_from_fetch_partitions_by_completed() {
        let mut store = RecordStore::new();
        let mut done = project(2, "Done");
        done.set_completed(true, Utc::now());
        store.set_load_error("boom");

        store.replace_from_fetch(vec![project(1, "Open"), done, project(3, "Also open")]);

        assert_eq!(ids(store.active()), ["1", "3"]);
        assert_eq!(ids(store.completed()), ["2"]);
        assert_eq!(store.load_error(), None);
        assert_disjoint(&store);
    }

    #[test]
    fn upsert_inserts_at_front_and_replaces_in_place() {
        let mut store = RecordStore::new();
        store.upsert_active(project(1, "A"));
        store.upsert_active(project(2, "B"));
        assert_eq!(ids(store.active()), ["2", "1"]);

        let mut renamed = project(1, "A2");
        renamed.marked = true;
        store.upsert_active(renamed);
        assert_eq!(ids(store.active()), ["2", "1"]);
        assert_eq!(store.active()[1].name, "A2");
    }

    #[test]
    fn upsert_removes_id_from_other_collection() {
        let mut store = RecordStore::new();
        store.upsert_active(project(1, "A"));

        let mut done = project(1, "A");
        done.set_completed(true, Utc::now());
        store.upsert_completed(done);

        assert!(store.active().is_empty());
        assert_eq!(ids(store.completed()), ["1"]);
        assert_disjoint(&store);
    }

    #[test]
    fn move_round_trip_keeps_dates_consistent() {
        let mut store = RecordStore::new();
        store.replace_all(vec![project(1, "A"), project(2, "B")], vec![]);
        let at = DateTime::from_timestamp_millis(5_000).unwrap();

        let moved = store.move_active_to_completed(&ProjectId::from(2), at).unwrap();
        assert!(moved.completed);
        assert_eq!(moved.date_completed, Some(at));
        assert_eq!(ids(store.completed()), ["2"]);
        assert_disjoint(&store);

        let back = store.move_completed_to_active(&ProjectId::from(2)).unwrap();
        assert!(!back.completed);
        assert_eq!(back.date_completed, None);
        assert_eq!(ids(store.active()), ["2", "1"]);
        assert_disjoint(&store);
    }

    #[test]
    fn move_of_unknown_id_changes_nothing() {
        let mut store = RecordStore::new();
        store.replace_all(vec![project(1, "A")], vec![]);
        let revision = store.revision();

        assert!(store
            .move_active_to_completed(&ProjectId::from(9), Utc::now())
            .is_none());
        assert!(store.move_completed_to_active(&ProjectId::from(1)).is_none());
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn replace_id_swaps_placeholder() {
        let mut store = RecordStore::new();
        let temp = ProjectId::temporary(1, 0);
        store.upsert_active(NewProject::new("T").into_project(temp.clone(), Utc::now()));

        assert!(store.replace_id(&temp, ProjectId::from(77)));
        assert!(store.get(&temp).is_none());
        assert_eq!(store.active()[0].id.as_str(), "77");
        assert!(!store.replace_id(&temp, ProjectId::from(78)));
    }

    #[test]
    fn locate_reports_collection() {
        let mut store = RecordStore::new();
        let mut done = project(2, "Done");
        done.set_completed(true, Utc::now());
        store.replace_all(vec![project(1, "Open")], vec![done]);

        assert_eq!(store.locate(&ProjectId::from(1)).map(|(c, _)| c), Some(Collection::Active));
        assert_eq!(
            store.locate(&ProjectId::from(2)).map(|(c, _)| c),
            Some(Collection::Completed)
        );
        assert!(store.locate(&ProjectId::from(3)).is_none());
    }

    #[test]
    fn views_are_cached_until_store_or_query_changes() {
        let mut store = RecordStore::new();
        store.replace_all(vec![project(1, "Monad"), project(2, "Grass")], vec![]);
        let query = ProjectQuery::default();

        let first = store.views(&query);
        let second = store.views(&query);
        assert!(Arc::ptr_eq(&first, &second));

        let narrowed = store.views(&query.clone().with_search("gra"));
        assert!(!Arc::ptr_eq(&first, &narrowed));
        assert_eq!(ids(&narrowed.active), ["2"]);

        store.set_marked(&ProjectId::from(1), true);
        let after = store.views(&query);
        assert!(!Arc::ptr_eq(&first, &after));
        assert!(after.active.iter().any(|p| p.marked));
    }

    #[test]
    fn views_apply_tag_filter_to_both_collections() {
        let mut store = RecordStore::new();
        let tagged = NewProject::new("Node")
            .with_type(ProjectType::Node)
            .into_project(ProjectId::from(1), Utc::now());
        let mut done = NewProject::new("Old node")
            .with_type(ProjectType::Node)
            .into_project(ProjectId::from(2), Utc::now());
        done.set_completed(true, Utc::now());
        store.replace_all(vec![tagged, project(3, "Daily")], vec![done]);

        let views = store.views(&ProjectQuery::default().with_tag(ProjectType::Node));
        assert_eq!(ids(&views.active), ["1"]);
        assert_eq!(ids(&views.completed), ["2"]);
    }
}
