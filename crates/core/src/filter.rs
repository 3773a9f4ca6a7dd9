//! Filter/sort projection over a project collection.
//!
//! [`apply`] is pure: it borrows the collection and returns a new, ordered
//! vector. Callers cache the result and only call it again when the
//! collection or the [`ProjectQuery`] changes.

use std::collections::BTreeSet;

use crate::project::{Project, ProjectType};

/// Search term, tag filter, and sort direction for a view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectQuery {
    /// Case-insensitive substring matched against `name` only.
    pub search: String,
    /// A project passes when this is empty or shares at least one tag.
    pub tags: BTreeSet<ProjectType>,
    /// `false` (default) sorts newest first.
    pub oldest_first: bool,
}

impl ProjectQuery {
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_tag(mut self, tag: ProjectType) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn oldest_first(mut self, oldest_first: bool) -> Self {
        self.oldest_first = oldest_first;
        self
    }

    pub fn matches_search(&self, project: &Project) -> bool {
        self.search.is_empty()
            || project
                .name
                .to_lowercase()
                .contains(&self.search.to_lowercase())
    }

    pub fn matches_tags(&self, project: &Project) -> bool {
        self.tags.is_empty() || !self.tags.is_disjoint(&project.types)
    }

    pub fn matches(&self, project: &Project) -> bool {
        self.matches_search(project) && self.matches_tags(project)
    }
}

/// Sort key in epoch milliseconds: `date_completed` for completed projects,
/// `date_added` otherwise. Missing dates count as epoch zero.
pub fn sort_key(project: &Project) -> i64 {
    let date = if project.completed {
        project.date_completed
    } else {
        project.date_added
    };
    date.map(|d| d.timestamp_millis()).unwrap_or(0)
}

/// Filter `projects` by `query` and sort the survivors by [`sort_key`].
///
/// The sort is stable, so projects with equal keys keep their input order.
pub fn apply(projects: &[Project], query: &ProjectQuery) -> Vec<Project> {
    let mut view: Vec<Project> = projects
        .iter()
        .filter(|p| query.matches(p))
        .cloned()
        .collect();

    if query.oldest_first {
        view.sort_by_key(sort_key);
    } else {
        view.sort_by_key(|p| std::cmp::Reverse(sort_key(p)));
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{NewProject, ProjectId};
    use chrono::{DateTime, Utc};

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    fn project(id: i64, name: &str, added: Option<i64>, tags: &[ProjectType]) -> Project {
        let mut input = NewProject::new(name);
        for tag in tags {
            input = input.with_type(*tag);
        }
        let mut p = input.into_project(ProjectId::from(id), Utc::now());
        p.date_added = added.map(at);
        p
    }

    fn sample() -> Vec<Project> {
        vec![
            project(1, "LayerZero", Some(3_000), &[ProjectType::Retro]),
            project(2, "Monad Testnet", Some(1_000), &[ProjectType::Testnet, ProjectType::Daily]),
            project(3, "Grass", None, &[ProjectType::Depin]),
            project(4, "layer3 quests", Some(2_000), &[ProjectType::Daily]),
        ]
    }

    fn ids(view: &[Project]) -> Vec<&str> {
        view.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn empty_query_returns_everything_newest_first() {
        let view = apply(&sample(), &ProjectQuery::default());
        assert_eq!(ids(&view), ["1", "4", "2", "3"]);
    }

    #[test]
    fn oldest_first_puts_undated_first() {
        let view = apply(&sample(), &ProjectQuery::default().oldest_first(true));
        assert_eq!(ids(&view), ["3", "2", "4", "1"]);
    }

    #[test]
    fn search_is_case_insensitive_and_name_only() {
        let view = apply(&sample(), &ProjectQuery::default().with_search("LAYER"));
        assert_eq!(ids(&view), ["1", "4"]);
    }

    #[test]
    fn tag_filter_uses_intersection() {
        let query = ProjectQuery::default()
            .with_tag(ProjectType::Daily)
            .with_tag(ProjectType::Depin);
        let view = apply(&sample(), &query);
        assert_eq!(ids(&view), ["4", "2", "3"]);
    }

    #[test]
    fn both_filters_must_pass() {
        let query = ProjectQuery::default()
            .with_search("layer")
            .with_tag(ProjectType::Daily);
        let view = apply(&sample(), &query);
        assert_eq!(ids(&view), ["4"]);
    }

    #[test]
    fn tag_filter_never_grows_result() {
        let projects = sample();
        let base = apply(&projects, &ProjectQuery::default().with_search("a")).len();
        for tag in ProjectType::ALL {
            let query = ProjectQuery::default().with_search("a").with_tag(tag);
            assert!(apply(&projects, &query).len() <= base);
        }
    }

    #[test]
    fn completed_projects_sort_by_completion_date() {
        let mut early = project(10, "Early", Some(9_000), &[]);
        early.set_completed(true, at(1_000));
        let mut late = project(11, "Late", Some(1_000), &[]);
        late.set_completed(true, at(5_000));

        let view = apply(&[early, late], &ProjectQuery::default());
        assert_eq!(ids(&view), ["11", "10"]);
    }

    #[test]
    fn input_is_not_mutated() {
        let projects = sample();
        let before = projects.clone();
        let _ = apply(&projects, &ProjectQuery::default().oldest_first(true));
        assert_eq!(projects, before);
    }
}
