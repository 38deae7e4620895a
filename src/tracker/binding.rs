// Which tracker holds a given project's tasks

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::{ArtifactLocator, NoArtifacts, TaskTracker, TrackerError};
use crate::state::Project;

/// The task tracker and artifact locator serving one project
#[derive(Clone)]
pub struct ProjectTracker {
    pub tasks: Arc<dyn TaskTracker>,
    pub artifacts: Arc<dyn ArtifactLocator>,
}

impl ProjectTracker {
    pub fn new(tasks: Arc<dyn TaskTracker>) -> Self {
        Self {
            tasks,
            artifacts: Arc::new(NoArtifacts),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactLocator>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// Maps a registered project onto its tracker.
///
/// Every operation that reads or moves labels resolves through this, so two
/// projects never see each other's queues.
pub trait TrackerResolver: Send + Sync {
    fn resolve(&self, project_id: &str, project: &Project) -> Result<ProjectTracker, TrackerError>;
}

/// One tracker for every project; single-project setups and dry runs
pub struct SharedTracker(ProjectTracker);

impl SharedTracker {
    pub fn new(tasks: Arc<dyn TaskTracker>) -> Self {
        Self(ProjectTracker::new(tasks))
    }

    pub fn with_artifacts(self, artifacts: Arc<dyn ArtifactLocator>) -> Self {
        Self(self.0.with_artifacts(artifacts))
    }
}

impl TrackerResolver for SharedTracker {
    fn resolve(&self, _project_id: &str, _project: &Project) -> Result<ProjectTracker, TrackerError> {
        Ok(self.0.clone())
    }
}

/// Explicit bindings keyed by project id
#[derive(Default)]
pub struct TrackerMap {
    bindings: RwLock<BTreeMap<String, ProjectTracker>>,
}

impl TrackerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, project_id: &str, tracker: ProjectTracker) {
        self.bindings
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(project_id.to_string(), tracker);
    }
}

impl TrackerResolver for TrackerMap {
    fn resolve(&self, project_id: &str, _project: &Project) -> Result<ProjectTracker, TrackerError> {
        self.bindings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(project_id)
            .cloned()
            .ok_or_else(|| TrackerError::Unbound(project_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::InMemoryTracker;

    #[tokio::test]
    async fn bound_projects_see_only_their_own_tasks() {
        let alpha = Arc::new(InMemoryTracker::new());
        let beta = Arc::new(InMemoryTracker::new());
        alpha.add_task(1, "alpha work", &["To Do"]);
        beta.add_task(2, "beta work", &["To Do"]);

        let map = TrackerMap::new();
        map.bind("alpha", ProjectTracker::new(alpha));
        map.bind("beta", ProjectTracker::new(beta));

        let project = Project::new("any", "/src");
        let listed = map
            .resolve("beta", &project)
            .unwrap()
            .tasks
            .list_by_label("To Do")
            .await
            .unwrap();
        assert_eq!(listed.iter().map(|task| task.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn unbound_project_is_an_error() {
        let err = TrackerMap::new()
            .resolve("ghost", &Project::new("ghost", "/src"))
            .err()
            .unwrap();
        assert!(matches!(err, TrackerError::Unbound(ref id) if id == "ghost"));
    }
}
