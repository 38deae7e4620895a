use async_trait::async_trait;
use octocrab::models::IssueState;
use octocrab::params::{self, State};
use octocrab::Octocrab;
use regex::Regex;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, info};

use super::{ArtifactLocator, Comment, ProjectTracker, Task, TaskState, TaskTracker, TrackerError, TrackerResolver};
use crate::state::Project;

const LABEL_COLOR: &str = "5319e7";

/// GitHub Issues as the task tracker
pub struct GitHubTracker {
    octocrab: Octocrab,
    owner: String,
    repo: String,
    timeout: Duration,
}

impl GitHubTracker {
    pub fn new(token: &str, owner: &str, repo: &str, timeout: Duration) -> Result<Self, TrackerError> {
        let octocrab = Octocrab::builder()
            .personal_token(token.to_string())
            .build()
            .map_err(|e| TrackerError::Api(e.to_string()))?;

        Ok(Self::from_octocrab(octocrab, owner, repo, timeout))
    }

    /// Use a preconfigured client (custom base URI, GitHub Enterprise)
    pub fn from_octocrab(octocrab: Octocrab, owner: &str, repo: &str, timeout: Duration) -> Self {
        Self {
            octocrab,
            owner: owner.to_string(),
            repo: repo.to_string(),
            timeout,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Run one API call under the configured timeout. Expiry is a failure, never retried.
    async fn call<T, F>(&self, operation: &str, request: F) -> Result<T, TrackerError>
    where
        F: Future<Output = Result<T, octocrab::Error>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_octocrab_error(e)),
            Err(_) => Err(TrackerError::Timeout {
                operation: operation.to_string(),
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}

/// Resolves each project's `owner/repo` binding to its own GitHub client
pub struct GitHubTrackers {
    token: String,
    timeout: Duration,
    base_uri: Option<String>,
    clients: Mutex<BTreeMap<String, Arc<GitHubTracker>>>,
}

impl GitHubTrackers {
    pub fn new(token: &str, timeout: Duration) -> Self {
        Self {
            token: token.to_string(),
            timeout,
            base_uri: None,
            clients: Mutex::new(BTreeMap::new()),
        }
    }

    /// Point every client at another API root (GitHub Enterprise, test servers)
    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    fn client(&self, owner: &str, repo: &str) -> Result<GitHubTracker, TrackerError> {
        let mut builder = Octocrab::builder().personal_token(self.token.clone());
        if let Some(base_uri) = &self.base_uri {
            builder = builder
                .base_uri(base_uri.as_str())
                .map_err(|e| TrackerError::Api(e.to_string()))?;
        }
        let octocrab = builder.build().map_err(|e| TrackerError::Api(e.to_string()))?;
        Ok(GitHubTracker::from_octocrab(octocrab, owner, repo, self.timeout))
    }
}

pub fn parse_binding(binding: &str) -> Result<(&str, &str), TrackerError> {
    match binding.trim().split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => Ok((owner, repo)),
        _ => Err(TrackerError::InvalidBinding(binding.to_string())),
    }
}

impl TrackerResolver for GitHubTrackers {
    fn resolve(&self, project_id: &str, project: &Project) -> Result<ProjectTracker, TrackerError> {
        let binding = project
            .tracker
            .as_deref()
            .ok_or_else(|| TrackerError::Unbound(project_id.to_string()))?;
        let (owner, repo) = parse_binding(binding)?;
        let key = format!("{owner}/{repo}");

        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        let tracker = match clients.get(&key).cloned() {
            Some(tracker) => tracker,
            None => {
                debug!(project = %project_id, tracker = %key, "Creating GitHub client");
                let tracker = Arc::new(self.client(owner, repo)?);
                clients.insert(key, tracker.clone());
                tracker
            }
        };
        Ok(ProjectTracker::new(tracker.clone()).with_artifacts(tracker))
    }
}

fn map_octocrab_error(err: octocrab::Error) -> TrackerError {
    match &err {
        octocrab::Error::GitHub { source, .. } => {
            TrackerError::Api(format!("HTTP {}: {}", source.status_code, source.message))
        }
        _ => TrackerError::Api(err.to_string()),
    }
}

fn is_not_found(err: &octocrab::Error) -> bool {
    matches!(err, octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404)
}

fn to_task(issue: octocrab::models::issues::Issue) -> Task {
    Task {
        id: issue.number,
        title: issue.title,
        description: issue.body.unwrap_or_default(),
        labels: issue.labels.into_iter().map(|label| label.name).collect(),
        state: match issue.state {
            IssueState::Closed => TaskState::Closed,
            _ => TaskState::Open,
        },
        url: issue.html_url.to_string(),
    }
}

/// Closing keywords GitHub understands in pull request bodies
fn issue_reference_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\b(?:fix|fixes|fixed)\s+#(\d+)",
            r"(?i)\b(?:close|closes|closed)\s+#(\d+)",
            r"(?i)\b(?:resolve|resolves|resolved)\s+#(\d+)",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

pub(crate) fn body_references_issue(body: &str, issue_id: u64) -> bool {
    let wanted = issue_id.to_string();
    issue_reference_patterns().iter().any(|pattern| {
        pattern
            .captures_iter(body)
            .any(|captures| captures.get(1).map(|m| m.as_str() == wanted).unwrap_or(false))
    })
}

/// Branch names like `feature/42-add-login` or `42-fix`
pub(crate) fn branch_references_issue(branch: &str, issue_id: u64) -> bool {
    let wanted = issue_id.to_string();
    branch
        .rsplit('/')
        .next()
        .and_then(|tail| tail.split(|c: char| !c.is_ascii_digit()).find(|part| !part.is_empty()))
        .map(|number| number == wanted)
        .unwrap_or(false)
}

#[async_trait]
impl TaskTracker for GitHubTracker {
    /// First page only; ascending order keeps the oldest task on it
    async fn list_by_label(&self, label: &str) -> Result<Vec<Task>, TrackerError> {
        let labels = [label.to_string()];
        let issues = self.octocrab.issues(&self.owner, &self.repo);
        let page = self
            .call(
                "list_by_label",
                issues
                    .list()
                    .labels(&labels)
                    .state(State::Open)
                    .sort(params::issues::Sort::Created)
                    .direction(params::Direction::Ascending)
                    .per_page(100)
                    .send(),
            )
            .await?;

        let tasks: Vec<Task> = page
            .items
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .map(to_task)
            .collect();
        debug!(label = %label, count = tasks.len(), "Listed tasks by label");
        Ok(tasks)
    }

    async fn get(&self, id: u64) -> Result<Task, TrackerError> {
        let issues = self.octocrab.issues(&self.owner, &self.repo);
        match tokio::time::timeout(self.timeout, issues.get(id)).await {
            Ok(Ok(issue)) => Ok(to_task(issue)),
            Ok(Err(e)) if is_not_found(&e) => Err(TrackerError::TaskNotFound(id)),
            Ok(Err(e)) => Err(map_octocrab_error(e)),
            Err(_) => Err(TrackerError::Timeout {
                operation: "get".to_string(),
                seconds: self.timeout.as_secs(),
            }),
        }
    }

    async fn list_comments(&self, id: u64) -> Result<Vec<Comment>, TrackerError> {
        let issues = self.octocrab.issues(&self.owner, &self.repo);
        let page = self
            .call("list_comments", issues.list_comments(id).per_page(100).send())
            .await?;

        Ok(page
            .items
            .into_iter()
            .map(|comment| Comment {
                author: comment.user.login,
                body: comment.body.unwrap_or_default(),
                created_at: comment.created_at,
            })
            .collect())
    }

    async fn transition_label(&self, id: u64, from: &str, to: &str) -> Result<(), TrackerError> {
        let task = self.get(id).await?;
        if !task.has_label(from) {
            return Err(TrackerError::LabelMismatch {
                issue_id: id,
                expected: from.to_string(),
                actual: task.labels,
            });
        }

        let mut labels: Vec<String> = task.labels.into_iter().filter(|label| label != from).collect();
        if !labels.iter().any(|label| label == to) {
            labels.push(to.to_string());
        }

        // one PATCH replaces the label set, so there is no moment with both or neither
        let issues = self.octocrab.issues(&self.owner, &self.repo);
        self.call("transition_label", issues.update(id).labels(&labels).send())
            .await?;
        info!(issue = id, from = %from, to = %to, "Label transitioned");
        Ok(())
    }

    async fn close(&self, id: u64) -> Result<(), TrackerError> {
        let issues = self.octocrab.issues(&self.owner, &self.repo);
        self.call("close", issues.update(id).state(IssueState::Closed).send())
            .await?;
        info!(issue = id, "Issue closed");
        Ok(())
    }

    async fn reopen(&self, id: u64) -> Result<(), TrackerError> {
        let issues = self.octocrab.issues(&self.owner, &self.repo);
        self.call("reopen", issues.update(id).state(IssueState::Open).send())
            .await?;
        info!(issue = id, "Issue reopened");
        Ok(())
    }

    async fn ensure_labels(&self, labels: &[String]) -> Result<Vec<String>, TrackerError> {
        let issues = self.octocrab.issues(&self.owner, &self.repo);
        let existing = self
            .call("list_labels", issues.list_labels_for_repo().per_page(100).send())
            .await?;
        let existing: Vec<String> = existing.items.into_iter().map(|label| label.name).collect();

        let mut created = Vec::new();
        for label in labels {
            if existing.iter().any(|name| name.eq_ignore_ascii_case(label)) {
                continue;
            }
            match tokio::time::timeout(
                self.timeout,
                issues.create_label(label, LABEL_COLOR, "Workflow state"),
            )
            .await
            {
                Ok(Ok(_)) => created.push(label.clone()),
                Ok(Err(octocrab::Error::GitHub { source, .. }))
                    if source.message.contains("already_exists") => {}
                Ok(Err(e)) => return Err(map_octocrab_error(e)),
                Err(_) => {
                    return Err(TrackerError::Timeout {
                        operation: "create_label".to_string(),
                        seconds: self.timeout.as_secs(),
                    })
                }
            }
        }

        if !created.is_empty() {
            info!(created = ?created, "Provisioned workflow labels");
        }
        Ok(created)
    }
}

#[async_trait]
impl ArtifactLocator for GitHubTracker {
    async fn find_artifact(&self, id: u64) -> Result<Option<String>, TrackerError> {
        let pulls = self.octocrab.pulls(&self.owner, &self.repo);
        let page = self
            .call(
                "find_artifact",
                pulls
                    .list()
                    .state(State::All)
                    .sort(params::pulls::Sort::Created)
                    .direction(params::Direction::Descending)
                    .per_page(50)
                    .send(),
            )
            .await?;

        let url = page
            .items
            .into_iter()
            .find(|pr| {
                pr.body
                    .as_deref()
                    .map(|body| body_references_issue(body, id))
                    .unwrap_or(false)
                    || branch_references_issue(&pr.head.ref_field, id)
            })
            .and_then(|pr| pr.html_url)
            .map(|url| url.to_string());
        Ok(url)
    }
}
