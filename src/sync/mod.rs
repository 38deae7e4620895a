// Source sync: bring a project's local checkout up to date after a completion

use async_trait::async_trait;
use git2::build::CheckoutBuilder;
use git2::{Cred, FetchOptions, RemoteCallbacks, Repository};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("{branch} has diverged from {remote}; refusing to merge")]
    Diverged { remote: String, branch: String },

    #[error("HEAD is detached in {0}")]
    DetachedHead(String),

    #[error("source sync timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("source sync task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    UpToDate,
    FastForwarded { branch: String, commit: String },
}

#[async_trait]
pub trait SourceSync: Send + Sync {
    async fn sync(&self, repo: &str) -> Result<SyncOutcome, SyncError>;
}

/// Fetches from a remote and fast-forwards the checked out branch
pub struct GitSourceSync {
    remote: String,
    timeout: Duration,
}

impl GitSourceSync {
    pub fn new(remote: &str, timeout: Duration) -> Self {
        Self {
            remote: remote.to_string(),
            timeout,
        }
    }
}

impl Default for GitSourceSync {
    fn default() -> Self {
        Self::new("origin", Duration::from_secs(60))
    }
}

fn fetch_options<'a>() -> FetchOptions<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|_url, username_from_url, _allowed_types| {
        let user = username_from_url.unwrap_or("git");
        Cred::ssh_key_from_agent(user).or_else(|_| {
            Cred::ssh_key(
                user,
                None,
                Path::new(&format!(
                    "{}/.ssh/id_rsa",
                    std::env::var("HOME").unwrap_or_default()
                )),
                None,
            )
        })
    });
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

fn fast_forward(path: &Path, remote_name: &str) -> Result<SyncOutcome, SyncError> {
    let repo = Repository::open(path)?;
    let head = repo.head()?;
    if !head.is_branch() {
        return Err(SyncError::DetachedHead(path.display().to_string()));
    }
    let branch = head
        .shorthand()
        .ok_or_else(|| SyncError::DetachedHead(path.display().to_string()))?
        .to_string();

    let mut remote = repo.find_remote(remote_name)?;
    remote.fetch(&[branch.as_str()], Some(&mut fetch_options()), None)?;

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let fetched = repo.reference_to_annotated_commit(&fetch_head)?;
    let (analysis, _) = repo.merge_analysis(&[&fetched])?;

    if analysis.is_up_to_date() {
        return Ok(SyncOutcome::UpToDate);
    }
    if !analysis.is_fast_forward() {
        return Err(SyncError::Diverged {
            remote: remote_name.to_string(),
            branch,
        });
    }

    let refname = format!("refs/heads/{branch}");
    let mut reference = repo.find_reference(&refname)?;
    reference.set_target(fetched.id(), "labelflow: fast-forward")?;
    repo.set_head(&refname)?;
    repo.checkout_head(Some(CheckoutBuilder::default().force()))?;

    Ok(SyncOutcome::FastForwarded {
        branch,
        commit: fetched.id().to_string(),
    })
}

#[async_trait]
impl SourceSync for GitSourceSync {
    async fn sync(&self, repo: &str) -> Result<SyncOutcome, SyncError> {
        let path = PathBuf::from(repo);
        let remote = self.remote.clone();
        debug!(repo = %repo, remote = %remote, "Syncing local source");

        let task = tokio::task::spawn_blocking(move || fast_forward(&path, &remote));
        let outcome = tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| SyncError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| SyncError::Task(e.to_string()))??;

        if let SyncOutcome::FastForwarded { branch, commit } = &outcome {
            info!(repo = %repo, branch = %branch, commit = %commit, "Fast-forwarded local source");
        }
        Ok(outcome)
    }
}

pub struct NoopSync;

#[async_trait]
impl SourceSync for NoopSync {
    async fn sync(&self, _repo: &str) -> Result<SyncOutcome, SyncError> {
        Ok(SyncOutcome::UpToDate)
    }
}
