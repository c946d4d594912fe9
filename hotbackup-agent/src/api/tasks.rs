//! Upload task registry.
//!
//! Every accepted upload runs on its own tokio task. The registry keeps one
//! record per task until it is explicitly deleted; records are never evicted
//! on their own, so status stays queryable after completion.

use crate::executor::{backup::select_and_upload, checkpoint};
use crate::storage::secrets::SecretProvider;
use crate::storage::Bucket;
use crate::utils::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What to upload and where.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Destination bucket, e.g. `s3://backups/hazelcast`
    pub bucket_url: String,

    /// Secret holding the bucket credentials
    #[serde(default)]
    pub secret_name: Option<String>,

    /// Directory the cluster member writes backup sequences into
    pub backup_base_dir: PathBuf,

    /// Member index of the cluster member this sidecar serves
    pub member_id: usize,

    /// Key prefix inside the bucket
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    InProgress,
    Success,
    Failure,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        self != TaskState::InProgress
    }
}

/// Status report for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub status: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_key: Option<String>,
}

#[derive(Debug, Clone)]
enum TaskOutcome {
    Uploaded(String),
    Failed(String),
    Canceled(String),
}

struct UploadTask {
    request: UploadRequest,
    cancel: CancellationToken,
    /// Set exactly once by the worker; terminal states never change
    outcome: OnceLock<TaskOutcome>,
}

impl UploadTask {
    fn status(&self) -> TaskStatus {
        match self.outcome.get() {
            None => TaskStatus {
                status: TaskState::InProgress,
                message: None,
                backup_key: None,
            },
            Some(TaskOutcome::Uploaded(key)) => TaskStatus {
                status: TaskState::Success,
                message: None,
                backup_key: Some(key.clone()),
            },
            Some(TaskOutcome::Failed(message)) => TaskStatus {
                status: TaskState::Failure,
                message: Some(message.clone()),
                backup_key: None,
            },
            Some(TaskOutcome::Canceled(message)) => TaskStatus {
                status: TaskState::Canceled,
                message: Some(message.clone()),
                backup_key: None,
            },
        }
    }

    async fn run(&self, secrets: &dyn SecretProvider) -> Result<String> {
        let request = &self.request;

        checkpoint(&self.cancel)?;
        let bucket = Bucket::open_with_secret(
            &request.bucket_url,
            request.secret_name.as_deref(),
            secrets,
        )?;

        select_and_upload(
            &request.backup_base_dir,
            &bucket,
            &request.prefix,
            request.member_id,
            &self.cancel,
        )
        .await
    }
}

/// Owns every upload task of this agent instance.
#[derive(Clone)]
pub struct TaskTracker {
    tasks: Arc<RwLock<HashMap<Uuid, Arc<UploadTask>>>>,
    secrets: Arc<dyn SecretProvider>,
}

impl TaskTracker {
    pub fn new(secrets: Arc<dyn SecretProvider>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            secrets,
        }
    }

    /// Register an upload and start it in the background. Returns immediately.
    pub async fn create(&self, request: UploadRequest) -> Uuid {
        let id = Uuid::new_v4();
        let task = Arc::new(UploadTask {
            request,
            cancel: CancellationToken::new(),
            outcome: OnceLock::new(),
        });

        self.tasks.write().await.insert(id, Arc::clone(&task));
        info!(
            "Created upload task {} for member {} in {}",
            id,
            task.request.member_id,
            task.request.backup_base_dir.display()
        );

        let secrets = Arc::clone(&self.secrets);
        tokio::spawn(async move {
            let outcome = match task.run(secrets.as_ref()).await {
                Ok(key) => {
                    info!("Upload task {} finished: {}", id, key);
                    TaskOutcome::Uploaded(key)
                }
                Err(e @ AgentError::Cancelled) => {
                    info!("Upload task {} canceled", id);
                    TaskOutcome::Canceled(e.to_string())
                }
                Err(e) => {
                    error!("Upload task {} failed: {}", id, e);
                    TaskOutcome::Failed(e.to_string())
                }
            };
            if task.outcome.set(outcome).is_err() {
                warn!("Upload task {} reported twice", id);
            }
        });

        id
    }

    async fn get(&self, id: Uuid) -> Result<Arc<UploadTask>> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AgentError::TaskNotFound(id))
    }

    pub async fn status(&self, id: Uuid) -> Result<TaskStatus> {
        Ok(self.get(id).await?.status())
    }

    /// Ask a task to stop. The worker notices at its next phase boundary;
    /// finished tasks are unaffected.
    pub async fn cancel(&self, id: Uuid) -> Result<()> {
        let task = self.get(id).await?;
        if task.outcome.get().is_none() {
            info!("Canceling upload task {}", id);
        }
        task.cancel.cancel();
        Ok(())
    }

    /// Forget a task, signalling cancellation first if it is still running.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let task = self
            .tasks
            .write()
            .await
            .remove(&id)
            .ok_or(AgentError::TaskNotFound(id))?;
        task.cancel.cancel();
        info!("Deleted upload task {}", id);
        Ok(())
    }

    /// Signal cancellation to every task still running.
    pub async fn cancel_all(&self) {
        let tasks = self.tasks.read().await;
        for (id, task) in tasks.iter() {
            if task.outcome.get().is_none() {
                info!("Canceling upload task {} on shutdown", id);
                task.cancel.cancel();
            }
        }
    }

    /// Number of tasks without a final outcome yet.
    pub async fn running_count(&self) -> usize {
        let tasks = self.tasks.read().await;
        tasks.values().filter(|t| t.outcome.get().is_none()).count()
    }
}
