//! Result handle for a dispatched task

use crate::error::{AnchorError, AnchorResult};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::warn;
use uuid::Uuid;

/// Resolves exactly once with the task's output or its error.
///
/// Giving up on the result through a timeout stops the task as well, so it
/// does not keep a worker busy with nobody listening.
#[derive(Debug)]
pub struct TaskHandle {
    pub id: Uuid,
    pub task_name: String,
    pub dispatched_at: DateTime<Utc>,
    result: oneshot::Receiver<AnchorResult<Value>>,
    abort: Option<AbortHandle>,
}

impl TaskHandle {
    pub(crate) fn new(task_name: &str, result: oneshot::Receiver<AnchorResult<Value>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_name: task_name.to_string(),
            dispatched_at: Utc::now(),
            result,
            abort: None,
        }
    }

    pub(crate) fn bind(&mut self, abort: AbortHandle) {
        self.abort = Some(abort);
    }

    /// Wait up to `timeout` for the task to finish
    pub async fn get(self, timeout: Duration) -> AnchorResult<Value> {
        match tokio::time::timeout(timeout, self.result).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AnchorError::Internal(format!(
                "task {} [{}] dropped its result",
                self.task_name, self.id
            ))),
            Err(_) => {
                if let Some(abort) = &self.abort {
                    warn!("Task {} [{}] timed out, stopping it", self.task_name, self.id);
                    abort.abort();
                }
                Err(AnchorError::ConfirmationTimeout {
                    operation: format!("task {} [{}]", self.task_name, self.id),
                })
            }
        }
    }

    /// Wait for the task and deserialize its output
    pub async fn get_as<T: DeserializeOwned>(self, timeout: Duration) -> AnchorResult<T> {
        let name = self.task_name.clone();
        let value = self.get(timeout).await?;
        serde_json::from_value(value)
            .map_err(|e| AnchorError::Internal(format!("unexpected output of task {}: {}", name, e)))
    }
}
