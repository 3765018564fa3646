//! Task queue - named task registry and asynchronous dispatcher
//!
//! Task types are registered once at bootstrap as factories. Each dispatch
//! builds an independent task instance from its parameters and runs it on its
//! own tokio task. Parameter errors are reported to the caller and the task is
//! never scheduled.

mod handle;
mod params;

pub use handle::TaskHandle;
pub use params::TaskParams;

use crate::config::QueueConfig;
use crate::error::{AnchorError, AnchorResult};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, info, warn};

/// A unit of work run by the queue
#[async_trait]
pub trait Task: Send {
    fn name(&self) -> &'static str;

    async fn run(self: Box<Self>) -> AnchorResult<Value>;
}

/// Builds a fresh task instance from dispatch parameters
pub type TaskFactory = Arc<dyn Fn(&TaskParams) -> AnchorResult<Box<dyn Task>> + Send + Sync>;

/// Registry of task types plus a bounded worker pool
pub struct TaskQueue {
    factories: DashMap<String, TaskFactory>,
    workers: Arc<Semaphore>,
}

impl TaskQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self::with_workers(config.num_workers)
    }

    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            factories: DashMap::new(),
            workers: Arc::new(Semaphore::new(num_workers.max(1))),
        }
    }

    /// Register a task type. Re-registering a name replaces its factory.
    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn(&TaskParams) -> AnchorResult<Box<dyn Task>> + Send + Sync + 'static,
    {
        if self
            .factories
            .insert(name.to_string(), Arc::new(factory))
            .is_some()
        {
            warn!("Task {} registered twice, replacing previous factory", name);
        } else {
            debug!("Registered task {}", name);
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn registered_tasks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Build a task from `params` and schedule it. Never blocks on workers.
    pub fn dispatch(&self, name: &str, params: TaskParams) -> AnchorResult<TaskHandle> {
        let factory = self
            .factories
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AnchorError::UnknownTask {
                name: name.to_string(),
            })?;

        let task = factory(&params)?;

        let (result_tx, result_rx) = oneshot::channel();
        let mut handle = TaskHandle::new(name, result_rx);
        let workers = self.workers.clone();
        let task_id = handle.id;

        info!("Dispatching task {} [{}]", name, task_id);
        crate::metrics::record_task_dispatched(name);

        let worker = tokio::spawn(async move {
            let task_name = task.name();
            let result = match workers.acquire_owned().await {
                Ok(_permit) => task.run().await,
                Err(_) => Err(AnchorError::Internal("task queue closed".to_string())),
            };

            match &result {
                Ok(_) => debug!("Task {} [{}] finished", task_name, task_id),
                Err(e) => warn!("Task {} [{}] failed: {}", task_name, task_id, e),
            }
            crate::metrics::record_task_finished(task_name, result.is_ok());

            // Receiver may have been dropped by a caller that gave up waiting
            let _ = result_tx.send(result);
        });
        handle.bind(worker.abort_handle());

        Ok(handle)
    }
}
