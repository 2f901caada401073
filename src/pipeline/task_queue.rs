//! Bounded worker pool for write-and-publish units.
//!
//! `stop()` closes submission and waits until every submitted job has run, so
//! dropping work on shutdown is impossible through this API.

use crate::error::{CrawlerError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// A unit of work executed by a `TaskQueue` worker.
#[async_trait]
pub trait Job: Send + Sync {
    type Output: Send + 'static;

    async fn run(&self) -> Self::Output;
}

type BoxedJob<T> = Box<dyn Job<Output = T>>;

pub struct TaskQueue<T: Send + 'static> {
    sender: mpsc::UnboundedSender<BoxedJob<T>>,
    workers: Vec<JoinHandle<Vec<T>>>,
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Spawns `workers` workers. When `budget` is given, each job also holds
    /// one of its permits while running.
    pub fn start(workers: usize, budget: Option<Arc<Semaphore>>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<BoxedJob<T>>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let budget = budget.clone();
                tokio::spawn(async move {
                    let mut outputs = Vec::new();
                    loop {
                        let next = { receiver.lock().await.recv().await };
                        let Some(job) = next else { break };
                        // A closed budget no longer limits anything.
                        let _permit = match &budget {
                            Some(sem) => Arc::clone(sem).acquire_owned().await.ok(),
                            None => None,
                        };
                        outputs.push(job.run().await);
                    }
                    debug!("Task queue worker {} drained", worker_id);
                    outputs
                })
            })
            .collect();

        Self { sender, workers }
    }

    pub fn submit<J>(&self, job: J) -> Result<()>
    where
        J: Job<Output = T> + 'static,
    {
        self.sender
            .send(Box::new(job))
            .map_err(|_| CrawlerError::Queue("task queue workers are gone".into()))
    }

    /// Closes the queue and waits for every submitted job. Outputs are in
    /// completion order per worker, not submission order.
    pub async fn stop(self) -> Result<Vec<T>> {
        let TaskQueue { sender, workers } = self;
        drop(sender);

        let mut outputs = Vec::new();
        let mut failure = None;
        for handle in workers {
            match handle.await {
                Ok(mut out) => outputs.append(&mut out),
                Err(e) => {
                    error!("Task queue worker failed: {}", e);
                    failure.get_or_insert(CrawlerError::Task(e.to_string()));
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(outputs),
        }
    }
}
