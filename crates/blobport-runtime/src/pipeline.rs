use anyhow::{ensure, Result};
use blobport_core::ServingSession;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

use crate::{BatchPolicy, Batcher, InferenceRequest, Scheduler, Worker};

/// Running batcher -> scheduler -> worker chain.
pub struct Pipeline {
    pub tx: mpsc::Sender<InferenceRequest>,
    pub tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawns one worker per session. Must be called inside a tokio runtime.
    pub fn spawn(policy: BatchPolicy, sessions: Vec<Box<dyn ServingSession>>) -> Result<Self> {
        ensure!(!sessions.is_empty(), "pipeline needs at least one session");

        let (batcher_tx, batcher_rx) = mpsc::channel(1024);
        let (sched_tx, sched_rx) = mpsc::channel(1024);

        let mut worker_txs = Vec::with_capacity(sessions.len());
        let mut workers = Vec::with_capacity(sessions.len());
        for (id, session) in sessions.into_iter().enumerate() {
            let (w_tx, w_rx) = mpsc::channel(128);
            worker_txs.push(w_tx);
            workers.push(Worker {
                id: id as u32,
                inbox: w_rx,
                session,
            });
        }

        let scheduler = Scheduler::new(sched_rx, worker_txs)?;
        let batcher = Batcher::new(policy, batcher_rx, Scheduler::handle(sched_tx));

        let mut tasks = Vec::with_capacity(workers.len() + 2);
        tasks.push(tokio::spawn(async move {
            if let Err(e) = scheduler.run().await {
                error!(error = ?e, "scheduler exited");
            }
        }));
        tasks.push(tokio::spawn(async move {
            if let Err(e) = batcher.run().await {
                error!(error = ?e, "batcher exited");
            }
        }));
        for worker in workers {
            tasks.push(tokio::spawn(async move {
                let id = worker.id;
                if let Err(e) = worker.run().await {
                    error!(worker_id = id, error = ?e, "worker exited");
                }
            }));
        }

        Ok(Self {
            tx: batcher_tx,
            tasks,
        })
    }

    /// Closes the request channel and waits for in-flight work to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
