use anyhow::{bail, ensure, Result};
use tokio::sync::mpsc;
use tracing::warn;

use crate::BatchJob;

#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<BatchJob>,
}

impl SchedulerHandle {
    pub async fn submit(&self, job: BatchJob) -> Result<()> {
        self.tx
            .send(job)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))
    }
}

/// Hands batch jobs to workers round-robin.
pub struct Scheduler {
    rx: mpsc::Receiver<BatchJob>,
    worker_txs: Vec<mpsc::Sender<BatchJob>>,
    rr: usize,
}

impl Scheduler {
    pub fn new(
        rx: mpsc::Receiver<BatchJob>,
        worker_txs: Vec<mpsc::Sender<BatchJob>>,
    ) -> Result<Self> {
        ensure!(!worker_txs.is_empty(), "scheduler needs at least one worker");
        Ok(Self {
            rx,
            worker_txs,
            rr: 0,
        })
    }

    pub fn handle(tx: mpsc::Sender<BatchJob>) -> SchedulerHandle {
        SchedulerHandle { tx }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(mut job) = self.rx.recv().await {
            // Skip workers whose inbox has closed; give up once none are left.
            loop {
                if self.worker_txs.is_empty() {
                    bail!("all workers have stopped");
                }
                let idx = self.rr % self.worker_txs.len();
                self.rr = self.rr.wrapping_add(1);
                match self.worker_txs[idx].send(job).await {
                    Ok(()) => break,
                    Err(mpsc::error::SendError(returned)) => {
                        warn!(worker = idx, "worker inbox closed, dropping it from rotation");
                        self.worker_txs.remove(idx);
                        job = returned;
                    }
                }
            }
        }
        Ok(())
    }
}
