use anyhow::Result;
use blobport_core::{BatchingConfig, IOName, Shape, Tensor};
use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

use crate::{InferenceRequest, SchedulerHandle};

#[derive(Clone, Debug)]
pub struct BatchPolicy {
    /// Rows to accumulate before flushing.
    pub max_batch: usize,
    pub max_delay: Duration,
}

impl From<&BatchingConfig> for BatchPolicy {
    fn from(cfg: &BatchingConfig) -> Self {
        Self {
            max_batch: cfg.max_batch.max(1),
            max_delay: cfg.max_delay,
        }
    }
}

/// A batch ready to run on a worker.
#[derive(Debug)]
pub struct BatchJob {
    pub model: String,
    pub requests: Vec<InferenceRequest>,
    /// Inputs of every request concatenated along the leading dimension.
    pub merged_inputs: Vec<(IOName, Tensor)>,
    pub output_names: Vec<IOName>,
    pub created_at: std::time::Instant,
}

impl BatchJob {
    pub fn from_requests(requests: Vec<InferenceRequest>) -> Self {
        let merged_inputs = merge_inputs(&requests);
        let first = &requests[0];
        Self {
            model: first.model.clone(),
            output_names: first.output_names.clone(),
            merged_inputs,
            requests,
            created_at: std::time::Instant::now(),
        }
    }

    pub fn rows(&self) -> Vec<usize> {
        self.requests.iter().map(InferenceRequest::rows).collect()
    }
}

pub struct Batcher {
    policy: BatchPolicy,
    rx: mpsc::Receiver<InferenceRequest>,
    scheduler: SchedulerHandle,
}

impl Batcher {
    pub fn new(
        policy: BatchPolicy,
        rx: mpsc::Receiver<InferenceRequest>,
        scheduler: SchedulerHandle,
    ) -> Self {
        Self {
            policy,
            rx,
            scheduler,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut pending: Vec<InferenceRequest> = Vec::new();
        let mut pending_rows = 0usize;
        let mut first_seen: Option<Instant> = None;
        let max_delay = self.policy.max_delay;

        loop {
            tokio::select! {
                maybe_req = self.rx.recv() => {
                    match maybe_req {
                        None => break,
                        Some(req) => {
                            if pending.is_empty() { first_seen = Some(Instant::now()); }
                            pending_rows += req.rows().max(1);
                            pending.push(req);
                            if pending_rows >= self.policy.max_batch {
                                self.flush(&mut pending).await?;
                                pending_rows = 0;
                                first_seen = None;
                            }
                        }
                    }
                }
                _ = async {
                    if let Some(t0) = first_seen {
                        sleep(max_delay.saturating_sub(t0.elapsed())).await;
                    }
                }, if first_seen.is_some() => {
                    self.flush(&mut pending).await?;
                    pending_rows = 0;
                    first_seen = None;
                }
            }
        }

        self.flush(&mut pending).await
    }

    async fn flush(&self, pending: &mut Vec<InferenceRequest>) -> Result<()> {
        let reqs = std::mem::take(pending);
        for group in group_compatible(reqs, self.policy.max_batch) {
            let job = BatchJob::from_requests(group);
            debug!(
                model = %job.model,
                requests = job.requests.len(),
                rows = job.rows().iter().sum::<usize>(),
                "dispatching batch"
            );
            self.scheduler.submit(job).await?;
        }
        Ok(())
    }
}

/// Splits requests into runs that can share one session call, keeping arrival order.
pub fn group_compatible(
    reqs: Vec<InferenceRequest>,
    max_batch: usize,
) -> Vec<Vec<InferenceRequest>> {
    let mut groups: Vec<Vec<InferenceRequest>> = Vec::new();
    let mut rows = 0usize;
    for req in reqs {
        let fits = groups.last().is_some_and(|group| {
            rows + req.rows() <= max_batch && can_merge(&group[0], &req)
        });
        if fits {
            rows += req.rows();
            if let Some(group) = groups.last_mut() {
                group.push(req);
            }
        } else {
            rows = req.rows();
            groups.push(vec![req]);
        }
    }
    groups
}

/// Two requests merge when their inputs line up name by name and differ
/// only in the leading dimension.
fn can_merge(a: &InferenceRequest, b: &InferenceRequest) -> bool {
    a.model == b.model
        && a.output_names == b.output_names
        && a.inputs.len() == b.inputs.len()
        && mergeable_rows(a).is_some()
        && mergeable_rows(b).is_some()
        && a.inputs.iter().zip(&b.inputs).all(|((na, ta), (nb, tb))| {
            na == nb && ta.dtype() == tb.dtype() && ta.shape().dims()[1..] == tb.shape().dims()[1..]
        })
}

/// Row count when every input is dense and shares the same leading dimension.
fn mergeable_rows(req: &InferenceRequest) -> Option<usize> {
    let rows = req.rows();
    if rows == 0 {
        return None;
    }
    req.inputs
        .iter()
        .all(|(_, t)| {
            t.shape().rank() >= 2
                && t.shape().leading() == Some(rows)
                && t.byte_len() == t.shape().numel() * t.dtype().byte_size()
        })
        .then_some(rows)
}

fn merge_inputs(reqs: &[InferenceRequest]) -> Vec<(IOName, Tensor)> {
    if reqs.len() == 1 {
        return reqs[0].inputs.clone();
    }
    reqs[0]
        .inputs
        .iter()
        .enumerate()
        .map(|(i, (name, first))| {
            let parts: Vec<&Tensor> = reqs.iter().map(|r| &r.inputs[i].1).collect();
            let rows: usize = parts.iter().filter_map(|t| t.shape().leading()).sum();
            let mut dims = first.shape().dims().to_vec();
            dims[0] = rows;
            let mut buf = BytesMut::with_capacity(parts.iter().map(|t| t.byte_len()).sum());
            for part in parts {
                buf.extend_from_slice(&part.data);
            }
            (
                name.clone(),
                Tensor::from_cpu_bytes(first.dtype(), Shape::from_slice(&dims), buf.freeze()),
            )
        })
        .collect()
}
