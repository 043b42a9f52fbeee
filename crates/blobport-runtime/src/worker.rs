use anyhow::{ensure, Result};
use blobport_core::{IOName, ServingSession, SessionError, Shape, Tensor};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{BatchJob, InferenceResponse, Timings};

/// Owns one session and runs its jobs one after another, so the session never
/// sees two calls at once.
pub struct Worker {
    pub id: u32,
    pub inbox: mpsc::Receiver<BatchJob>,
    pub session: Box<dyn ServingSession>,
}

impl Worker {
    pub async fn run(mut self) -> Result<()> {
        info!(worker_id = self.id, model = %self.session.spec().name, "worker started");
        while let Some(job) = self.inbox.recv().await {
            self.execute(job);
        }
        Ok(())
    }

    /// Runs one job and answers every request in it.
    pub fn execute(&mut self, job: BatchJob) {
        let picked_up = std::time::Instant::now();
        let rows = job.rows();
        let t0 = std::time::Instant::now();
        let result = self
            .session
            .run(&job.merged_inputs, &job.output_names, &[]);
        let backend_us = t0.elapsed().as_micros() as u64;
        debug!(worker_id = self.id, requests = rows.len(), backend_us, "batch finished");

        let per_request = match result {
            Ok(outputs) if job.requests.len() == 1 => Ok(vec![outputs]),
            Ok(outputs) => split_outputs(outputs, &rows).map_err(|e| {
                SessionError::fatal(format!("merged outputs could not be split: {e}"))
            }),
            Err(err) => Err(err),
        };

        let queued_us = picked_up.duration_since(job.created_at).as_micros() as u64;
        match per_request {
            Ok(split) => {
                for (req, outputs) in job.requests.into_iter().zip(split) {
                    let timings = Timings {
                        batched_us: job.created_at.duration_since(req.enqueued_at).as_micros()
                            as u64,
                        queued_us,
                        backend_us,
                    };
                    let outputs: Vec<(IOName, Tensor)> =
                        job.output_names.iter().cloned().zip(outputs).collect();
                    if req
                        .resp_tx
                        .send(Ok(InferenceResponse { outputs, timings }))
                        .is_err()
                    {
                        debug!(worker_id = self.id, "requester went away");
                    }
                }
            }
            Err(err) => {
                warn!(worker_id = self.id, error = %err, "batch failed");
                for req in job.requests {
                    let _ = req.resp_tx.send(Err(err.clone()));
                }
            }
        }
    }
}

/// Cuts each merged output back into per-request tensors by row counts.
fn split_outputs(outputs: Vec<Tensor>, rows: &[usize]) -> Result<Vec<Vec<Tensor>>> {
    let total: usize = rows.iter().sum();
    let mut per_request: Vec<Vec<Tensor>> = rows.iter().map(|_| Vec::new()).collect();
    for output in outputs {
        ensure!(
            output.shape().leading() == Some(total),
            "output has shape {:?}, expected {total} rows",
            output.shape().dims()
        );
        let row_bytes = output.shape().per_row() * output.dtype().byte_size();
        ensure!(
            output.byte_len() >= total * row_bytes,
            "output holds {} bytes, expected {}",
            output.byte_len(),
            total * row_bytes
        );
        let mut offset = 0;
        for (slot, &n) in per_request.iter_mut().zip(rows) {
            let mut dims = output.shape().dims().to_vec();
            dims[0] = n;
            let bytes = output.data.slice(offset * row_bytes..(offset + n) * row_bytes);
            slot.push(Tensor::from_cpu_bytes(
                output.dtype(),
                Shape::from_slice(&dims),
                bytes,
            ));
            offset += n;
        }
    }
    Ok(per_request)
}
