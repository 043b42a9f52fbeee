use std::time::Instant;

use blobport_core::{IOName, SessionError, Tensor};
use tokio::sync::oneshot;

pub type ResponseTx = oneshot::Sender<Result<InferenceResponse, SessionError>>;
pub type ResponseRx = oneshot::Receiver<Result<InferenceResponse, SessionError>>;

#[derive(Debug)]
pub struct InferenceRequest {
    pub model: String,
    pub inputs: Vec<(IOName, Tensor)>,
    pub output_names: Vec<IOName>,
    pub enqueued_at: Instant,
    pub resp_tx: ResponseTx,
}

impl InferenceRequest {
    pub fn new(
        model: impl Into<String>,
        inputs: Vec<(IOName, Tensor)>,
        output_names: Vec<IOName>,
    ) -> (Self, ResponseRx) {
        let (resp_tx, rx) = oneshot::channel();
        let req = Self {
            model: model.into(),
            inputs,
            output_names,
            enqueued_at: Instant::now(),
            resp_tx,
        };
        (req, rx)
    }

    /// Rows carried by the request, read from its first input like the session does.
    pub fn rows(&self) -> usize {
        self.inputs
            .first()
            .and_then(|(_, t)| t.shape().leading())
            .unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct InferenceResponse {
    pub outputs: Vec<(IOName, Tensor)>,
    pub timings: Timings,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Timings {
    /// Enqueue until the batch was formed.
    pub batched_us: u64,
    /// Batch formed until a worker picked it up.
    pub queued_us: u64,
    pub backend_us: u64,
}
