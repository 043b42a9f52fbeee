use crate::{IOName, ModelSpec, SessionError, Tensor};

/// Synchronous request/response execution over one loaded model.
///
/// Implementations hold mutable buffers without internal locking. Callers
/// must keep at most one `run` in flight per instance.
pub trait ServingSession: Send + 'static {
    fn spec(&self) -> &ModelSpec;

    /// Runs the full graph once. `target_names` is part of the request
    /// surface; sessions that only support full-graph execution reject any
    /// non-empty value.
    fn run(
        &mut self,
        inputs: &[(IOName, Tensor)],
        output_names: &[IOName],
        target_names: &[IOName],
    ) -> Result<Vec<Tensor>, SessionError>;

    /// Grows the batch capacity ahead of traffic.
    fn reshape(&mut self, batch_size: usize) -> Result<(), SessionError>;
}
