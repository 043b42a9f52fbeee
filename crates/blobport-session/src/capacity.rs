use blobport_core::SessionError;
use blobport_engine::{Blob, Net};
use tracing::info;

/// Whether a blob's leading dimension is treated as its batch axis.
fn is_batched(shape: &[usize]) -> bool {
    shape.len() > 1 && shape[0] > 0
}

/// Guesses the batch size a net was declared with.
///
/// The topology does not mark a batch axis, so the leading dimension of every
/// input with more than one dimension is taken as a candidate and the largest
/// wins. Inputs with a single dimension count as one example each. This can
/// be wrong for inputs whose leading axis is not a batch.
pub fn estimate_capacity<'a>(shapes: impl IntoIterator<Item = &'a [usize]>) -> usize {
    shapes
        .into_iter()
        .filter(|s| is_batched(s))
        .map(|s| s[0])
        .fold(1, usize::max)
}

/// Owns the batch capacity of a net's input blobs. Capacity never shrinks.
#[derive(Debug)]
pub struct CapacityManager {
    capacity: usize,
}

impl CapacityManager {
    pub fn new(initial: usize) -> Self {
        Self {
            capacity: initial.max(1),
        }
    }

    pub fn estimate(net: &Net) -> Self {
        let shapes = net
            .input_blob_indices()
            .iter()
            .filter_map(|&idx| net.blob(idx))
            .map(Blob::shape);
        Self::new(estimate_capacity(shapes))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Elements `blob` can take once a batch of `batch` rows has been admitted,
    /// or `None` when that count overflows `usize`.
    pub fn projected_count(&self, blob: &Blob, batch: usize) -> Option<usize> {
        if is_batched(blob.shape()) && batch > self.capacity {
            blob.per_example().checked_mul(batch)
        } else {
            Some(blob.count())
        }
    }

    /// Grows every batched input blob to `requested` rows and propagates the
    /// new shapes through the net. Returns whether anything was resized.
    pub fn reshape(&mut self, net: &mut Net, requested: usize) -> Result<bool, SessionError> {
        if requested < 1 {
            return Err(SessionError::invalid_argument(
                "batch_size must be at least 1",
            ));
        }
        if requested <= self.capacity {
            return Ok(false);
        }

        let inputs = net.input_blob_indices().to_vec();
        for &idx in &inputs {
            let blob = net.blob(idx).ok_or_else(|| {
                SessionError::fatal(format!("input blob index {idx} is out of range"))
            })?;
            if self.projected_count(blob, requested).is_none() {
                return Err(SessionError::invalid_argument(format!(
                    "batch_size {requested} is too large for input blob {idx}"
                )));
            }
        }
        for idx in inputs {
            let blob = net.blob_mut(idx).ok_or_else(|| {
                SessionError::fatal(format!("input blob index {idx} is out of range"))
            })?;
            if is_batched(blob.shape()) {
                let mut shape = blob.shape().to_vec();
                shape[0] = requested;
                blob.reshape(&shape);
            }
        }
        net.reshape()
            .map_err(|e| SessionError::fatal(format!("shape propagation failed: {e}")))?;

        self.capacity = requested;
        info!(net = %net.name(), batch_size = requested, "reshaped network");
        Ok(true)
    }
}
