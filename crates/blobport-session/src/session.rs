use std::path::Path;

use blobport_core::{
    DType, IOName, ModelSpec, ServingSession, SessionError, SessionOptions, Shape, Tensor,
    TensorSpec,
};
use blobport_engine::{read_net_from_binary_file, Blob, CopyReport, Net, NetParameter};
use tracing::{debug, info};

use crate::bindings::BindingTable;
use crate::capacity::CapacityManager;
use crate::device;

/// Serves one fixed-topology [`Net`] through named-tensor requests of any batch size.
///
/// The session holds mutable buffers and no lock: callers must keep at most
/// one call in flight per instance.
pub struct BlobSession {
    net: Net,
    bindings: BindingTable,
    capacity: CapacityManager,
    options: SessionOptions,
    spec: ModelSpec,
    poisoned: Option<SessionError>,
}

impl BlobSession {
    pub fn new(topology: &NetParameter, options: SessionOptions) -> Result<Self, SessionError> {
        let net = Net::new(topology)
            .map_err(|e| SessionError::fatal(format!("failed to construct network: {e}")))?;
        let bindings = BindingTable::from_net(&net)?;
        let capacity = CapacityManager::estimate(&net);
        let spec = build_spec(&net, capacity.capacity());

        info!(
            name = %net.name(),
            inputs = bindings.input_count(),
            outputs = bindings.output_count(),
            initial_batch_size = capacity.capacity(),
            mode = %device::current_device(),
            "loaded network"
        );

        Ok(Self {
            net,
            bindings,
            capacity,
            options,
            spec,
            poisoned: None,
        })
    }

    /// Builds a session from a topology stored in the engine's binary format.
    pub fn from_file(
        path: impl AsRef<Path>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let topology = read_net_from_binary_file(path).map_err(|e| {
            SessionError::invalid_argument(format!(
                "failed to read network topology from {}: {e}",
                path.display()
            ))
        })?;
        Self::new(&topology, options)
    }

    pub fn capacity(&self) -> usize {
        self.capacity.capacity()
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn net(&self) -> &Net {
        &self.net
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Grows the batch capacity to at least `batch_size` rows.
    pub fn reshape(&mut self, batch_size: usize) -> Result<(), SessionError> {
        self.ensure_usable()?;
        let resized = self.capacity.reshape(&mut self.net, batch_size);
        if self.poison_on_fatal(resized)? {
            self.spec = build_spec(&self.net, self.capacity.capacity());
        }
        Ok(())
    }

    /// Copies trained parameters from a file in the engine's binary format.
    pub fn load_weights(&mut self, path: impl AsRef<Path>) -> Result<CopyReport, SessionError> {
        self.ensure_usable()?;
        let path = path.as_ref();
        let param = read_net_from_binary_file(path).map_err(|e| {
            SessionError::invalid_argument(format!(
                "failed to load pretrained layers from file {}: {e}",
                path.display()
            ))
        })?;

        let copied = self.net.copy_trained_layers_from(&param).map_err(|e| {
            SessionError::fatal(format!(
                "pretrained layers in {} do not fit the network: {e}",
                path.display()
            ))
        });
        let report = self.poison_on_fatal(copied)?;
        info!(
            file = %path.display(),
            copied = report.copied.len(),
            skipped = report.skipped.len(),
            "loaded pretrained layers"
        );
        Ok(report)
    }

    /// Runs the whole net once over `inputs` and returns `output_names` in order.
    ///
    /// The batch size is read from the first input only; every other input
    /// must agree with it on the leading dimension. Trailing dimensions are
    /// not checked against the buffers. Outputs come back as
    /// `(batch, per_example)` tensors whatever their native rank.
    pub fn run(
        &mut self,
        inputs: &[(IOName, Tensor)],
        output_names: &[IOName],
        target_names: &[IOName],
    ) -> Result<Vec<Tensor>, SessionError> {
        self.ensure_usable()?;

        if !target_names.is_empty() {
            return Err(SessionError::invalid_argument(
                "target_names is not supported; only full-graph execution is available",
            ));
        }

        let expected = self.bindings.input_count();
        if inputs.is_empty() || inputs.len() < expected {
            return Err(SessionError::invalid_argument(format!(
                "expected {expected} inputs, but got {}",
                inputs.len()
            )));
        }

        let batch_size = batch_size_of(&inputs[0].1)?;
        let staged = self.stage_inputs(inputs, batch_size)?;

        if batch_size > self.capacity.capacity() {
            self.reshape(batch_size)?;
        }

        for (idx, values) in staged {
            let blob = self.blob_mut(idx)?;
            blob.data_mut()[..values.len()].copy_from_slice(&values);
        }

        let forward = self
            .net
            .forward()
            .map_err(|e| SessionError::fatal(format!("forward pass failed: {e}")));
        self.poison_on_fatal(forward)?;
        debug!(net = %self.net.name(), batch_size, "forward pass complete");

        let mut outputs = Vec::with_capacity(output_names.len());
        for name in output_names {
            let idx = self.bindings.output(name.as_str()).ok_or_else(|| {
                SessionError::invalid_argument(format!(
                    "specified network output '{name}' does not exist"
                ))
            })?;
            outputs.push(flat_output(name, self.blob(idx)?, batch_size)?);
        }
        Ok(outputs)
    }

    /// Checks every input and converts it to engine-native values without
    /// touching any buffer.
    fn stage_inputs(
        &self,
        inputs: &[(IOName, Tensor)],
        batch_size: usize,
    ) -> Result<Vec<(usize, Vec<f32>)>, SessionError> {
        let mut staged = Vec::with_capacity(inputs.len());
        for (name, tensor) in inputs {
            let idx = self.bindings.input(name.as_str()).ok_or_else(|| {
                SessionError::invalid_argument(format!(
                    "input tensor '{name}' does not exist in the network"
                ))
            })?;
            if tensor.shape().leading() != Some(batch_size) {
                return Err(SessionError::invalid_argument(format!(
                    "input tensor '{name}' has an incorrect batch size: \
                     expected {batch_size}, got {:?}",
                    tensor.shape().dims()
                )));
            }
            let values = tensor.to_f32_vec().map_err(|e| {
                SessionError::invalid_argument(format!("input tensor '{name}': {}", e.message()))
            })?;
            if tensor.shape().checked_numel() != Some(values.len()) {
                return Err(SessionError::invalid_argument(format!(
                    "input tensor '{name}' declares shape {:?} but holds {} values",
                    tensor.shape().dims(),
                    values.len()
                )));
            }
            let room = self
                .capacity
                .projected_count(self.blob(idx)?, batch_size)
                .ok_or_else(|| {
                    SessionError::invalid_argument(format!(
                        "input tensor '{name}' has a batch size of {batch_size}, \
                         too large for its buffer"
                    ))
                })?;
            if values.len() > room {
                return Err(SessionError::invalid_argument(format!(
                    "input tensor '{name}' holds {} values but its buffer fits {room}",
                    values.len()
                )));
            }
            staged.push((idx, values));
        }
        Ok(staged)
    }

    fn blob(&self, idx: usize) -> Result<&Blob, SessionError> {
        self.net
            .blob(idx)
            .ok_or_else(|| SessionError::fatal(format!("blob index {idx} is out of range")))
    }

    fn blob_mut(&mut self, idx: usize) -> Result<&mut Blob, SessionError> {
        self.net
            .blob_mut(idx)
            .ok_or_else(|| SessionError::fatal(format!("blob index {idx} is out of range")))
    }

    fn ensure_usable(&self) -> Result<(), SessionError> {
        match &self.poisoned {
            None => Ok(()),
            Some(cause) => Err(SessionError::fatal(format!(
                "session is unusable after an earlier failure: {}",
                cause.message()
            ))),
        }
    }

    fn poison_on_fatal<T>(&mut self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        if let Err(err @ SessionError::Fatal(_)) = &result {
            self.poisoned = Some(err.clone());
        }
        result
    }
}

impl ServingSession for BlobSession {
    fn spec(&self) -> &ModelSpec {
        BlobSession::spec(self)
    }

    fn run(
        &mut self,
        inputs: &[(IOName, Tensor)],
        output_names: &[IOName],
        target_names: &[IOName],
    ) -> Result<Vec<Tensor>, SessionError> {
        BlobSession::run(self, inputs, output_names, target_names)
    }

    fn reshape(&mut self, batch_size: usize) -> Result<(), SessionError> {
        BlobSession::reshape(self, batch_size)
    }
}

fn batch_size_of(first: &Tensor) -> Result<usize, SessionError> {
    let shape = first.shape();
    if shape.rank() < 2 {
        return Err(SessionError::invalid_argument(
            "could not determine the batch size; input must have at least 2 dimensions",
        ));
    }
    match shape.leading() {
        Some(batch) if batch >= 1 => Ok(batch),
        other => Err(SessionError::invalid_argument(format!(
            "invalid batch size of {}",
            other.unwrap_or(0)
        ))),
    }
}

fn flat_output(name: &IOName, blob: &Blob, batch_size: usize) -> Result<Tensor, SessionError> {
    let per_example = blob.per_example();
    let needed = batch_size.checked_mul(per_example).unwrap_or(usize::MAX);
    if needed > blob.count() {
        return Err(SessionError::invalid_argument(format!(
            "network output '{name}' with shape {:?} \
             cannot be read as ({batch_size}, {per_example})",
            blob.shape()
        )));
    }
    Ok(Tensor::from_f32(
        Shape::from_slice(&[batch_size, per_example]),
        &blob.data()[..needed],
    ))
}

fn build_spec(net: &Net, capacity: usize) -> ModelSpec {
    let describe = |indices: &[usize]| {
        indices
            .iter()
            .filter_map(|&idx| Some((net.blob_names().get(idx)?, net.blob(idx)?)))
            .map(|(name, blob)| TensorSpec {
                name: IOName(name.clone()),
                dtype: DType::F32,
                rank: blob.rank(),
                dims: blob
                    .shape()
                    .iter()
                    .map(|&d| if d == 0 { None } else { Some(d) })
                    .collect(),
            })
            .collect::<Vec<_>>()
    };

    ModelSpec {
        name: net.name().to_string(),
        inputs: describe(net.input_blob_indices()),
        outputs: describe(net.output_blob_indices()),
        capacity,
    }
}
