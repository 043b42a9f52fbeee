use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::blob::Blob;
use crate::error::{EngineError, Result};
use crate::layer::Layer;
use crate::proto::NetParameter;

/// Outcome of copying trained parameters into a net.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: Vec<String>,
    /// Layers present in the source but not in the net.
    pub skipped: Vec<String>,
}

/// A fixed-topology network: an ordered list of named blobs and the layers wiring them.
pub struct Net {
    name: String,
    blobs: Vec<Blob>,
    blob_names: Vec<String>,
    input_blob_indices: Vec<usize>,
    output_blob_indices: Vec<usize>,
    layers: Vec<Layer>,
    bottom_ids: Vec<usize>,
    top_ids: Vec<usize>,
}

impl Net {
    pub fn new(param: &NetParameter) -> Result<Self> {
        let mut blobs = Vec::new();
        let mut blob_names: Vec<String> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut input_blob_indices = Vec::with_capacity(param.inputs.len());
        // Blobs produced and not yet consumed, in production order.
        let mut available: Vec<usize> = Vec::new();

        for input in &param.inputs {
            if by_name.contains_key(&input.name) {
                return Err(EngineError::DuplicateBlob(input.name.clone()));
            }
            let dims = input.shape.as_ref().map(|s| s.dim.as_slice()).unwrap_or(&[]);
            let idx = blobs.len();
            blobs.push(Blob::from_declared(dims));
            blob_names.push(input.name.clone());
            by_name.insert(input.name.clone(), idx);
            input_blob_indices.push(idx);
            available.push(idx);
        }

        let mut layers = Vec::with_capacity(param.layers.len());
        let mut bottom_ids = Vec::with_capacity(param.layers.len());
        let mut top_ids = Vec::with_capacity(param.layers.len());
        for lp in &param.layers {
            let layer = Layer::from_param(lp)?;
            let bottom_name = &lp.bottoms[0];
            let top_name = &lp.tops[0];

            let bottom = *by_name
                .get(bottom_name)
                .ok_or_else(|| EngineError::UnknownBlob {
                    layer: lp.name.clone(),
                    blob: bottom_name.clone(),
                })?;
            available.retain(|&i| i != bottom);

            let top = if top_name == bottom_name {
                if !layer.supports_in_place() {
                    return Err(EngineError::InvalidLayer {
                        layer: lp.name.clone(),
                        reason: "layer cannot run in place".to_string(),
                    });
                }
                bottom
            } else {
                if by_name.contains_key(top_name) {
                    return Err(EngineError::DuplicateBlob(top_name.clone()));
                }
                let idx = blobs.len();
                blobs.push(Blob::default());
                blob_names.push(top_name.clone());
                by_name.insert(top_name.clone(), idx);
                idx
            };
            available.push(top);

            layers.push(layer);
            bottom_ids.push(bottom);
            top_ids.push(top);
        }

        let mut net = Self {
            name: param.name.clone(),
            blobs,
            blob_names,
            input_blob_indices,
            output_blob_indices: available,
            layers,
            bottom_ids,
            top_ids,
        };
        net.reshape()?;
        debug!(
            net = %net.name,
            blobs = net.blobs.len(),
            layers = net.layers.len(),
            "net constructed"
        );
        Ok(net)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn blob_names(&self) -> &[String] {
        &self.blob_names
    }

    pub fn input_blob_indices(&self) -> &[usize] {
        &self.input_blob_indices
    }

    pub fn output_blob_indices(&self) -> &[usize] {
        &self.output_blob_indices
    }

    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    pub fn blob(&self, idx: usize) -> Option<&Blob> {
        self.blobs.get(idx)
    }

    pub fn blob_mut(&mut self, idx: usize) -> Option<&mut Blob> {
        self.blobs.get_mut(idx)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Looks up a layer by its declared name.
    pub fn layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name() == name)
    }

    /// Propagates blob shapes from the inputs through every layer.
    pub fn reshape(&mut self) -> Result<()> {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            let bottom_shape = self.blobs[self.bottom_ids[i]].shape().to_vec();
            let top_shape = layer.reshape(&bottom_shape)?;
            self.blobs[self.top_ids[i]].reshape(&top_shape);
        }
        Ok(())
    }

    /// Runs every layer once, in declaration order.
    pub fn forward(&mut self) -> Result<()> {
        for (i, layer) in self.layers.iter().enumerate() {
            let bottom = self.blobs[self.bottom_ids[i]].clone();
            let top = &mut self.blobs[self.top_ids[i]];
            layer.forward(&bottom, top)?;
        }
        Ok(())
    }

    /// Copies parameters from `param` into layers with matching names.
    ///
    /// Every matching layer is validated before any value is written, so a
    /// mismatch leaves the net untouched.
    pub fn copy_trained_layers_from(&mut self, param: &NetParameter) -> Result<CopyReport> {
        let mut report = CopyReport::default();
        let mut plan = Vec::new();

        for source in &param.layers {
            let Some(target) = self.layers.iter().position(|l| l.name() == source.name) else {
                warn!(layer = %source.name, "ignoring source layer with no counterpart");
                report.skipped.push(source.name.clone());
                continue;
            };

            let params = self.layers[target].params();
            if params.len() != source.blobs.len() {
                return Err(EngineError::ParamCountMismatch {
                    layer: source.name.clone(),
                    expected: params.len(),
                    actual: source.blobs.len(),
                });
            }
            for (i, (dst, src)) in params.iter().zip(&source.blobs).enumerate() {
                let src_shape: Vec<usize> = src
                    .shape
                    .as_ref()
                    .map(|s| s.dim.iter().map(|&d| usize::try_from(d).unwrap_or(0)).collect())
                    .unwrap_or_default();
                if src_shape != dst.shape() || src.data.len() != dst.count() {
                    return Err(EngineError::ShapeMismatch {
                        what: format!("parameter {i} of layer '{}'", source.name),
                        expected: dst.shape().to_vec(),
                        actual: src_shape,
                    });
                }
            }
            plan.push((target, source));
        }

        for (target, source) in plan {
            let layer = &mut self.layers[target];
            for (dst, src) in layer.params_mut().iter_mut().zip(&source.blobs) {
                dst.data_mut().copy_from_slice(&src.data);
            }
            report.copied.push(source.name.clone());
        }

        info!(
            net = %self.name,
            copied = report.copied.len(),
            skipped = report.skipped.len(),
            "copied trained layers"
        );
        Ok(report)
    }
}
