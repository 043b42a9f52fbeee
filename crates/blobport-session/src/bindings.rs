use std::collections::BTreeMap;

use blobport_core::SessionError;
use blobport_engine::Net;

/// Caller-visible names mapped to blob indices in the net, fixed at construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingTable {
    inputs: BTreeMap<String, usize>,
    outputs: BTreeMap<String, usize>,
}

impl BindingTable {
    pub fn new(
        blob_names: &[String],
        input_indices: &[usize],
        output_indices: &[usize],
    ) -> Result<Self, SessionError> {
        Ok(Self {
            inputs: build("input", blob_names, input_indices)?,
            outputs: build("output", blob_names, output_indices)?,
        })
    }

    pub fn from_net(net: &Net) -> Result<Self, SessionError> {
        Self::new(
            net.blob_names(),
            net.input_blob_indices(),
            net.output_blob_indices(),
        )
    }

    pub fn input(&self, name: &str) -> Option<usize> {
        self.inputs.get(name).copied()
    }

    pub fn output(&self, name: &str) -> Option<usize> {
        self.outputs.get(name).copied()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&str, usize)> {
        self.inputs.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, usize)> {
        self.outputs.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

fn build(
    role: &str,
    blob_names: &[String],
    indices: &[usize],
) -> Result<BTreeMap<String, usize>, SessionError> {
    let mut map = BTreeMap::new();
    for &idx in indices {
        let name = blob_names.get(idx).ok_or_else(|| {
            SessionError::fatal(format!(
                "{role} blob index {idx} is out of range for {} blobs",
                blob_names.len()
            ))
        })?;
        if map.insert(name.clone(), idx).is_some() {
            return Err(SessionError::fatal(format!(
                "{role} blob '{name}' is declared more than once"
            )));
        }
    }
    Ok(map)
}
