//! Native serialized form of net topologies and trained parameters.
//!
//! Topology and weights share the same `NetParameter` message: a topology
//! carries `inputs` and layers without `blobs`, a weights file carries layers
//! (matched by name) with their `blobs`.

use std::path::Path;

use prost::Message;

use crate::error::{EngineError, Result};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlobShape {
    #[prost(int64, repeated, tag = "1")]
    pub dim: Vec<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlobProto {
    #[prost(message, optional, tag = "1")]
    pub shape: Option<BlobShape>,
    #[prost(float, repeated, tag = "2")]
    pub data: Vec<f32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InputParameter {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub shape: Option<BlobShape>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InnerProductParameter {
    #[prost(uint32, tag = "1")]
    pub num_output: u32,
    #[prost(bool, tag = "2")]
    pub bias_term: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum LayerKind {
    Unspecified = 0,
    InnerProduct = 1,
    Relu = 2,
    Sigmoid = 3,
    TanH = 4,
    Softmax = 5,
    Flatten = 6,
    GlobalAveragePool = 7,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LayerParameter {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(enumeration = "LayerKind", tag = "2")]
    pub kind: i32,
    #[prost(string, repeated, tag = "3")]
    pub bottoms: Vec<String>,
    #[prost(string, repeated, tag = "4")]
    pub tops: Vec<String>,
    #[prost(message, repeated, tag = "5")]
    pub blobs: Vec<BlobProto>,
    #[prost(message, optional, tag = "6")]
    pub inner_product: Option<InnerProductParameter>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NetParameter {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub inputs: Vec<InputParameter>,
    #[prost(message, repeated, tag = "3")]
    pub layers: Vec<LayerParameter>,
}

impl BlobShape {
    pub fn new(dims: &[i64]) -> Self {
        Self { dim: dims.to_vec() }
    }
}

impl BlobProto {
    pub fn new(dims: &[i64], data: Vec<f32>) -> Self {
        Self {
            shape: Some(BlobShape::new(dims)),
            data,
        }
    }
}

impl LayerParameter {
    pub fn new(name: &str, kind: LayerKind, bottoms: &[&str], tops: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: kind as i32,
            bottoms: bottoms.iter().map(|s| s.to_string()).collect(),
            tops: tops.iter().map(|s| s.to_string()).collect(),
            blobs: Vec::new(),
            inner_product: None,
        }
    }

    pub fn inner_product(name: &str, bottom: &str, top: &str, num_output: u32) -> Self {
        let mut layer = Self::new(name, LayerKind::InnerProduct, &[bottom], &[top]);
        layer.inner_product = Some(InnerProductParameter {
            num_output,
            bias_term: true,
        });
        layer
    }

    pub fn with_blobs(mut self, blobs: Vec<BlobProto>) -> Self {
        self.blobs = blobs;
        self
    }
}

impl NetParameter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, name: &str, dims: &[i64]) -> Self {
        self.inputs.push(InputParameter {
            name: name.to_string(),
            shape: Some(BlobShape::new(dims)),
        });
        self
    }

    pub fn with_layer(mut self, layer: LayerParameter) -> Self {
        self.layers.push(layer);
        self
    }
}

pub fn read_net_from_binary_file(path: impl AsRef<Path>) -> Result<NetParameter> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(NetParameter::decode(bytes.as_slice())?)
}

pub fn write_net_to_binary_file(net: &NetParameter, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, net.encode_to_vec()).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })
}
