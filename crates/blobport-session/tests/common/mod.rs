#![allow(dead_code)]

use blobport_core::{IOName, Shape, Tensor};
use blobport_engine::{BlobProto, LayerKind, LayerParameter, NetParameter};

/// (1, 3, 224, 224) image -> global pooling -> 1000-way classifier.
pub fn classifier() -> NetParameter {
    NetParameter::new("classifier")
        .with_input("data", &[1, 3, 224, 224])
        .with_layer(LayerParameter::new(
            "pool",
            LayerKind::GlobalAveragePool,
            &["data"],
            &["pooled"],
        ))
        .with_layer(LayerParameter::inner_product("fc", "pooled", "logits", 1000))
        .with_layer(LayerParameter::new("prob", LayerKind::Softmax, &["logits"], &["prob"]))
}

/// Two features in, two scores out: `score = x @ [[1, 0], [0, 2]]^T + [0, 1]`.
pub fn linear() -> NetParameter {
    NetParameter::new("linear")
        .with_input("x", &[1, 2])
        .with_layer(LayerParameter::inner_product("fc", "x", "score", 2))
}

pub fn linear_weights() -> NetParameter {
    NetParameter::new("linear").with_layer(
        LayerParameter::inner_product("fc", "x", "score", 2).with_blobs(vec![
            BlobProto::new(&[2, 2], vec![1.0, 0.0, 0.0, 2.0]),
            BlobProto::new(&[2], vec![0.0, 1.0]),
        ]),
    )
}

/// Two batched inputs, each passed through its own activation.
pub fn two_inputs() -> NetParameter {
    NetParameter::new("pair")
        .with_input("a", &[4, 2])
        .with_input("b", &[4, 3])
        .with_layer(LayerParameter::new("act_a", LayerKind::Relu, &["a"], &["out_a"]))
        .with_layer(LayerParameter::new("act_b", LayerKind::Sigmoid, &["b"], &["out_b"]))
}

pub fn tensor(shape: &[usize], values: &[f32]) -> Tensor {
    Tensor::from_f32(Shape::from_slice(shape), values)
}

pub fn ramp(shape: &[usize]) -> Tensor {
    let numel: usize = shape.iter().product();
    let values: Vec<f32> = (0..numel).map(|i| i as f32).collect();
    tensor(shape, &values)
}

pub fn names(n: &[&str]) -> Vec<IOName> {
    n.iter().map(|s| IOName::from(*s)).collect()
}
