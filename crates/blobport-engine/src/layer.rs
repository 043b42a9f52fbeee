use crate::blob::Blob;
use crate::error::{EngineError, Result};
use crate::proto::{LayerKind, LayerParameter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    InnerProduct { num_output: usize, bias_term: bool },
    Relu,
    Sigmoid,
    TanH,
    Softmax,
    Flatten,
    GlobalAveragePool,
}

/// One computation step of a [`crate::Net`] together with its learnable parameters.
#[derive(Clone, Debug)]
pub struct Layer {
    name: String,
    kind: LayerKind,
    op: Op,
    params: Vec<Blob>,
}

impl Layer {
    pub(crate) fn from_param(param: &LayerParameter) -> Result<Self> {
        let invalid = |reason: &str| EngineError::InvalidLayer {
            layer: param.name.clone(),
            reason: reason.to_string(),
        };

        let kind = LayerKind::try_from(param.kind).map_err(|_| invalid("unknown layer kind"))?;
        let op = match kind {
            LayerKind::Unspecified => return Err(invalid("layer kind is unspecified")),
            LayerKind::InnerProduct => {
                let ip = param
                    .inner_product
                    .as_ref()
                    .ok_or_else(|| invalid("missing inner_product parameters"))?;
                if ip.num_output == 0 {
                    return Err(invalid("num_output must be positive"));
                }
                Op::InnerProduct {
                    num_output: ip.num_output as usize,
                    bias_term: ip.bias_term,
                }
            }
            LayerKind::Relu => Op::Relu,
            LayerKind::Sigmoid => Op::Sigmoid,
            LayerKind::TanH => Op::TanH,
            LayerKind::Softmax => Op::Softmax,
            LayerKind::Flatten => Op::Flatten,
            LayerKind::GlobalAveragePool => Op::GlobalAveragePool,
        };

        if param.bottoms.len() != 1 || param.tops.len() != 1 {
            return Err(invalid("expected exactly one bottom and one top"));
        }

        Ok(Self {
            name: param.name.clone(),
            kind,
            op,
            params: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn params(&self) -> &[Blob] {
        &self.params
    }

    pub(crate) fn params_mut(&mut self) -> &mut [Blob] {
        &mut self.params
    }

    pub fn supports_in_place(&self) -> bool {
        matches!(self.op, Op::Relu | Op::Sigmoid | Op::TanH | Op::Softmax)
    }

    /// Computes the top shape from the bottom shape, allocating parameters on first use.
    pub(crate) fn reshape(&mut self, bottom: &[usize]) -> Result<Vec<usize>> {
        match self.op {
            Op::InnerProduct {
                num_output,
                bias_term,
            } => {
                if bottom.len() < 2 {
                    return Err(self.invalid("inner product input needs at least 2 dimensions"));
                }
                let k: usize = bottom[1..].iter().product();
                let weight_shape = [num_output, k];
                match self.params.first() {
                    None => {
                        self.params.push(Blob::new(&weight_shape));
                        if bias_term {
                            self.params.push(Blob::new(&[num_output]));
                        }
                    }
                    Some(weights) if weights.shape() != weight_shape => {
                        return Err(EngineError::ShapeMismatch {
                            what: format!("input features of layer '{}'", self.name),
                            expected: weights.shape().to_vec(),
                            actual: weight_shape.to_vec(),
                        });
                    }
                    Some(_) => {}
                }
                Ok(vec![bottom[0], num_output])
            }
            Op::Relu | Op::Sigmoid | Op::TanH | Op::Softmax => Ok(bottom.to_vec()),
            Op::Flatten => {
                if bottom.is_empty() {
                    return Err(self.invalid("cannot flatten a scalar"));
                }
                Ok(vec![bottom[0], bottom[1..].iter().product()])
            }
            Op::GlobalAveragePool => {
                if bottom.len() < 3 {
                    return Err(self.invalid("pooling input needs at least 3 dimensions"));
                }
                let mut top = vec![bottom[0], bottom[1]];
                top.resize(bottom.len(), 1);
                Ok(top)
            }
        }
    }

    pub(crate) fn forward(&self, bottom: &Blob, top: &mut Blob) -> Result<()> {
        let x = bottom.data();
        match self.op {
            Op::InnerProduct {
                num_output,
                bias_term,
            } => {
                let n = bottom.shape()[0];
                let k = bottom.per_example();
                let w = self.params[0].data();
                let y = top.data_mut();
                for row in 0..n {
                    let xr = &x[row * k..(row + 1) * k];
                    for o in 0..num_output {
                        let wr = &w[o * k..(o + 1) * k];
                        let mut acc: f32 = xr.iter().zip(wr).map(|(a, b)| a * b).sum();
                        if bias_term {
                            acc += self.params[1].data()[o];
                        }
                        y[row * num_output + o] = acc;
                    }
                }
            }
            Op::Relu => map_into(x, top.data_mut(), |v| v.max(0.0)),
            Op::Sigmoid => map_into(x, top.data_mut(), |v| 1.0 / (1.0 + (-v).exp())),
            Op::TanH => map_into(x, top.data_mut(), f32::tanh),
            Op::Flatten => top.data_mut().copy_from_slice(x),
            Op::Softmax => {
                let shape = bottom.shape();
                let outer = shape.first().copied().unwrap_or(1);
                let channels = shape.get(1).copied().unwrap_or(1);
                let inner: usize = shape.iter().skip(2).product();
                let y = top.data_mut();
                for o in 0..outer {
                    for i in 0..inner {
                        let at = |c: usize| (o * channels + c) * inner + i;
                        let max = (0..channels)
                            .map(|c| x[at(c)])
                            .fold(f32::NEG_INFINITY, f32::max);
                        let mut sum = 0.0;
                        for c in 0..channels {
                            let e = (x[at(c)] - max).exp();
                            y[at(c)] = e;
                            sum += e;
                        }
                        for c in 0..channels {
                            y[at(c)] /= sum;
                        }
                    }
                }
            }
            Op::GlobalAveragePool => {
                let shape = bottom.shape();
                let planes = shape[0] * shape[1];
                let area: usize = shape[2..].iter().product();
                let y = top.data_mut();
                for p in 0..planes {
                    let plane = &x[p * area..(p + 1) * area];
                    y[p] = if area == 0 {
                        0.0
                    } else {
                        plane.iter().sum::<f32>() / area as f32
                    };
                }
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> EngineError {
        EngineError::InvalidLayer {
            layer: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

fn map_into(x: &[f32], y: &mut [f32], f: impl Fn(f32) -> f32) {
    for (dst, &src) in y.iter_mut().zip(x) {
        *dst = f(src);
    }
}
