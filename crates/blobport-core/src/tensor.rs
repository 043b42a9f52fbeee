use bytes::Bytes;
use smallvec::SmallVec;

use crate::SessionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda { device_id: u32 },
}

impl Device {
    pub fn is_accelerated(&self) -> bool {
        matches!(self, Device::Cuda { .. })
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
            Device::Cuda { device_id } => write!(f, "GPU:{device_id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    F32,
    F16,
    I64,
    I32,
    U8,
}

impl DType {
    pub fn byte_size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::I64 => 8,
            DType::I32 => 4,
            DType::U8 => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    pub fn rank(&self) -> usize {
        self.0.len()
    }
    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>().max(1)
    }
    /// Exact element count, or `None` when it does not fit in `usize`.
    pub fn checked_numel(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }
    pub fn dims(&self) -> &[usize] {
        &self.0
    }
    /// Leading (batch) dimension, if the shape has one.
    pub fn leading(&self) -> Option<usize> {
        self.0.first().copied()
    }
    /// Elements in one row along the leading dimension.
    pub fn per_row(&self) -> usize {
        self.0.iter().skip(1).product::<usize>().max(1)
    }
}

#[derive(Clone, Debug)]
pub struct TensorDesc {
    pub dtype: DType,
    pub shape: Shape,
    pub device: Device,
}

/// A dense, row-major host tensor.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub desc: TensorDesc,
    pub data: Bytes,
}

impl Tensor {
    pub fn from_cpu_bytes(dtype: DType, shape: Shape, bytes: Bytes) -> Self {
        Self {
            desc: TensorDesc {
                dtype,
                shape,
                device: Device::Cpu,
            },
            data: bytes,
        }
    }

    pub fn from_f32(shape: Shape, values: &[f32]) -> Self {
        let bytes = Bytes::copy_from_slice(bytemuck::cast_slice(values));
        Self::from_cpu_bytes(DType::F32, shape, bytes)
    }

    pub fn shape(&self) -> &Shape {
        &self.desc.shape
    }

    pub fn dtype(&self) -> DType {
        self.desc.dtype
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Number of elements actually held, derived from the byte length.
    pub fn len(&self) -> usize {
        self.data.len() / self.desc.dtype.byte_size()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_f32_vec(&self) -> Result<Vec<f32>, SessionError> {
        if self.desc.dtype != DType::F32 {
            return Err(SessionError::invalid_argument(format!(
                "expected an f32 tensor, got {:?}",
                self.desc.dtype
            )));
        }
        if !self.data.len().is_multiple_of(4) {
            return Err(SessionError::invalid_argument(
                "f32 tensor has invalid byte length",
            ));
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}
