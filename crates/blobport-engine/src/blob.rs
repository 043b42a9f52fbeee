/// A named region of `f32` storage inside a [`crate::Net`].
///
/// A dimension of 0 marks an unallocated or dynamic axis.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Blob {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Blob {
    pub fn new(shape: &[usize]) -> Self {
        let mut blob = Self::default();
        blob.reshape(shape);
        blob
    }

    /// Builds a blob from declared dims; non-positive dims become 0.
    pub fn from_declared(dims: &[i64]) -> Self {
        let shape: Vec<usize> = dims
            .iter()
            .map(|&d| usize::try_from(d).unwrap_or(0))
            .collect();
        Self::new(&shape)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Elements per entry along the leading axis.
    pub fn per_example(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// Resizes storage in place. Existing values are kept up to the new length.
    pub fn reshape(&mut self, shape: &[usize]) {
        self.shape = shape.to_vec();
        let count = self.count();
        self.data.resize(count, 0.0);
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}
