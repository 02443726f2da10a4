//! Value types shared by the featurizer contract (§4.8) and the ring buffer
//! (§4.9): the three supported scalar types and arbitrary-rank shapes.

use serde::{Deserialize, Serialize};

/// One of the three scalar element types a [`crate::buffer::DataBuffer`]
/// column may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dtype {
    F32,
    I64,
    Bool,
}

impl Dtype {
    /// Size in bytes of one element of this dtype.
    pub fn size_of(self) -> usize {
        match self {
            Dtype::F32 => 4,
            Dtype::I64 => 8,
            Dtype::Bool => 1,
        }
    }
}

/// An arbitrary-rank, non-negative-integer shape, e.g. `[]` for a scalar,
/// `[n]` for a vector, `[rows, cols]` for a matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    pub fn vector(len: usize) -> Self {
        Shape(vec![len])
    }

    pub fn matrix(rows: usize, cols: usize) -> Self {
        Shape(vec![rows, cols])
    }

    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Total number of scalar elements this shape describes.
    ///
    /// A zero-rank shape (a scalar) has exactly one element.
    pub fn numel(&self) -> usize {
        if self.0.is_empty() {
            1
        } else {
            self.0.iter().product()
        }
    }
}
