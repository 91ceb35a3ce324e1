//! Backend-independent parameter state.
//!
//! Checkpointing and cross-backend weight transfer move parameters through
//! plain `f32` buffers keyed by dotted parameter paths, so a state captured
//! on an autodiff backend can be restored on the inner backend and vice
//! versa.

use std::collections::BTreeMap;

use burn::prelude::*;

use crate::error::{Result, TempdistError};

/// Named parameter tensors in a stable (sorted) order.
pub type StateDict = BTreeMap<String, RawTensor>;

/// A tensor detached from any backend: shape plus row-major `f32` values.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
    /// Dimension sizes, outermost first.
    pub shape: Vec<usize>,
    /// Row-major element values.
    pub values: Vec<f32>,
}

impl RawTensor {
    /// Capture a tensor's shape and values.
    pub fn from_tensor<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> Self {
        Self {
            shape: tensor.dims().to_vec(),
            values: tensor.clone().to_data().to_vec().unwrap(),
        }
    }

    /// Rebuild a tensor on the given device.
    ///
    /// Fails with [`TempdistError::ShapeMismatch`] when the stored rank does
    /// not match `D`.
    pub fn to_tensor<B: Backend, const D: usize>(&self, device: &B::Device) -> Result<Tensor<B, D>> {
        if self.shape.len() != D {
            return Err(TempdistError::ShapeMismatch {
                expected: vec![D],
                got: self.shape.clone(),
            });
        }
        let data = TensorData::new(self.values.clone(), self.shape.clone());
        Ok(Tensor::from_data(data, device))
    }

    /// Total number of elements.
    pub fn num_elements(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_raw_tensor_round_trip() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]),
            &device,
        );

        let raw = RawTensor::from_tensor(&tensor);
        assert_eq!(raw.shape, vec![2, 3]);
        assert_eq!(raw.num_elements(), 6);

        let rebuilt: Tensor<TestBackend, 2> = raw.to_tensor(&device).unwrap();
        let values: Vec<f32> = rebuilt.to_data().to_vec().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_rank_mismatch_rejected() {
        let raw = RawTensor {
            shape: vec![2, 3],
            values: vec![0.0; 6],
        };
        let device = Default::default();
        let result: Result<Tensor<TestBackend, 3>> = raw.to_tensor(&device);
        assert!(matches!(result, Err(TempdistError::ShapeMismatch { .. })));
    }
}
