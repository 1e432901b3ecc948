//! Running observation normalization.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Weight kept by the running statistics on every update.
pub const DECAY: f32 = 0.99;
/// Added to the std before dividing.
pub const EPSILON: f32 = 1e-8;

/// Exponential-moving-average mean/std tracker.
///
/// Starts as a standard normal (mean 0, std 1). There is no warm-up: the
/// statistics are used from the very first step, however stale they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningNormalizer {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl RunningNormalizer {
    pub fn new(dim: usize) -> Self {
        Self {
            mean: vec![0.0; dim],
            std: vec![1.0; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    pub fn std(&self) -> &[f32] {
        &self.std
    }

    fn check_dim(&self, actual: usize) -> Result<()> {
        if actual != self.dim() {
            return Err(Error::ShapeMismatch {
                what: "observation",
                expected: self.dim(),
                actual,
            });
        }
        Ok(())
    }

    /// Blend the per-feature statistics of `batch` into the running ones.
    ///
    /// A single row has no spread, so it only moves the mean.
    pub fn update(&mut self, batch: &[Vec<f32>]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        for row in batch {
            self.check_dim(row.len())?;
        }

        let n = batch.len() as f32;
        let batch_mean: Vec<f32> = (0..self.dim())
            .map(|j| batch.iter().map(|row| row[j]).sum::<f32>() / n)
            .collect();

        for (mean, bm) in self.mean.iter_mut().zip(&batch_mean) {
            *mean = DECAY * *mean + (1.0 - DECAY) * bm;
        }

        if batch.len() > 1 {
            for (j, std) in self.std.iter_mut().enumerate() {
                let var = batch
                    .iter()
                    .map(|row| (row[j] - batch_mean[j]).powi(2))
                    .sum::<f32>()
                    / n;
                *std = DECAY * *std + (1.0 - DECAY) * var.sqrt();
            }
        }
        Ok(())
    }

    pub fn normalize(&self, x: &[f32]) -> Result<Vec<f32>> {
        self.check_dim(x.len())?;
        Ok(x.iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(v, (m, s))| (v - m) / (s + EPSILON))
            .collect())
    }

    pub fn normalize_batch(&self, batch: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        batch.iter().map(|row| self.normalize(row)).collect()
    }

    /// Normalize a `[batch_size, dim]` tensor on its own device.
    pub fn normalize_tensor<B: Backend>(&self, x: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let [batch_size, dim] = x.dims();
        self.check_dim(dim)?;

        let device = x.device();
        let mean = Tensor::<B, 1>::from_floats(self.mean.as_slice(), &device)
            .reshape([1, dim])
            .expand([batch_size, dim]);
        let std = Tensor::<B, 1>::from_floats(self.std.as_slice(), &device)
            .reshape([1, dim])
            .expand([batch_size, dim]);

        Ok((x - mean) / std.add_scalar(EPSILON))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_as_standard_normal() {
        let norm = RunningNormalizer::new(3);
        assert_eq!(norm.mean(), &[0.0, 0.0, 0.0]);
        assert_eq!(norm.std(), &[1.0, 1.0, 1.0]);
        let out = norm.normalize(&[1.0, -2.0, 0.5]).unwrap();
        assert_eq!(out.len(), 3);
        assert!((out[1] + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_preserves_shape() {
        let norm = RunningNormalizer::new(4);
        let batch = vec![vec![1.0; 4]; 5];
        let out = norm.normalize_batch(&batch).unwrap();
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|row| row.len() == 4));
    }

    #[test]
    fn test_tensor_and_row_normalization_agree() {
        use burn::backend::NdArray;

        let mut norm = RunningNormalizer::new(3);
        norm.update(&[vec![1.0, 2.0, 3.0], vec![3.0, 0.0, -1.0]]).unwrap();
        let rows = vec![vec![0.5, 1.5, 2.5], vec![-1.0, 4.0, 0.0]];

        let device = Default::default();
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let x = Tensor::<NdArray<f32>, 1>::from_floats(flat.as_slice(), &device).reshape([2, 3]);
        let out = norm.normalize_tensor(x).unwrap();
        assert_eq!(out.dims(), [2, 3]);

        let expected: Vec<f32> = norm.normalize_batch(&rows).unwrap().concat();
        let got = out.into_data().to_vec::<f32>().unwrap();
        for (g, e) in got.iter().zip(&expected) {
            assert!((g - e).abs() < 1e-5);
        }
    }

    #[test]
    fn test_ema_convergence_law() {
        // Per feature: batch mean (3, 10), population std (2, 1)
        let batch = vec![vec![1.0, 11.0], vec![5.0, 9.0]];
        let (m, s) = ([3.0f32, 10.0], [2.0f32, 1.0]);
        let mut norm = RunningNormalizer::new(2);

        for k in 1..=200 {
            norm.update(&batch).unwrap();
            let ratio = DECAY.powi(k);
            for j in 0..2 {
                // Distance to the batch statistics shrinks by 0.99 per update
                let expected_mean = m[j] + (0.0 - m[j]) * ratio;
                let expected_std = s[j] + (1.0 - s[j]) * ratio;
                assert!((norm.mean()[j] - expected_mean).abs() < 1e-3 * m[j].abs().max(1.0));
                assert!((norm.std()[j] - expected_std).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_single_row_only_moves_mean() {
        let mut norm = RunningNormalizer::new(2);
        norm.update(&[vec![10.0, -10.0]]).unwrap();
        assert!((norm.mean()[0] - 0.1).abs() < 1e-6);
        assert!((norm.mean()[1] + 0.1).abs() < 1e-6);
        assert_eq!(norm.std(), &[1.0, 1.0]);
    }

    #[test]
    fn test_zero_std_does_not_divide_by_zero() {
        let mut norm = RunningNormalizer::new(1);
        norm.std = vec![0.0];
        let out = norm.normalize(&[0.0]).unwrap();
        assert!(out[0].is_finite());
    }

    #[test]
    fn test_wrong_dimension_is_rejected() {
        let mut norm = RunningNormalizer::new(3);
        assert!(matches!(
            norm.normalize(&[1.0]),
            Err(Error::ShapeMismatch { expected: 3, actual: 1, .. })
        ));
        assert!(norm.update(&[vec![1.0, 2.0]]).is_err());
    }
}
