//! Gaussian actor-critic network using Burn framework

use std::f32::consts::PI;

use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::tanh;
use burn::tensor::{Distribution, TensorData};

/// Configuration for the actor-critic network
#[derive(Debug, Config)]
pub struct ActorCriticConfig {
    /// Observation dimensionality
    pub obs_dim: usize,
    /// Number of actuators
    pub action_dim: usize,
    /// Width of the shared feature extractor
    #[config(default = 256)]
    pub hidden_size: usize,
    /// Orthogonal gain of the actor mean head; small so the policy starts
    /// close to the zero action
    #[config(default = 0.01)]
    pub actor_gain: f64,
    /// Orthogonal gain of the critic head
    #[config(default = 1.0)]
    pub critic_gain: f64,
}

impl ActorCriticConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ActorCritic<B> {
        let hidden_gain = std::f64::consts::SQRT_2;

        ActorCritic {
            input: orthogonal_linear(self.obs_dim, self.hidden_size, hidden_gain, device),
            hidden: orthogonal_linear(self.hidden_size, self.hidden_size, hidden_gain, device),
            actor_mean: orthogonal_linear(self.hidden_size, self.action_dim, self.actor_gain, device),
            critic: orthogonal_linear(self.hidden_size, 1, self.critic_gain, device),
            log_std: Param::from_tensor(Tensor::zeros([self.action_dim], device)),
        }
    }
}

/// Shared-trunk actor-critic.
///
/// The actor outputs the mean of a diagonal Gaussian; its spread comes from a
/// learned, state-independent log-std vector. The critic outputs a scalar
/// value estimate.
#[derive(Module, Debug)]
pub struct ActorCritic<B: Backend> {
    /// Shared input layer
    input: Linear<B>,
    /// Shared hidden layer
    hidden: Linear<B>,
    /// Action mean head
    actor_mean: Linear<B>,
    /// Value head
    critic: Linear<B>,
    /// Per-dimension log standard deviation
    log_std: Param<Tensor<B, 1>>,
}

impl<B: Backend> ActorCritic<B> {
    /// Forward pass.
    ///
    /// obs: [batch_size, obs_dim]
    /// Returns: mean [batch_size, action_dim], std [batch_size, action_dim],
    /// value [batch_size, 1]
    pub fn forward(&self, obs: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>) {
        let x = tanh(self.input.forward(obs));
        let x = tanh(self.hidden.forward(x));

        let mean = self.actor_mean.forward(x.clone());
        let value = self.critic.forward(x);

        let [batch_size, action_dim] = mean.dims();
        let std = self
            .log_std
            .val()
            .exp()
            .reshape([1, action_dim])
            .expand([batch_size, action_dim]);

        (mean, std, value)
    }

    pub fn action_dim(&self) -> usize {
        self.log_std.val().dims()[0]
    }
}

/// Log density of `action` under a diagonal Gaussian, summed over action
/// dimensions. Returns [batch_size, 1].
pub fn gaussian_log_prob<B: Backend>(
    action: Tensor<B, 2>,
    mean: Tensor<B, 2>,
    std: Tensor<B, 2>,
) -> Tensor<B, 2> {
    let half_log_2pi = 0.5 * (2.0 * PI).ln();
    let z = (action - mean) / std.clone();

    (z.powf_scalar(2.0).mul_scalar(-0.5) - std.log())
        .sub_scalar(half_log_2pi)
        .sum_dim(1)
}

/// Differential entropy of a diagonal Gaussian, summed over action
/// dimensions. Returns [batch_size, 1].
pub fn gaussian_entropy<B: Backend>(std: Tensor<B, 2>) -> Tensor<B, 2> {
    let per_dim = 0.5 + 0.5 * (2.0 * PI).ln();
    std.log().add_scalar(per_dim).sum_dim(1)
}

/// Linear layer with orthogonal weights and zero bias.
fn orthogonal_linear<B: Backend>(
    d_input: usize,
    d_output: usize,
    gain: f64,
    device: &B::Device,
) -> Linear<B> {
    let mut linear = LinearConfig::new(d_input, d_output).init(device);

    let samples: Vec<f32> = Tensor::<B, 2>::random(
        [d_input, d_output],
        Distribution::Normal(0.0, 1.0),
        device,
    )
    .into_data()
    .iter::<f32>()
    .collect();
    let weights = orthogonal_weights(d_input, d_output, gain, samples);

    // Burn stores linear weights as [d_input, d_output]
    linear.weight = Param::from_tensor(Tensor::from_data(
        TensorData::new(weights, [d_input, d_output]),
        device,
    ));
    linear.bias = Some(Param::from_tensor(Tensor::zeros([d_output], device)));
    linear
}

/// Turn a row-major `[rows, cols]` matrix of Gaussian samples into a
/// (semi-)orthogonal one scaled by `gain`.
///
/// The shorter side is orthonormalized with modified Gram-Schmidt: columns
/// for tall or square matrices, rows for wide ones.
pub fn orthogonal_weights(rows: usize, cols: usize, gain: f64, samples: Vec<f32>) -> Vec<f32> {
    assert_eq!(samples.len(), rows * cols, "sample count must match the shape");

    let by_columns = rows >= cols;
    let (count, len) = if by_columns { (cols, rows) } else { (rows, cols) };
    let at = |v: usize, i: usize| if by_columns { i * cols + v } else { v * cols + i };

    let mut vectors: Vec<Vec<f64>> = (0..count)
        .map(|v| (0..len).map(|i| samples[at(v, i)] as f64).collect())
        .collect();

    for v in 0..count {
        let (done, rest) = vectors.split_at_mut(v);
        let current = &mut rest[0];
        for prev in done.iter() {
            let dot: f64 = current.iter().zip(prev).map(|(a, b)| a * b).sum();
            current.iter_mut().zip(prev).for_each(|(a, b)| *a -= dot * b);
        }
        let norm = current.iter().map(|a| a * a).sum::<f64>().sqrt();
        if norm > 1e-10 {
            current.iter_mut().for_each(|a| *a /= norm);
        } else {
            // Linearly dependent draw
            current.iter_mut().for_each(|a| *a = 0.0);
        }
    }

    let mut out = vec![0.0f32; rows * cols];
    for (v, vector) in vectors.iter().enumerate() {
        for (i, value) in vector.iter().enumerate() {
            out[at(v, i)] = (value * gain) as f32;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::ElementConversion;

    type TestBackend = NdArray<f32>;

    fn gram(rows: usize, cols: usize, w: &[f32], by_columns: bool) -> Vec<f32> {
        let k = if by_columns { cols } else { rows };
        let len = if by_columns { rows } else { cols };
        let at = |v: usize, i: usize| if by_columns { w[i * cols + v] } else { w[v * cols + i] };
        let mut g = vec![0.0; k * k];
        for a in 0..k {
            for b in 0..k {
                g[a * k + b] = (0..len).map(|i| at(a, i) * at(b, i)).sum();
            }
        }
        g
    }

    fn pseudo_normal(n: usize) -> Vec<f32> {
        // Deterministic, well-conditioned samples
        (0..n).map(|i| ((i * 7919 % 101) as f32 / 50.0) - 1.0 + (i as f32).sin()).collect()
    }

    #[test]
    fn test_orthogonal_weights_tall_and_wide() {
        for (rows, cols, by_columns) in [(8, 4, true), (4, 8, false), (5, 5, true)] {
            let w = orthogonal_weights(rows, cols, 1.0, pseudo_normal(rows * cols));
            let g = gram(rows, cols, &w, by_columns);
            let k = rows.min(cols);
            for a in 0..k {
                for b in 0..k {
                    let expected = if a == b { 1.0 } else { 0.0 };
                    assert!((g[a * k + b] - expected).abs() < 1e-4, "{rows}x{cols} not orthonormal");
                }
            }
        }
    }

    #[test]
    fn test_gain_scales_norm() {
        let w = orthogonal_weights(6, 3, 0.01, pseudo_normal(18));
        let column_norm: f32 = (0..6).map(|i| w[i * 3].powi(2)).sum::<f32>().sqrt();
        assert!((column_norm - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let model: ActorCritic<TestBackend> = ActorCriticConfig::new(10, 3)
            .with_hidden_size(32)
            .init(&device);

        for batch in [1, 7] {
            let obs = Tensor::<TestBackend, 2>::random([batch, 10], Distribution::Normal(0.0, 1.0), &device);
            let (mean, std, value) = model.forward(obs);
            assert_eq!(mean.dims(), [batch, 3]);
            assert_eq!(std.dims(), [batch, 3]);
            assert_eq!(value.dims(), [batch, 1]);
        }
        assert_eq!(model.action_dim(), 3);
    }

    #[test]
    fn test_initial_policy_is_near_zero_with_unit_std() {
        let device = Default::default();
        let model: ActorCritic<TestBackend> = ActorCriticConfig::new(10, 4)
            .with_hidden_size(64)
            .init(&device);
        let obs = Tensor::<TestBackend, 2>::random([16, 10], Distribution::Normal(0.0, 1.0), &device);
        let (mean, std, _) = model.forward(obs);

        let max_mean: f32 = mean.abs().max().into_scalar().elem();
        assert!(max_mean < 0.1, "actor head should start near zero, got {max_mean}");

        let std = std.into_data().to_vec::<f32>().unwrap();
        assert!(std.iter().all(|s| (s - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_gaussian_log_prob_and_entropy() {
        let device = Default::default();
        let mean = Tensor::<TestBackend, 2>::zeros([2, 3], &device);
        let std = Tensor::<TestBackend, 2>::ones([2, 3], &device);

        // At the mean with unit std every dimension contributes -0.5 ln(2 pi)
        let log_prob = gaussian_log_prob(mean.clone(), mean.clone(), std.clone());
        assert_eq!(log_prob.dims(), [2, 1]);
        let expected = -1.5 * (2.0 * PI).ln();
        for v in log_prob.into_data().to_vec::<f32>().unwrap() {
            assert!((v - expected).abs() < 1e-5);
        }

        let entropy = gaussian_entropy(std);
        let expected = 3.0 * (0.5 + 0.5 * (2.0 * PI).ln());
        for v in entropy.into_data().to_vec::<f32>().unwrap() {
            assert!((v - expected).abs() < 1e-5);
        }

        // One unit away doubles the per-dimension penalty by 0.5
        let action = Tensor::<TestBackend, 2>::ones([1, 1], &device);
        let lp = gaussian_log_prob(
            action,
            Tensor::zeros([1, 1], &device),
            Tensor::ones([1, 1], &device),
        );
        let lp: f32 = lp.into_scalar().elem();
        assert!((lp - (-0.5 - 0.5 * (2.0 * PI).ln())).abs() < 1e-5);
    }
}
