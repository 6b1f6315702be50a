//! Layer normalization over the embedding axis.

use anyhow::Result;
use ndarray::{Array1, Array3, ArrayView3, Axis};

use crate::traits::{join_name, Param, ParamMut, Parameterized};

/// Epsilon used by `nn.LayerNorm` unless configured otherwise.
pub const DEFAULT_LAYER_NORM_EPS: f32 = 1e-5;

/// Layer normalization over the last axis.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    pub weight: Array1<f32>,
    pub bias: Array1<f32>,
    pub eps: f32,
}

impl LayerNorm {
    pub fn new(weight: Array1<f32>, bias: Array1<f32>, eps: f32) -> Self {
        Self { weight, bias, eps }
    }

    /// Identity-initialised norm (ones / zeros).
    pub fn init(dim: usize, eps: f32) -> Self {
        Self::new(Array1::ones(dim), Array1::zeros(dim), eps)
    }

    pub fn dim(&self) -> usize {
        self.weight.len()
    }

    /// Normalises `[batch, seq, dim]` activations along `dim`.
    pub fn forward(&self, hidden_states: &ArrayView3<f32>) -> Array3<f32> {
        let n = hidden_states.shape()[2] as f32;
        let mean = (hidden_states.sum_axis(Axis(2)) / n).insert_axis(Axis(2));
        let centered = hidden_states - &mean;
        let variance = (centered.mapv(|x| x * x).sum_axis(Axis(2)) / n).insert_axis(Axis(2));

        let inv_std = (variance + self.eps).mapv(|x| 1.0 / x.sqrt());
        let normalized = centered * &inv_std;

        normalized * &self.weight + &self.bias
    }

    pub fn forward_3d(&self, hidden: &Array3<f32>) -> Array3<f32> {
        self.forward(&hidden.view())
    }
}

impl Parameterized for LayerNorm {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(String, Param<'_>)) {
        f(join_name(prefix, "weight"), Param::Vector(&self.weight));
        f(join_name(prefix, "bias"), Param::Vector(&self.bias));
    }

    fn visit_parameters_mut(
        &mut self,
        prefix: &str,
        f: &mut dyn FnMut(String, ParamMut<'_>) -> Result<()>,
    ) -> Result<()> {
        f(join_name(prefix, "weight"), ParamMut::Vector(&mut self.weight))?;
        f(join_name(prefix, "bias"), ParamMut::Vector(&mut self.bias))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, s, Array3};

    #[test]
    fn test_rows_are_standardised() {
        let ln = LayerNorm::init(4, 1e-6);
        let hidden = Array3::from_shape_vec((1, 2, 4), vec![1.0, 2.0, 3.0, 4.0, -8.0, 0.0, 0.0, 8.0]).unwrap();
        let out = ln.forward_3d(&hidden);

        for t in 0..2 {
            let row = out.slice(s![0, t, ..]);
            let mean = row.sum() / 4.0;
            let var = row.mapv(|x| (x - mean) * (x - mean)).sum() / 4.0;
            assert!(mean.abs() < 1e-5);
            assert!((var - 1.0).abs() < 1e-3);
        }
        // 1, 2, 3, 4 has mean 2.5 and variance 1.25
        assert!((out[[0, 0, 0]] + 1.5 / 1.25f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn test_affine_parameters_apply_per_channel() {
        let ln = LayerNorm::new(array![2.0, 0.0], array![0.5, -3.0], 1e-6);
        let hidden = Array3::from_shape_vec((1, 1, 2), vec![10.0, 20.0]).unwrap();
        let out = ln.forward_3d(&hidden);

        // Normalised row is [-1, 1]
        assert!((out[[0, 0, 0]] - (-2.0 + 0.5)).abs() < 1e-4);
        assert_eq!(out[[0, 0, 1]], -3.0);
    }

    #[test]
    fn test_constant_row_yields_bias() {
        let ln = LayerNorm::new(array![1.0, 1.0, 1.0], array![0.1, 0.2, 0.3], DEFAULT_LAYER_NORM_EPS);
        let hidden = Array3::from_elem((2, 1, 3), 7.0);
        let out = ln.forward_3d(&hidden);
        assert!(out.iter().all(|v| v.is_finite()));
        assert!((out[[1, 0, 2]] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_strided_view_matches_owned() {
        let ln = LayerNorm::init(3, DEFAULT_LAYER_NORM_EPS);
        let base = Array3::from_shape_fn((3, 2, 2), |(i, j, k)| (i * 4 + j * 2 + k) as f32);
        // Axes swapped so the normalised axis is strided
        let permuted = base.view().permuted_axes([1, 2, 0]);
        let owned = permuted.as_standard_layout().into_owned();
        let strided = ln.forward(&permuted);
        let contiguous = ln.forward_3d(&owned);
        assert_eq!(strided.dim(), (2, 2, 3));
        for (a, b) in strided.iter().zip(contiguous.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_parameter_names() {
        let ln = LayerNorm::init(4, DEFAULT_LAYER_NORM_EPS);
        let mut names = Vec::new();
        ln.visit_parameters("ln_f", &mut |name, p| names.push((name, p.shape().to_vec())));
        assert_eq!(
            names,
            vec![("ln_f.weight".to_string(), vec![4]), ("ln_f.bias".to_string(), vec![4])]
        );
    }
}
