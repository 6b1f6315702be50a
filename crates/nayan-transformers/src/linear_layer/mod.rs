//! Dense projection with PyTorch `nn.Linear` weight layout.

use anyhow::Result;
use ndarray::{Array1, Array2, Array3, ArrayView2};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;

use crate::traits::{join_name, Param, ParamMut, Parameterized};
use crate::utils::matmul_3d_2d_transposed;

/// `y = x @ W.T + b` with `W` stored as `[out_features, in_features]`.
#[derive(Debug, Clone)]
pub struct LinearLayer {
    pub weight: Array2<f32>,
    pub bias: Option<Array1<f32>>,
}

impl LinearLayer {
    pub fn new(weight: Array2<f32>, bias: Option<Array1<f32>>) -> Self {
        Self { weight, bias }
    }

    /// Random initialisation matching `nn.Linear`: `U(-1/sqrt(in), 1/sqrt(in))`
    /// for both weight and bias.
    pub fn init<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        with_bias: bool,
        rng: &mut R,
    ) -> Self {
        let bound = 1.0 / (in_features.max(1) as f32).sqrt();
        let dist = Uniform::new(-bound, bound);
        let weight = Array2::random_using((out_features, in_features), dist, rng);
        let bias = with_bias.then(|| Array1::random_using(out_features, dist, rng));
        Self { weight, bias }
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape()[1]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape()[0]
    }

    /// Projects a `[rows, in]` matrix.
    pub fn matmul(&self, input: &ArrayView2<f32>) -> Array2<f32> {
        let out = input.dot(&self.weight.t());
        match &self.bias {
            Some(b) => out + b,
            None => out,
        }
    }

    /// Projects a `[batch, seq, in]` tensor.
    pub fn forward(&self, input: &Array3<f32>) -> Result<Array3<f32>> {
        let out = matmul_3d_2d_transposed(input, &self.weight.view())?;
        Ok(match &self.bias {
            Some(b) => out + b,
            None => out,
        })
    }
}

impl Parameterized for LinearLayer {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(String, Param<'_>)) {
        f(join_name(prefix, "weight"), Param::Matrix(&self.weight));
        if let Some(b) = &self.bias {
            f(join_name(prefix, "bias"), Param::Vector(b));
        }
    }

    fn visit_parameters_mut(
        &mut self,
        prefix: &str,
        f: &mut dyn FnMut(String, ParamMut<'_>) -> Result<()>,
    ) -> Result<()> {
        f(join_name(prefix, "weight"), ParamMut::Matrix(&mut self.weight))?;
        if let Some(b) = &mut self.bias {
            f(join_name(prefix, "bias"), ParamMut::Vector(b))?;
        }
        Ok(())
    }
}
