//! Learned lookup tables for token and position embeddings.

use anyhow::{anyhow, Result};
use ndarray::{s, Array2, Array3, ArrayView2};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::traits::{join_name, Param, ParamMut, Parameterized};

/// An `nn.Embedding` table of shape `[num_embeddings, embedding_dim]`.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub weight: Array2<f32>,
}

impl Embedding {
    pub fn new(weight: Array2<f32>) -> Self {
        Self { weight }
    }

    /// `N(0, 1)` initialisation, the `nn.Embedding` default.
    pub fn init<R: Rng + ?Sized>(num_embeddings: usize, embedding_dim: usize, rng: &mut R) -> Self {
        Self {
            weight: Array2::random_using((num_embeddings, embedding_dim), StandardNormal, rng),
        }
    }

    pub fn num_embeddings(&self) -> usize {
        self.weight.shape()[0]
    }

    pub fn embedding_dim(&self) -> usize {
        self.weight.shape()[1]
    }

    /// Looks up `[batch, seq]` ids, producing `[batch, seq, dim]`.
    ///
    /// Fails on negative or out-of-range ids.
    pub fn forward(&self, ids: &ArrayView2<i64>) -> Result<Array3<f32>> {
        let (batch, seq) = ids.dim();
        let vocab = self.num_embeddings();
        let mut out = Array3::<f32>::zeros((batch, seq, self.embedding_dim()));

        for ((b, t), &id) in ids.indexed_iter() {
            let row = usize::try_from(id)
                .ok()
                .filter(|&r| r < vocab)
                .ok_or_else(|| anyhow!("index {} is out of range for embedding table of size {}", id, vocab))?;
            out.slice_mut(s![b, t, ..]).assign(&self.weight.row(row));
        }
        Ok(out)
    }

    /// Rows `0..len`, used for absolute position embeddings.
    pub fn positions(&self, len: usize) -> Result<ArrayView2<'_, f32>> {
        if len > self.num_embeddings() {
            return Err(anyhow!(
                "requested {} positions but the table only holds {}",
                len,
                self.num_embeddings()
            ));
        }
        Ok(self.weight.slice(s![0..len, ..]))
    }
}

impl Parameterized for Embedding {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(String, Param<'_>)) {
        f(join_name(prefix, "weight"), Param::Matrix(&self.weight));
    }

    fn visit_parameters_mut(
        &mut self,
        prefix: &str,
        f: &mut dyn FnMut(String, ParamMut<'_>) -> Result<()>,
    ) -> Result<()> {
        f(join_name(prefix, "weight"), ParamMut::Matrix(&mut self.weight))
    }
}

#[cfg(test)]
mod tests;
