//! Parameter traversal shared by every weighted layer.
//!
//! Layers expose their tensors under dotted names that mirror the PyTorch module
//! tree (`transformer.h.0.attn.c_attn.weight`), which is what checkpoints key on.

use anyhow::{bail, Result};
use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2};

/// Read-only view of a named parameter.
#[derive(Debug, Clone, Copy)]
pub enum Param<'a> {
    Vector(&'a Array1<f32>),
    Matrix(&'a Array2<f32>),
}

impl Param<'_> {
    pub fn shape(&self) -> &[usize] {
        match self {
            Param::Vector(a) => a.shape(),
            Param::Matrix(a) => a.shape(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Param::Vector(a) => a.len(),
            Param::Matrix(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the parameter into a dynamically shaped array.
    pub fn to_dyn(&self) -> ArrayD<f32> {
        match self {
            Param::Vector(a) => (*a).clone().into_dyn(),
            Param::Matrix(a) => (*a).clone().into_dyn(),
        }
    }
}

/// Mutable handle on a named parameter, used when loading weights.
#[derive(Debug)]
pub enum ParamMut<'a> {
    Vector(&'a mut Array1<f32>),
    Matrix(&'a mut Array2<f32>),
}

impl ParamMut<'_> {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            ParamMut::Vector(a) => a.shape().to_vec(),
            ParamMut::Matrix(a) => a.shape().to_vec(),
        }
    }

    /// Overwrites the parameter with `src`.
    ///
    /// Fails without touching the parameter when the shapes differ.
    pub fn assign(&mut self, name: &str, src: &ArrayD<f32>) -> Result<()> {
        let expected = self.shape();
        if src.shape() != expected.as_slice() {
            bail!(
                "size mismatch for {}: copying a param with shape {:?} from checkpoint, \
                 the shape in current model is {:?}",
                name,
                src.shape(),
                expected
            );
        }
        match self {
            ParamMut::Vector(a) => a.assign(&src.view().into_dimensionality::<Ix1>()?),
            ParamMut::Matrix(a) => a.assign(&src.view().into_dimensionality::<Ix2>()?),
        }
        Ok(())
    }
}

/// A layer (or tree of layers) owning named parameters.
pub trait Parameterized {
    /// Calls `f` with the fully qualified name of every parameter.
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(String, Param<'_>));

    /// Mutable counterpart of [`Parameterized::visit_parameters`]; stops at the first error.
    fn visit_parameters_mut(
        &mut self,
        prefix: &str,
        f: &mut dyn FnMut(String, ParamMut<'_>) -> Result<()>,
    ) -> Result<()>;

    /// Names of all parameters in traversal order.
    fn parameter_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.visit_parameters("", &mut |name, _| names.push(name));
        names
    }

    /// Total number of scalar weights.
    fn num_parameters(&self) -> usize {
        let mut total = 0;
        self.visit_parameters("", &mut |_, p| total += p.len());
        total
    }
}

/// Joins a module prefix and a parameter name with a dot.
pub fn join_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
