//! SafeTensors checkpoint loader backed by a memory map.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use half::{bf16, f16};
use memmap2::Mmap;
use ndarray::{ArrayD, IxDyn};
use rayon::prelude::*;
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;

use super::StateDict;

/// A loader for a single `.safetensors` checkpoint file.
///
/// The header is validated when the loader is created; tensor data stays in the
/// page cache until a tensor is requested.
#[derive(Debug)]
pub struct SafeTensorsLoader {
    path: PathBuf,
    mmap: Mmap,
}

impl SafeTensorsLoader {
    pub fn new(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("path {:?} is not a file", path));
        }
        let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
        // The file is opened read-only and not modified while mapped.
        let mmap = unsafe { Mmap::map(&file) }.with_context(|| format!("failed to mmap {:?}", path))?;

        let count = SafeTensors::deserialize(&mmap)
            .with_context(|| format!("failed to parse safetensors: {:?}", path))?
            .len();
        log::debug!(
            "opened safetensors file {:?} with {} tensors",
            path.file_name().unwrap_or_default(),
            count
        );

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    fn tensors(&self) -> Result<SafeTensors<'_>> {
        SafeTensors::deserialize(&self.mmap)
            .with_context(|| format!("failed to parse safetensors: {:?}", self.path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns all tensor names, sorted. Reads only the header.
    pub fn tensor_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.tensors()?.names().into_iter().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn tensor_count(&self) -> Result<usize> {
        Ok(self.tensors()?.len())
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.tensors()?.tensor(name).is_ok())
    }

    /// Reads one tensor, converting it to `f32`.
    pub fn get_array(&self, name: &str) -> Result<ArrayD<f32>> {
        let st = self.tensors()?;
        let view = st
            .tensor(name)
            .map_err(|_| anyhow!("tensor '{}' not found in {:?}", name, self.path))?;
        view_to_array(name, &view)
    }

    /// Reads every tensor into a [`StateDict`].
    pub fn load_state_dict(&self) -> Result<StateDict> {
        let names = self.tensor_names()?;
        self.load_tensors(&names)
    }

    /// Reads only `names` into a [`StateDict`]. Other tensors are never decoded,
    /// so their dtype does not matter.
    pub fn load_tensors(&self, names: &[String]) -> Result<StateDict> {
        let st = self.tensors()?;
        let mut state_dict = StateDict::new();
        for name in names {
            let view = st
                .tensor(name)
                .map_err(|_| anyhow!("tensor '{}' not found in {:?}", name, self.path))?;
            state_dict.insert(name.clone(), view_to_array(name, &view)?);
        }
        log::info!(
            "loaded {} tensors ({} values) from {:?}",
            state_dict.len(),
            state_dict.num_elements(),
            self.path.file_name().unwrap_or_default()
        );
        Ok(state_dict)
    }
}

fn view_to_array(name: &str, view: &TensorView<'_>) -> Result<ArrayD<f32>> {
    let values = raw_to_f32(view.dtype(), view.data())
        .with_context(|| format!("failed to decode tensor '{}'", name))?;
    ArrayD::from_shape_vec(IxDyn(view.shape()), values)
        .with_context(|| format!("tensor '{}' has inconsistent shape {:?}", name, view.shape()))
}

/// Decodes little-endian tensor bytes into `f32` values.
pub fn raw_to_f32(dtype: Dtype, bytes: &[u8]) -> Result<Vec<f32>> {
    let values = match dtype {
        Dtype::F32 => bytes
            .par_chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        Dtype::F16 => bytes
            .par_chunks_exact(2)
            .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::BF16 => bytes
            .par_chunks_exact(2)
            .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::F64 => bytes
            .par_chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
            .collect(),
        other => bail!("unsupported tensor dtype {:?}", other),
    };
    Ok(values)
}

/// Writes a [`StateDict`] as `f32` tensors.
pub fn save_safetensors(
    state_dict: &StateDict,
    metadata: Option<HashMap<String, String>>,
    path: &Path,
) -> Result<()> {
    let stored: Vec<(String, Vec<usize>, Vec<u8>)> = state_dict
        .iter()
        .map(|(name, tensor)| {
            let bytes: Vec<u8> = tensor.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name.clone(), tensor.shape().to_vec(), bytes)
        })
        .collect();

    let mut views = HashMap::with_capacity(stored.len());
    for (name, shape, bytes) in &stored {
        views.insert(name.clone(), TensorView::new(Dtype::F32, shape.clone(), bytes)?);
    }

    safetensors::serialize_to_file(&views, &metadata, path)
        .with_context(|| format!("failed to write safetensors file {:?}", path))?;
    Ok(())
}
