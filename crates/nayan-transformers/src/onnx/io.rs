use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use prost::Message;

use super::pb;

/// Serializes `model` to `path`, returning the number of bytes written.
pub fn write_model(model: &pb::ModelProto, path: &Path) -> Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {:?}", parent))?;
    }
    let bytes = model.encode_to_vec();
    fs::write(path, &bytes).with_context(|| format!("failed to write {:?}", path))?;
    log::debug!("wrote {} bytes to {:?}", bytes.len(), path);
    Ok(bytes.len() as u64)
}

pub fn read_model(path: &Path) -> Result<pb::ModelProto> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
    pb::ModelProto::decode(bytes.as_slice())
        .with_context(|| format!("{:?} is not a valid ONNX model", path))
}
