//! Reading training checkpoints and normalising their keys.

use std::path::Path;

use anyhow::{ensure, Result};
use nayan_transformers::{SafeTensorsLoader, StateDict};

/// Key prefix added by `torch.compile` wrappers.
pub const ORIG_MOD_PREFIX: &str = "_orig_mod.";

/// Containers are checked in this order.
const NESTED_KEYS: [&str; 2] = ["model", "state_dict"];

/// Where the weights live inside a checkpoint.
///
/// Training scripts save either the bare `state_dict` or a dict holding it under
/// `model` or `state_dict` next to optimizer state. Flattened into a safetensors
/// file, a nested container shows up as a key prefix.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointContainer {
    Direct(StateDict),
    Model(StateDict),
    StateDict(StateDict),
}

impl CheckpointContainer {
    /// Classifies `raw`. Keys outside the chosen container are dropped.
    pub fn resolve(raw: StateDict) -> Result<Self> {
        let key = match detect_container(raw.keys()) {
            Some(key) => key,
            None => return Ok(CheckpointContainer::Direct(raw)),
        };
        let total = raw.len();
        let inner = raw.strip_prefix(key);
        ensure!(
            !inner.keys().any(str::is_empty),
            "container '{}' holds a tensor without a name",
            key
        );
        if inner.len() < total {
            log::debug!(
                "ignoring {} checkpoint entries outside '{}'",
                total - inner.len(),
                key
            );
        }
        Ok(match key {
            "model" => CheckpointContainer::Model(inner),
            _ => CheckpointContainer::StateDict(inner),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CheckpointContainer::Direct(_) => "direct",
            CheckpointContainer::Model(_) => "model",
            CheckpointContainer::StateDict(_) => "state_dict",
        }
    }

    pub fn into_state_dict(self) -> StateDict {
        match self {
            CheckpointContainer::Direct(sd)
            | CheckpointContainer::Model(sd)
            | CheckpointContainer::StateDict(sd) => sd,
        }
    }
}

/// The nested container holding the weights, if the names show one.
pub fn detect_container<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<&'static str> {
    let mut found = [false; NESTED_KEYS.len()];
    for name in names {
        for (seen, key) in found.iter_mut().zip(NESTED_KEYS) {
            if name.strip_prefix(key).is_some_and(|rest| rest.starts_with('.')) {
                *seen = true;
            }
        }
    }
    NESTED_KEYS
        .into_iter()
        .zip(found)
        .find_map(|(key, seen)| seen.then_some(key))
}

/// Reads the tensors of a checkpoint file.
///
/// When the header shows a nested container only its entries are decoded;
/// siblings such as optimizer state or integer counters are skipped unread.
pub fn load_checkpoint(path: &Path) -> Result<StateDict> {
    let loader = SafeTensorsLoader::new(path)?;
    let names = loader.tensor_names()?;
    let key = match detect_container(names.iter().map(String::as_str)) {
        Some(key) => key,
        None => return loader.load_state_dict(),
    };

    let dotted = format!("{}.", key);
    let (inside, outside): (Vec<String>, Vec<String>) =
        names.into_iter().partition(|name| name.starts_with(&dotted));
    if !outside.is_empty() {
        log::debug!(
            "skipping {} checkpoint entries outside '{}' without decoding them",
            outside.len(),
            key
        );
    }
    loader.load_tensors(&inside)
}

/// Removes every `_orig_mod.` occurrence from every key.
///
/// Removal repeats until no occurrence is left, so applying the function twice
/// gives the same result as applying it once. Keys that become equal collapse
/// to the one that sorts last.
pub fn remove_orig_mod_prefix(state_dict: StateDict) -> StateDict {
    state_dict.map_keys(|key| {
        let mut key = key.to_string();
        while key.contains(ORIG_MOD_PREFIX) {
            key = key.replace(ORIG_MOD_PREFIX, "");
        }
        key
    })
}
