//! Weight containers and checkpoint file I/O.

mod safetensors_loader;
mod state_dict;

pub use safetensors_loader::{raw_to_f32, save_safetensors, SafeTensorsLoader};
pub use state_dict::StateDict;

#[cfg(test)]
mod tests;
