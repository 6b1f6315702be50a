use super::*;
use ndarray::{arr1, arr2, ArrayD, IxDyn};
use safetensors::tensor::{Dtype, TensorView};
use std::collections::HashMap;
use tempfile::TempDir;

fn sample() -> StateDict {
    let mut sd = StateDict::new();
    sd.insert("transformer.wte.weight", arr2(&[[1.0f32, 2.0], [3.0, 4.0]]).into_dyn());
    sd.insert("transformer.ln_f.bias", arr1(&[0.5f32, -0.5]).into_dyn());
    sd
}

#[test]
fn test_state_dict_keys_are_sorted() {
    let sd = sample();
    let keys: Vec<&str> = sd.keys().collect();
    assert_eq!(keys, vec!["transformer.ln_f.bias", "transformer.wte.weight"]);
    assert_eq!(sd.num_elements(), 6);
}

#[test]
fn test_strip_prefix_drops_other_entries() {
    let mut sd = sample();
    sd.insert("optimizer.step", ArrayD::zeros(IxDyn(&[1])));
    assert!(sd.clone().strip_prefix("trans").is_empty());

    let inner = sd.strip_prefix("transformer");
    assert_eq!(inner.len(), 2);
    assert!(inner.contains("wte.weight"));
    assert!(!inner.contains("optimizer.step"));
}

#[test]
fn test_map_keys() {
    let sd = sample().map_keys(|k| k.replace("transformer.", ""));
    assert!(sd.contains("wte.weight"));
    assert!(sd.contains("ln_f.bias"));
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("weights.safetensors");
    let sd = sample();
    save_safetensors(&sd, None, &path).unwrap();

    let loader = SafeTensorsLoader::new(&path).unwrap();
    assert_eq!(loader.tensor_count().unwrap(), 2);
    assert!(loader.contains("transformer.wte.weight").unwrap());
    assert!(!loader.contains("lm_head.weight").unwrap());
    assert_eq!(
        loader.tensor_names().unwrap(),
        vec!["transformer.ln_f.bias".to_string(), "transformer.wte.weight".to_string()]
    );
    assert_eq!(loader.load_state_dict().unwrap(), sd);
}

#[test]
fn test_half_precision_tensors_are_widened() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("half.safetensors");

    let values = [1.0f32, -2.5, 0.125];
    let f16_bytes: Vec<u8> = values
        .iter()
        .flat_map(|v| half::f16::from_f32(*v).to_le_bytes())
        .collect();
    let bf16_bytes: Vec<u8> = values
        .iter()
        .flat_map(|v| half::bf16::from_f32(*v).to_le_bytes())
        .collect();

    let mut views = HashMap::new();
    views.insert("a".to_string(), TensorView::new(Dtype::F16, vec![3], &f16_bytes).unwrap());
    views.insert("b".to_string(), TensorView::new(Dtype::BF16, vec![3], &bf16_bytes).unwrap());
    std::fs::write(&path, safetensors::serialize(&views, &None).unwrap()).unwrap();

    let loader = SafeTensorsLoader::new(&path).unwrap();
    assert_eq!(loader.get_array("a").unwrap().as_slice().unwrap(), &values);
    assert_eq!(loader.get_array("b").unwrap().as_slice().unwrap(), &values);
}

#[test]
fn test_load_tensors_leaves_other_entries_undecoded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mixed.safetensors");

    let weight: Vec<u8> = [1.5f32, -1.0].iter().flat_map(|v| v.to_le_bytes()).collect();
    let step: Vec<u8> = 600_000i64.to_le_bytes().to_vec();
    let mut views = HashMap::new();
    views.insert("model.ln_f.weight".to_string(), TensorView::new(Dtype::F32, vec![2], &weight).unwrap());
    views.insert("iter_num".to_string(), TensorView::new(Dtype::I64, vec![], &step).unwrap());
    std::fs::write(&path, safetensors::serialize(&views, &None).unwrap()).unwrap();

    let loader = SafeTensorsLoader::new(&path).unwrap();
    assert_eq!(loader.tensor_names().unwrap(), vec!["iter_num", "model.ln_f.weight"]);

    let selected = loader.load_tensors(&["model.ln_f.weight".to_string()]).unwrap();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected.get("model.ln_f.weight").unwrap().as_slice().unwrap(), &[1.5, -1.0]);

    let err = loader.load_state_dict().unwrap_err();
    assert!(format!("{:#}", err).contains("unsupported tensor dtype I64"));
    assert!(loader.load_tensors(&["absent".to_string()]).is_err());
}

#[test]
fn test_unsupported_dtype_is_rejected() {
    let err = raw_to_f32(Dtype::I32, &[0, 0, 0, 0]).unwrap_err();
    assert!(err.to_string().contains("unsupported tensor dtype"));
}

#[test]
fn test_missing_tensor_and_bad_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("weights.safetensors");
    save_safetensors(&sample(), None, &path).unwrap();
    let loader = SafeTensorsLoader::new(&path).unwrap();
    assert!(loader.get_array("nope").is_err());

    let junk = dir.path().join("junk.safetensors");
    std::fs::write(&junk, b"not a checkpoint").unwrap();
    assert!(SafeTensorsLoader::new(&junk).is_err());
    assert!(SafeTensorsLoader::new(&dir.path().join("missing")).is_err());
}
