use super::*;
use crate::{CausalSelfAttention, LayerNorm, LinearLayer, Mlp};
use ndarray::{Array1, Array3};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Uniform;
use tempfile::TempDir;
use tract_onnx::prelude::{tvec, DatumExt, Framework, InferenceModelExt, Tensor};

fn fixed(shape: &[usize]) -> Vec<Dim> {
    shape.iter().map(|&d| Dim::Fixed(d as i64)).collect()
}

fn lowered<L: Lower>(
    layer: &L,
    fold: bool,
    input_shape: &[usize],
    output_shape: &[usize],
    max_positions: Option<usize>,
) -> pb::ModelProto {
    let mut g = GraphBuilder::new(fold);
    let x = g.add_input("x", DataType::Float, &fixed(input_shape));
    if let Some(max) = max_positions {
        g.track_sequence(&x, max);
    }
    let y = layer.lower(&mut g, "layer", &x).unwrap();
    g.node_named("Identity", &[&y], "y", vec![]);
    g.add_output("y", DataType::Float, &fixed(output_shape));
    g.into_model("test", DEFAULT_OPSET, "0.0.0").unwrap()
}

fn run(model: &pb::ModelProto, input: &Array3<f32>) -> (Vec<usize>, Vec<f32>) {
    let shape = input.shape().to_vec();
    let plan = tract_onnx::onnx()
        .model_for_proto_model(model)
        .unwrap()
        .with_input_fact(0, f32::fact(shape.clone()).into())
        .unwrap()
        .into_optimized()
        .unwrap()
        .into_runnable()
        .unwrap();
    let data: Vec<f32> = input.iter().copied().collect();
    let tensor = Tensor::from_shape(&shape, &data).unwrap();
    let out = plan.run(tvec!(tensor.into())).unwrap();
    (out[0].shape().to_vec(), out[0].as_slice::<f32>().unwrap().to_vec())
}

fn assert_close(actual: &[f32], expected: &Array3<f32>, tol: f32) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!((a - e).abs() <= tol, "element {}: {} vs {}", i, a, e);
    }
}

fn random_input(rng: &mut StdRng, shape: (usize, usize, usize)) -> Array3<f32> {
    Array3::random_using(shape, Uniform::new(-1.0f32, 1.0), rng)
}

#[test]
fn test_fresh_names_are_unique() {
    let mut g = GraphBuilder::new(true);
    let a = g.fresh("x");
    let b = g.fresh("x");
    assert_ne!(a, b);
}

#[test]
fn test_scalars_are_shared() {
    let mut g = GraphBuilder::new(true);
    let a = g.scalar(0.5);
    let b = g.scalar(0.5);
    let c = g.scalar(2.0);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(g.initializers().len(), 2);
    assert!(g.initializers()[0].dims.is_empty());
}

#[test]
fn test_causal_bias_needs_sequence() {
    let mut g = GraphBuilder::new(true);
    assert!(g.causal_bias().is_err());
    assert!(g.sequence_length().is_err());

    g.add_input("x", DataType::Float, &[Dim::symbolic("batch_size"), Dim::symbolic("sequence")]);
    g.track_sequence("x", 4);
    let first = g.causal_bias().unwrap();
    let second = g.causal_bias().unwrap();
    assert_eq!(first, second);
    let tables = g
        .initializers()
        .iter()
        .filter(|t| t.name == "attn.causal_bias")
        .count();
    assert_eq!(tables, 1);
}

#[test]
fn test_opset_range_is_enforced() {
    let layer = LinearLayer::new(ndarray::Array2::eye(2), None);
    for opset in [12, 18] {
        let mut g = GraphBuilder::new(true);
        let x = g.add_input("x", DataType::Float, &fixed(&[1, 1, 2]));
        let y = layer.lower(&mut g, "l", &x).unwrap();
        g.node_named("Identity", &[&y], "y", vec![]);
        g.add_output("y", DataType::Float, &fixed(&[1, 1, 2]));
        assert!(g.into_model("m", opset, "0").is_err());
    }
}

#[test]
fn test_ir_version_follows_opset() {
    let layer = LinearLayer::new(ndarray::Array2::eye(2), None);
    for (opset, ir) in [(13, 7), (14, 7), (15, 8), (17, 8)] {
        let mut g = GraphBuilder::new(true);
        let x = g.add_input("x", DataType::Float, &fixed(&[1, 1, 2]));
        let y = layer.lower(&mut g, "l", &x).unwrap();
        g.node_named("Identity", &[&y], "y", vec![]);
        g.add_output("y", DataType::Float, &fixed(&[1, 1, 2]));
        let model = g.into_model("m", opset, "0").unwrap();
        assert_eq!(model.ir_version, ir, "opset {}", opset);
        assert_eq!(model.opset_import[0].version, opset);
    }
}

#[test]
fn test_model_header() {
    let layer = LinearLayer::new(ndarray::Array2::eye(2), None);
    let model = lowered(&layer, true, &[1, 1, 2], &[1, 1, 2], None);
    assert_eq!(model.ir_version, 7);
    assert_eq!(model.producer_name, "nayan");
    assert_eq!(model.opset_import.len(), 1);
    assert_eq!(model.opset_import[0].version, DEFAULT_OPSET);
    let graph = model.graph.as_ref().unwrap();
    assert_eq!(graph.input[0].name, "x");
    assert_eq!(graph.output[0].name, "y");
}

#[test]
fn test_write_and_read_model() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("m.onnx");
    let layer = LinearLayer::new(ndarray::Array2::eye(2), Some(Array1::zeros(2)));
    let model = lowered(&layer, false, &[1, 1, 2], &[1, 1, 2], None);

    let written = write_model(&model, &path).unwrap();
    assert_eq!(written, std::fs::metadata(&path).unwrap().len());
    assert_eq!(read_model(&path).unwrap(), model);
}

#[test]
fn test_read_model_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.onnx");
    std::fs::write(&path, [0xffu8; 16]).unwrap();
    assert!(read_model(&path).is_err());
}

#[test]
fn test_linear_lowering_matches_forward() {
    let mut rng = StdRng::seed_from_u64(1);
    let layer = LinearLayer::init(6, 4, true, &mut rng);
    let x = random_input(&mut rng, (2, 3, 6));
    let expected = layer.forward(&x).unwrap();

    for fold in [true, false] {
        let model = lowered(&layer, fold, &[2, 3, 6], &[2, 3, 4], None);
        let (shape, y) = run(&model, &x);
        assert_eq!(shape, vec![2, 3, 4]);
        assert_close(&y, &expected, 1e-5);
    }
}

#[test]
fn test_folding_removes_weight_transpose() {
    let mut rng = StdRng::seed_from_u64(2);
    let layer = LinearLayer::init(3, 5, false, &mut rng);
    let count = |fold: bool| {
        let mut g = GraphBuilder::new(fold);
        layer.lower(&mut g, "l", "x").unwrap();
        g.nodes().iter().filter(|n| n.op_type == "Transpose").count()
    };
    assert_eq!(count(true), 0);
    assert_eq!(count(false), 1);
}

#[test]
fn test_layer_norm_lowering_matches_forward() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut ln = LayerNorm::init(8, 1e-5);
    ln.weight = Array1::random_using(8, Uniform::new(0.5f32, 1.5), &mut rng);
    ln.bias = Array1::random_using(8, Uniform::new(-0.5f32, 0.5), &mut rng);
    let x = random_input(&mut rng, (1, 4, 8));
    let expected = ln.forward_3d(&x);

    let model = lowered(&ln, true, &[1, 4, 8], &[1, 4, 8], None);
    let (_, y) = run(&model, &x);
    assert_close(&y, &expected, 1e-4);
}

#[test]
fn test_mlp_lowering_matches_forward() {
    let mut rng = StdRng::seed_from_u64(4);
    let mlp = Mlp::init(8, &mut rng);
    let x = random_input(&mut rng, (1, 3, 8));
    let expected = mlp.forward(&x).unwrap();

    let model = lowered(&mlp, true, &[1, 3, 8], &[1, 3, 8], None);
    let (_, y) = run(&model, &x);
    assert_close(&y, &expected, 1e-4);
}

#[test]
fn test_attention_lowering_matches_forward() {
    let mut rng = StdRng::seed_from_u64(5);
    let attn = CausalSelfAttention::init(8, 2, &mut rng).unwrap();
    let x = random_input(&mut rng, (2, 5, 8));
    let expected = attn.forward(&x).unwrap();

    for fold in [true, false] {
        let model = lowered(&attn, fold, &[2, 5, 8], &[2, 5, 8], Some(7));
        let (shape, y) = run(&model, &x);
        assert_eq!(shape, vec![2, 5, 8]);
        assert_close(&y, &expected, 1e-4);
    }
}

#[test]
fn test_unfolded_attention_splits_fused_projection() {
    let mut rng = StdRng::seed_from_u64(6);
    let attn = CausalSelfAttention::init(4, 2, &mut rng).unwrap();
    let ops = |fold: bool| {
        let mut g = GraphBuilder::new(fold);
        g.track_sequence("x", 4);
        attn.lower(&mut g, "attn", "x").unwrap();
        let splits = g.nodes().iter().filter(|n| n.op_type == "Split").count();
        let names: Vec<String> = g.initializers().iter().map(|t| t.name.clone()).collect();
        (splits, names)
    };

    let (splits, names) = ops(false);
    assert_eq!(splits, 1);
    assert!(names.contains(&"attn.c_attn.weight".to_string()));

    let (splits, names) = ops(true);
    assert_eq!(splits, 0);
    assert!(names.contains(&"attn.c_attn.q.weight".to_string()));
    assert!(names.contains(&"attn.c_attn.v.bias".to_string()));
}
