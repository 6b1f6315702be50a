use super::*;
use ndarray::{arr2, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn table() -> Embedding {
    Embedding::new(arr2(&[[0.0, 0.1], [1.0, 1.1], [2.0, 2.1]]))
}

#[test]
fn test_lookup() {
    let emb = table();
    let ids = arr2(&[[2i64, 0], [1, 1]]);
    let out = emb.forward(&ids.view()).unwrap();

    assert_eq!(out.dim(), (2, 2, 2));
    assert_eq!(out[[0, 0, 0]], 2.0);
    assert_eq!(out[[0, 1, 1]], 0.1);
    assert_eq!(out[[1, 0, 1]], 1.1);
}

#[test]
fn test_out_of_range_ids_fail() {
    let emb = table();
    assert!(emb.forward(&arr2(&[[3i64]]).view()).is_err());
    assert!(emb.forward(&arr2(&[[-1i64]]).view()).is_err());
}

#[test]
fn test_positions() {
    let emb = table();
    assert_eq!(emb.positions(2).unwrap().dim(), (2, 2));
    assert_eq!(emb.positions(3).unwrap()[[2, 0]], 2.0);
    assert!(emb.positions(4).is_err());
}

#[test]
fn test_init_shape() {
    let mut rng = StdRng::seed_from_u64(1);
    let emb = Embedding::init(10, 4, &mut rng);
    assert_eq!(emb.num_embeddings(), 10);
    assert_eq!(emb.embedding_dim(), 4);
    assert_ne!(emb.weight, Array2::<f32>::zeros((10, 4)));
}
