use approx::assert_abs_diff_eq;
use ferrite_cnn::{Error, ModelConfig, Network, Tensor3};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_image(h: usize, w: usize, seed: u64) -> Tensor3 {
    let mut rng = StdRng::seed_from_u64(seed);
    Tensor3::from_vec(h, w, 3, (0..h * w * 3).map(|_| rng.gen::<f32>()).collect())
}

#[test]
fn default_model_outputs_three_probabilities_before_and_after_save() {
    let mut rng = StdRng::seed_from_u64(0);
    let network = Network::new(ModelConfig::default(), &mut rng).unwrap();
    let image = random_image(256, 256, 1);

    let probs = network.predict(&image).unwrap();
    assert_eq!(probs.len(), 3);
    assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    assert_abs_diff_eq!(probs.iter().sum::<f32>(), 1.0, epsilon = 1e-5);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("saved_model").join("model.json");
    network.save_json(&path).unwrap();
    let restored = Network::load_json(&path).unwrap();

    let restored_probs = restored.predict(&image).unwrap();
    assert_eq!(restored_probs.len(), 3);
    assert_abs_diff_eq!(restored_probs.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
    for (a, b) in probs.iter().zip(&restored_probs) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-6);
    }
}

#[test]
fn default_model_rejects_other_input_sizes() {
    let mut rng = StdRng::seed_from_u64(0);
    let network = Network::new(ModelConfig::default(), &mut rng).unwrap();
    let err = network.predict(&Tensor3::zeros(128, 128, 3)).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { expected: (256, 256, 3), .. }));
}
