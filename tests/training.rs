mod common;

use std::sync::mpsc;

use ferrite_trainer::dataset::{prepare_split, ImageBatches};
use ferrite_trainer::image::InputShape;
use ferrite_trainer::math::{argmax, Tensor};
use ferrite_trainer::network::{build_model, load_artifact, save_artifact, Architecture, CompiledModel, ModelMetadata};
use ferrite_trainer::train::{train_loop, TrainConfig, TrainEvent};
use ferrite_trainer::ServiceConfig;

use common::*;

fn classes() -> Vec<String> {
    vec!["normal".into(), "pneumonia".into()]
}

#[test]
fn reloaded_artifact_predicts_like_the_trained_network() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServiceConfig::for_base_dir(dir.path());
    let root = make_dataset(&config, "chest", &[("normal", 6, 2), ("pneumonia", 6, 2)], 8);

    let samples = prepare_split(&root, &classes(), 0.2, 11).unwrap();
    let CompiledModel { mut network, mut optimizer } = build_model(Architecture::Simple, SMALL, 2, 11).unwrap();
    let mut source = ImageBatches::new(samples, SMALL, 11);
    let outcome = train_loop(&mut network, &mut optimizer, &mut source, &TrainConfig::new(2, 4)).unwrap();
    assert_eq!(outcome.history.len(), 2);

    let zero = Tensor::zeros(&[1, 8, 8, 3]);
    let before = network.predict(&zero).unwrap();

    let metadata = ModelMetadata {
        name: "roundtrip".into(),
        version: "1".into(),
        class_names: classes(),
        input_shape: SMALL,
        job_id: None,
        description: None,
    };
    let out = dir.path().join("artifact");
    save_artifact(&network, &metadata, optimizer.learning_rate, &out).unwrap();
    let (mut reloaded, read_back) = load_artifact(&out).unwrap();
    assert_eq!(read_back, metadata);

    let after = reloaded.predict(&zero).unwrap();
    assert_eq!(argmax(before.item(0)), argmax(after.item(0)));
    for (a, b) in before.item(0).iter().zip(after.item(0)) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn every_architecture_trains_one_epoch_on_small_images() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServiceConfig::for_base_dir(dir.path());
    let root = make_dataset(&config, "chest", &[("normal", 3, 1), ("pneumonia", 3, 1)], 32);
    let shape = InputShape { width: 32, height: 32, channels: 1 };

    for architecture in [Architecture::Simple, Architecture::Default, Architecture::Mobilenet] {
        let samples = prepare_split(&root, &classes(), 0.2, 3).unwrap();
        let CompiledModel { mut network, mut optimizer } = build_model(architecture, shape, 2, 3).unwrap();
        let mut source = ImageBatches::new(samples, shape, 3);

        let (tx, rx) = mpsc::channel();
        let mut train_config = TrainConfig::new(1, 2);
        train_config.progress_tx = Some(tx);
        let outcome = train_loop(&mut network, &mut optimizer, &mut source, &train_config).unwrap();
        drop(train_config);

        let events: Vec<TrainEvent> = rx.iter().collect();
        assert_eq!(events.len(), 2, "{}", architecture.as_str());
        assert!(outcome.history[0].train_loss.is_finite(), "{}", architecture.as_str());
        assert_eq!(outcome.evaluation.samples, 2);
    }
}
