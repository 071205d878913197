use std::path::Path;

use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::vision::MnistDataset},
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
};

use crate::{
    data::MnistBatcher,
    model::{Cryptonets, CryptonetsConfig},
    squash,
    weights::{self, WeightFileError},
};

#[derive(Config)]
pub struct TrainingConfig {
    pub model: CryptonetsConfig,
    pub optimizer: AdamConfig,

    #[config(default = 10)]
    pub num_epochs: usize,
    #[config(default = 50)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 1e-4)]
    pub lr: f64,
}

fn create_artifact_dir(artifact_dir: &str) {
    // Remove existing artifacts
    std::fs::remove_dir_all(artifact_dir).ok();
    std::fs::create_dir_all(artifact_dir).ok();
}

/// Trains the network, exports every learned weight tensor as a text file,
/// then squashes the linear segment from those files, exactly as a fresh
/// `squash` run would.
pub fn train<B: AutodiffBackend>(artifact_dir: &str, config: TrainingConfig, device: B::Device) {
    create_artifact_dir(artifact_dir);
    config
        .save(format!("{artifact_dir}/config.json"))
        .expect("Config should be saved successfully");

    B::seed(config.seed);

    let mut model: Cryptonets<B> = config.model.init(&device);
    let mut optim = config.optimizer.init::<B, Cryptonets<B>>();

    let dataloader_train = DataLoaderBuilder::new(MnistBatcher)
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(MnistDataset::train());

    let dataloader_test = DataLoaderBuilder::<B::InnerBackend, _, _>::new(MnistBatcher)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(MnistDataset::test());

    println!("Starting training");
    for epoch in 1..=config.num_epochs {
        let mut train_loss = 0.0;
        let mut train_items = 0;

        for batch in dataloader_train.iter() {
            let output = model.forward(batch.images);
            let loss = CrossEntropyLossConfig::new()
                .init(&output.device())
                .forward(output, batch.targets.clone());

            let batch_items = batch.targets.dims()[0];
            train_loss += loss.clone().into_scalar().elem::<f32>() * batch_items as f32;
            train_items += batch_items;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(config.lr, model, grads);
        }

        let valid_model = model.valid();
        let mut num_correct = 0;
        let mut test_items = 0;

        for batch in dataloader_test.iter() {
            let output = valid_model.forward(batch.images);
            let predictions = output.argmax(1).squeeze(1);

            num_correct += predictions
                .equal(batch.targets.clone())
                .int()
                .sum()
                .into_scalar()
                .elem::<i64>();
            test_items += batch.targets.dims()[0];
        }

        println!(
            "[epoch {epoch}/{}] loss {:.4}, test accuracy {:.2}%",
            config.num_epochs,
            train_loss / train_items as f32,
            100.0 * num_correct as f32 / test_items as f32,
        );
    }

    let trained = model.valid();
    model
        .save_file(format!("{artifact_dir}/model"), &CompactRecorder::new())
        .expect("Trained model should be saved successfully");

    println!("Training finished. Saving variables");
    export_weights(&trained, Path::new(artifact_dir))
        .expect("Weight files should be written successfully");

    squash::squash_from_files::<B::InnerBackend>(Path::new(artifact_dir), &device)
        .expect("Squashed matrix should match the original pipeline");
}

/// Exports every learned weight tensor flattened to a text file, the format
/// the squasher and the downstream inference system read.
pub fn export_weights<B: Backend>(
    model: &Cryptonets<B>,
    artifact_dir: &Path,
) -> Result<(), WeightFileError> {
    weights::save_flat(
        &artifact_dir.join(weights::W_CONV1),
        model.conv1.weight.val(),
    )?;
    weights::save_flat(
        &artifact_dir.join(weights::W_CONV2),
        model.segment.conv2.weight.val(),
    )?;
    weights::save_flat(
        &artifact_dir.join(weights::W_FC1),
        model.segment.fc1.weight.val(),
    )?;
    weights::save_flat(&artifact_dir.join(weights::W_FC2), model.fc2.weight.val())?;
    Ok(())
}
