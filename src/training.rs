use crate::data::{MnistBatch, MnistBatcher, MnistDataset};
use crate::model::{Classifier, ClassifierConfig};
use burn::prelude::*;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
};

#[derive(Config)]
pub struct TrainingConfig {
    pub model: ClassifierConfig,
    pub optimizer: AdamConfig,
    #[config(default = 3)]
    pub num_epochs: usize,
    #[config(default = 64)]
    pub batch_size: usize,
    #[config(default = 1e-3)]
    pub lr: f64,
    #[config(default = 42)]
    pub seed: u64,
    /// Batch interval in between progress lines.
    #[config(default = 100)]
    pub log_interval: usize,
}

pub type Dataloader<B> = std::sync::Arc<dyn DataLoader<B, MnistBatch<B>> + 'static>;

fn create_artifact_dir(artifact_dir: &str) {
    // Remove existing artifacts
    std::fs::remove_dir_all(artifact_dir).ok();
    std::fs::create_dir_all(artifact_dir).ok();
}

/// Train the classifier on the MNIST train split and save the trained weights
/// and the config under `artifact_dir`.
///
/// Mini-batches are visited in dataset order, every epoch. The epoch count is
/// fixed up front; there is no early stopping and no mid-training checkpoint.
pub fn train<B: AutodiffBackend>(artifact_dir: &str, config: TrainingConfig, device: B::Device) {
    create_artifact_dir(artifact_dir);

    // Save training config
    config
        .save(format!("{artifact_dir}/config.json"))
        .expect("Config should be saved successfully");
    B::seed(config.seed);

    // Create the model and optimizer
    let mut model: Classifier<B> = config.model.init(&device);
    let mut optim = config.optimizer.init::<B, Classifier<B>>();

    // Create the batcher
    let batcher = MnistBatcher::default();

    // Create the dataloaders. Single-threaded and unshuffled: worker threads
    // would yield batches in arrival order, not dataset order.
    let dataloader_train: Dataloader<B> = DataLoaderBuilder::new(batcher.clone())
        .batch_size(config.batch_size)
        .build(MnistDataset::train());
    let dataloader_test: Dataloader<B::InnerBackend> = DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size)
        .build(MnistDataset::test());

    let num_batches = dataloader_train.num_items().div_ceil(config.batch_size);

    println!("Starting training...");
    // Iterate over our training for X epochs
    for epoch in 1..config.num_epochs + 1 {
        let mut epoch_loss = 0.0;
        let mut epoch_accuracy = 0.0;
        let mut epoch_batches = 0;

        // training loop
        for (iteration, batch) in dataloader_train.iter().enumerate() {
            let logits = model.forward_logits(batch.images);
            let loss = CrossEntropyLossConfig::new()
                .init(&logits.device())
                .forward(logits.clone(), batch.targets.clone());

            let batch_loss = loss.clone().into_scalar().elem::<f64>();
            let batch_accuracy = accuracy(logits, batch.targets);
            epoch_loss += batch_loss;
            epoch_accuracy += batch_accuracy;
            epoch_batches += 1;

            if (iteration + 1) % config.log_interval == 0 {
                println!(
                    "Epoch {}/{}, Batch {:0>4}/{}, Loss {:.4}, Acc {:0>6.2}",
                    epoch,
                    config.num_epochs,
                    iteration + 1,
                    num_batches,
                    batch_loss,
                    batch_accuracy * 100.0,
                );
            }

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(config.lr, model, grads);
        }

        // Display the averaged training metrics
        println!(
            "Epoch {}/{}, Avg Loss {:.4}, Avg Acc {:0>6.2}",
            epoch,
            config.num_epochs,
            epoch_loss / epoch_batches as f64,
            epoch_accuracy * 100.0 / epoch_batches as f64,
        );

        // Display the averaged test split metrics
        let (test_loss, test_accuracy) =
            evaluate(model.valid(), std::sync::Arc::clone(&dataloader_test));
        println!(
            "Epoch {}/{}, Avg Valid Loss {:.4}, Avg Valid Acc {:0>6.2}",
            epoch,
            config.num_epochs,
            test_loss,
            test_accuracy * 100.0,
        );
    }
    println!("Training finished.");

    // Save the trained model
    model
        .save_file(format!("{artifact_dir}/model"), &CompactRecorder::new())
        .expect("Trained model should be saved successfully");
    println!("Model saved in {artifact_dir}");
}

/// Mean per-batch loss and mean per-batch accuracy over a dataloader, without
/// gradient tracking.
pub fn evaluate<B: Backend>(model: Classifier<B>, dataloader: Dataloader<B>) -> (f64, f64) {
    let mut total_loss = 0.0;
    let mut total_accuracy = 0.0;
    let mut batches = 0;

    for batch in dataloader.iter() {
        let logits = model.forward_logits(batch.images);
        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), batch.targets.clone());
        total_loss += loss.into_scalar().elem::<f64>();
        total_accuracy += accuracy(logits, batch.targets);
        batches += 1;
    }

    (total_loss / batches as f64, total_accuracy / batches as f64)
}

/// Fraction of the batch whose predicted class (argmax of the scores row)
/// matches the target class.
fn accuracy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f64 {
    let [batch_size, _num_classes] = logits.dims();
    let predictions = logits.argmax(1).reshape([batch_size]);
    let num_correct = predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<f64>();
    num_correct / batch_size as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Element;
    use crate::data::{HEIGHT, MnistItem, NUM_CLASSES, WIDTH};
    use crate::{TestAutodiffBackend, TestBackend};
    use burn::data::dataloader::batcher::Batcher;
    use burn::data::dataset::InMemDataset;

    fn synthetic_item(index: usize) -> MnistItem {
        let image = (0..WIDTH * HEIGHT)
            .map(|pixel| ((pixel * 37 * (index + 1)) % 256) as Element)
            .collect();
        MnistItem {
            image,
            label: (index % NUM_CLASSES) as u8,
        }
    }

    fn valid_loss(
        model: &Classifier<TestAutodiffBackend>,
        batch: &MnistBatch<TestAutodiffBackend>,
    ) -> f64 {
        let logits = model.valid().forward_logits(batch.images.clone().inner());
        CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, batch.targets.clone().inner())
            .into_scalar()
            .elem::<f64>()
    }

    #[test]
    fn training_defaults_match_the_tutorial_setup() {
        let config = TrainingConfig::new(ClassifierConfig::new(), AdamConfig::new());
        assert_eq!(config.num_epochs, 3);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.lr, 1e-3);
        assert_eq!(config.model.dropout, 0.5);
        assert_eq!(config.model.negative_slope, 0.2);
    }

    #[test]
    fn training_config_round_trips_through_json() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let config = TrainingConfig::new(ClassifierConfig::new(), AdamConfig::new()).with_seed(7);
        config.save(&path).unwrap();

        let loaded = TrainingConfig::load(&path).unwrap();
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.batch_size, config.batch_size);
        assert_eq!(loaded.model.num_classes, config.model.num_classes);
    }

    #[test]
    fn batches_arrive_in_dataset_order() {
        // brightness tags each item with its index
        let items: Vec<_> = (0..62)
            .map(|index| MnistItem {
                image: vec![index as Element; WIDTH * HEIGHT],
                label: (index % NUM_CLASSES) as u8,
            })
            .collect();

        let dataloader: Dataloader<TestBackend> = DataLoaderBuilder::new(MnistBatcher::default())
            .batch_size(4)
            .build(InMemDataset::new(items));

        let mut visited = Vec::new();
        for batch in dataloader.iter() {
            let [batch_size, _, _] = batch.images.dims();
            // only the trailing batch may come up short
            assert!(batch_size == 4 || visited.len() + batch_size == 62);

            let pixels = batch.images.into_data().to_vec::<Element>().unwrap();
            for image in pixels.chunks(WIDTH * HEIGHT) {
                visited.push((image[0] * 255.0).round() as usize);
            }
        }

        assert_eq!(visited, (0..62).collect::<Vec<_>>());
    }

    #[test]
    fn accuracy_counts_argmax_matches() {
        let device = Default::default();
        // rows predict classes 1, 0, 2
        let logits = Tensor::<TestBackend, 2>::from_floats(
            [[0.1, 3.0, 0.2], [2.0, 0.5, 0.1], [0.0, 0.1, 0.9]],
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_data([1, 0, 0], &device);

        let result = accuracy(logits, targets);
        assert!((result - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn accuracy_handles_a_batch_of_one() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[0.1, 3.0, 0.2]], &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_data([1], &device);
        assert_eq!(accuracy(logits, targets), 1.0);
    }

    #[test]
    fn adam_steps_reduce_the_loss_on_a_fixed_batch() {
        let device = Default::default();
        TestAutodiffBackend::seed(7);

        let config = TrainingConfig::new(ClassifierConfig::new(), AdamConfig::new());
        let mut model: Classifier<TestAutodiffBackend> = config.model.init(&device);
        let mut optim = config
            .optimizer
            .init::<TestAutodiffBackend, Classifier<TestAutodiffBackend>>();

        let batcher = MnistBatcher::default();
        let items: Vec<_> = (0..8).map(synthetic_item).collect();
        let batch: MnistBatch<TestAutodiffBackend> = batcher.batch(items, &device);

        let initial_loss = valid_loss(&model, &batch);
        for _ in 0..30 {
            let logits = model.forward_logits(batch.images.clone());
            let loss = CrossEntropyLossConfig::new()
                .init(&logits.device())
                .forward(logits, batch.targets.clone());
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(1e-2, model, grads);
        }
        let final_loss = valid_loss(&model, &batch);

        assert!(
            final_loss < initial_loss,
            "loss went from {initial_loss} to {final_loss}"
        );
    }
}
