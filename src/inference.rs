use crate::backend::Element;
use crate::data::{HEIGHT, MnistDataset, NUM_CLASSES, WIDTH};
use crate::model::Classifier;
use crate::training::TrainingConfig;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use burn::record::{CompactRecorder, Recorder};
use num_traits::AsPrimitive;
use std::path::Path;

/// Human-readable class labels, indexed by class id.
pub const LABELS: [&str; NUM_CLASSES] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

/// A trained classifier bound to a device, classifying raw 8-bit images.
///
/// Prediction runs without gradient tracking, so dropout is inert and
/// identical inputs give identical outputs.
pub struct Predictor<B: Backend> {
    model: Classifier<B>,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(model: Classifier<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    /// Load the trained model from the artifacts directory.
    pub fn load(artifact_dir: &str, device: &B::Device) -> Self {
        let config = TrainingConfig::load(format!("{artifact_dir}/config.json"))
            .expect("Config should exist for the model; run train first");
        let record = CompactRecorder::new()
            .load(format!("{artifact_dir}/model").into(), device)
            .expect("Trained model should exist; run train first");

        let model = config.model.init(device).load_record(record);
        Self {
            model,
            device: device.clone(),
        }
    }

    /// Classify a batch of raw 8-bit grayscale images, returning one label
    /// per image. This is the in-process entry point for callers that serve
    /// predictions.
    ///
    /// Each image is `WIDTH * HEIGHT` bytes, row-major, one byte per pixel.
    pub fn predict(&self, images: &[Vec<u8>]) -> Vec<&'static str> {
        let probabilities = self.probabilities(self.tensor_from_bytes(images));
        let [batch_size, _num_classes] = probabilities.dims();

        probabilities
            .argmax(1)
            .reshape([batch_size])
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .expect("Predicted classes should convert to a vector")
            .into_iter()
            .map(|class| LABELS[class as usize])
            .collect()
    }

    /// Classify a single raw 8-bit grayscale image.
    pub fn predict_one(&self, image: &[u8]) -> &'static str {
        self.predict(&[image.to_vec()])[0]
    }

    /// Class probabilities for a batch of images already on the device.
    ///
    /// # Shapes
    ///
    /// - images: `[batch_size, HEIGHT, WIDTH]`
    /// - output: `[batch_size, NUM_CLASSES]`
    pub fn probabilities(&self, images: Tensor<B, 3>) -> Tensor<B, 2> {
        self.model.forward(images)
    }

    fn tensor_from_bytes(&self, images: &[Vec<u8>]) -> Tensor<B, 3> {
        let images = images
            .iter()
            .map(|image| {
                assert_eq!(image.len(), WIDTH * HEIGHT);
                let pixels: Vec<Element> = image
                    .iter()
                    .map(|brightness| {
                        let element: Element = (*brightness).as_();
                        element
                    })
                    .collect();
                TensorData::new(pixels, [1, HEIGHT, WIDTH]).convert::<B::FloatElem>()
            })
            .map(|data| Tensor::<B, 3>::from_data(data, &self.device))
            // Normalize: scale between [0,1]
            .map(|tensor| tensor / 255)
            .collect();
        Tensor::cat(images, 0)
    }
}

/// Classify one image with a previously trained model and print the result.
///
/// The image is either a raw file (`WIDTH * HEIGHT` bytes, one byte per
/// pixel) or an item of the MNIST test split.
pub fn infer<B: Backend>(
    artifact_dir: &str,
    device: B::Device,
    image_file: Option<&Path>,
    test_index: usize,
) {
    let predictor = Predictor::<B>::load(artifact_dir, &device);

    let (image, expected) = match image_file {
        Some(path) => {
            let image = std::fs::read(path).expect("Image file should be readable");
            assert_eq!(
                image.len(),
                WIDTH * HEIGHT,
                "expected a raw {WIDTH}x{HEIGHT} grayscale image, one byte per pixel"
            );
            (image, None)
        }
        None => {
            let item = MnistDataset::test()
                .get(test_index)
                .expect("Test index should be within the test split");
            let image = item
                .image
                .iter()
                .map(|brightness| *brightness as u8)
                .collect::<Vec<u8>>();
            (image, Some(item.label))
        }
    };

    let probabilities = predictor.probabilities(predictor.tensor_from_bytes(
        std::slice::from_ref(&image),
    ));
    let class = probabilities
        .clone()
        .argmax(1)
        .reshape([1])
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .expect("Predicted class should convert to a vector")[0] as usize;
    let probabilities = probabilities
        .into_data()
        .convert::<Element>()
        .to_vec::<Element>()
        .expect("Probabilities should convert to a vector");

    // Display the predicted distribution and the label
    println!("probabilities:");
    for (label, probability) in LABELS.iter().zip(&probabilities) {
        println!("- {label}: {probability:.4}");
    }
    match expected {
        Some(expected) => println!(
            "predicted/expected: {}/{}",
            LABELS[class], LABELS[expected as usize]
        ),
        None => println!("predicted: {}", LABELS[class]),
    }
}
