use burn::optim::AdamConfig;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use mnist_classifier::backend::{MainAutoBackend, MainBackend, MainDevice};
use mnist_classifier::cli::{AppArgs, HELP};
use mnist_classifier::model::ClassifierConfig;
use mnist_classifier::training::TrainingConfig;
use mnist_classifier::{inference, training};

pub fn launch<B, AutoB>(app_args: &AppArgs)
where
    B: Backend + MainDevice,
    AutoB: AutodiffBackend + MainDevice,
{
    let artifact_dir = app_args
        .artifacts_path
        .to_str()
        .expect("Artifacts path should be valid UTF-8");

    if app_args.training {
        let mut config = TrainingConfig::new(ClassifierConfig::new(), AdamConfig::new());
        if let Some(num_epochs) = app_args.num_epochs {
            config = config.with_num_epochs(num_epochs);
        }
        if let Some(batch_size) = app_args.batch_size {
            config = config.with_batch_size(batch_size);
        }
        if let Some(lr) = app_args.lr {
            config = config.with_lr(lr);
        }
        if let Some(seed) = app_args.seed {
            config = config.with_seed(seed);
        }
        training::train::<AutoB>(artifact_dir, config, AutoB::main_device());
    }

    if app_args.inference {
        inference::infer::<B>(
            artifact_dir,
            B::main_device(),
            app_args.image_file.as_deref(),
            app_args.test_index,
        );
    }

    if !app_args.inference && !app_args.training {
        println!("neither training nor inference were enabled");
        println!("{}", HELP);
    }
}

fn main() {
    let app_args = AppArgs::parse().unwrap();
    launch::<MainBackend, MainAutoBackend>(&app_args);
}
