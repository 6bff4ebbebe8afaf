use std::path::PathBuf;

pub const HELP: &str = "\
MNIST Classifier

A command-line tool for training a small convolutional digit classifier and
running inference with it. The training config and the trained model weights
are persisted in an artifacts directory.

USAGE:
    mnist-classifier [OPTIONS]

When no --training or --inference flag is provided, this help text is printed.

BEHAVIOR OVERVIEW
- Training downloads the MNIST dataset on first use (cached under ~/.cache),
  trains for a fixed number of epochs and saves the config and model weights
  into the artifacts directory.
- Inference loads the config and model weights from the artifacts directory,
  so it requires a prior training run with the same --artifacts-path.
- If both --training and --inference are specified, training executes first,
  followed by inference using the trained model.

FLAGS:
    -h, --help                  Show this help message and exit
    -t, --training              Run training
    -i, --inference             Run inference

OPTIONS:
    -a, --artifacts-path <PATH>
                                Directory where the config and model weights are saved
                                and loaded. Defaults to a newly created temporary
                                directory (path will be printed).
        --num-epochs <N>        Override the number of training epochs
        --batch-size <N>        Override the training batch size
        --lr <LR>               Override the learning rate
        --seed <N>              Override the RNG seed
        --image-file <PATH>     Classify a raw 28x28 grayscale image file
                                (784 bytes, one byte per pixel) instead of a
                                test split item
        --test-index <N>        Classify this item of the MNIST test split
                                (default: 0)
";

#[derive(Debug)]
pub struct AppArgs {
    pub training: bool,
    pub inference: bool,
    pub artifacts_path: PathBuf,
    pub num_epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub lr: Option<f64>,
    pub seed: Option<u64>,
    pub image_file: Option<PathBuf>,
    pub test_index: usize,
}

impl AppArgs {
    pub fn parse() -> Result<Self, pico_args::Error> {
        let mut pargs = pico_args::Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            println!("{}", HELP);
            std::process::exit(0);
        }

        let args = AppArgs {
            num_epochs: pargs.opt_value_from_str("--num-epochs")?,
            batch_size: pargs.opt_value_from_str("--batch-size")?,
            lr: pargs.opt_value_from_str("--lr")?,
            seed: pargs.opt_value_from_str("--seed")?,
            test_index: pargs.opt_value_from_str("--test-index")?.unwrap_or(0),
            image_file: pargs.opt_value_from_os_str("--image-file", parse_path)?,
            artifacts_path: pargs
                .opt_value_from_os_str(["-a", "--artifacts-path"], parse_path)?
                .unwrap_or_else(|| {
                    // e.g. /tmp/mnist-classifier-abcd-0
                    let name = format!("{}-", std::env!("CARGO_PKG_NAME"));
                    let tmp = temp_dir::TempDir::with_prefix(name)
                        .expect("Failed to create the temporary directory")
                        .dont_delete_on_drop();
                    let path = tmp.path();
                    println!("new artifacts directory: {path:?}");
                    path.into()
                }),
            // must parse flags after values
            training: pargs.contains(["-t", "--training"]),
            inference: pargs.contains(["-i", "--inference"]),
        };

        // It's up to the caller what to do with the remaining arguments.
        let remaining = pargs.finish();
        if !remaining.is_empty() {
            panic!("unused arguments: {remaining:?}");
        }

        Ok(args)
    }
}

fn parse_path(s: &std::ffi::OsStr) -> Result<PathBuf, &'static str> {
    Ok(s.into())
}
