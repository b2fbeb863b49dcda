use anyhow::Context;
use mnist_trainer::{
    MnistData, Network, TrainingConfig,
    config::CONFIG_FILE,
    mnist::DIGIT_CLASSES,
    train::stop_after_no_improvement,
};
use ndarray_rand::rand::{SeedableRng, rngs::StdRng};
use std::ops::ControlFlow;
use tracing::info;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = TrainingConfig::from_file_or_default(CONFIG_FILE)
        .with_context(|| format!("reading {CONFIG_FILE}"))?;
    info!(?config, "starting");

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let MnistData {
        mut training_data,
        test_data,
    } = MnistData::load(&config.data_dir)
        .with_context(|| format!("loading MNIST from {}", config.data_dir.display()))?;

    let input_size = training_data[0].input.len();
    let mut network = Network::new(config.topology(input_size, DIGIT_CLASSES), &mut rng)?;

    network.train(
        &mut training_data,
        &test_data,
        &config.training_options(),
        &mut rng,
        |report, history| {
            println!("{report}");
            match config.patience {
                Some(patience) => stop_after_no_improvement(patience, history),
                None => ControlFlow::Continue(()),
            }
        },
    )?;

    println!("Done training");
    Ok(())
}
