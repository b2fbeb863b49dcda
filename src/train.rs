//! The epoch loop: shuffle, split into mini-batches, update, evaluate, report.

use crate::{
    error::{Error, Result},
    network::Network,
    pattern::Pattern,
};
use ndarray_rand::rand::{Rng, seq::SliceRandom};
use serde::Deserialize;
use std::{fmt, ops::ControlFlow};
use tracing::{debug, info};

/// Which quality measure is evaluated on the test set after every epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Fraction of correctly classified patterns, in `[0, 1]`. Higher is better.
    #[default]
    Accuracy,
    /// Mean half squared error, `Σ ||a - y||² / (2n)`. Lower is better.
    Cost,
}

impl Metric {
    pub fn evaluate(self, network: &Network, patterns: &[Pattern]) -> Result<f64> {
        match self {
            Metric::Accuracy => network.accuracy(patterns),
            Metric::Cost => network.cost(patterns),
        }
    }

    /// Whether `value` beats `best` for this metric.
    pub fn improved(self, best: f64, value: f64) -> bool {
        match self {
            Metric::Accuracy => value > best,
            Metric::Cost => value < best,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Accuracy => write!(f, "accuracy"),
            Metric::Cost => write!(f, "cost"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOptions {
    pub epochs: usize,
    pub mini_batch_size: usize,
    pub learning_rate: f64,
    pub metric: Metric,
}

impl TrainingOptions {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be at least 1".into()));
        }
        if self.mini_batch_size == 0 {
            return Err(Error::InvalidConfig("mini-batch size must be at least 1".into()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// The result of one completed epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub metric: Metric,
    pub value: f64,
}

impl fmt::Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.metric {
            Metric::Accuracy => write!(f, "Epoch {}: accuracy {:.4}", self.epoch, self.value),
            Metric::Cost => write!(f, "Epoch {}: cost {:.6}", self.epoch, self.value),
        }
    }
}

/// Early stopping on a plateau: breaks once the newest `patience` reports have not improved on
/// the best value seen before them.
pub fn stop_after_no_improvement(patience: usize, history: &[EpochReport]) -> ControlFlow<()> {
    if patience == 0 || history.len() <= patience {
        return ControlFlow::Continue(());
    }
    let (earlier, recent) = history.split_at(history.len() - patience);
    let metric = recent[0].metric;
    let best = earlier
        .iter()
        .map(|report| report.value)
        .reduce(|best, value| if metric.improved(best, value) { value } else { best });

    match best {
        Some(best) if !recent.iter().any(|report| metric.improved(best, report.value)) => {
            ControlFlow::Break(())
        }
        _ => ControlFlow::Continue(()),
    }
}

impl Network {
    /// Trains for `options.epochs` epochs and returns one report per epoch.
    pub fn train_epochs<R: Rng + ?Sized>(
        &mut self,
        training_data: &mut [Pattern],
        test_data: &[Pattern],
        options: &TrainingOptions,
        rng: &mut R,
    ) -> Result<Vec<EpochReport>> {
        self.train(training_data, test_data, options, rng, |_, _| {
            ControlFlow::Continue(())
        })
    }

    /// Trains the network with mini-batch stochastic gradient descent.
    ///
    /// Each epoch the training data is shuffled in place and cut into consecutive batches of
    /// `options.mini_batch_size` (the last one may be shorter). Every batch updates the network
    /// once. Then the network is scored on `test_data` with `options.metric`.
    ///
    /// `on_epoch` is called exactly once per completed epoch with that epoch's report and all
    /// reports so far (including it). Returning `ControlFlow::Break` ends training after that
    /// epoch. The collected reports are returned either way.
    pub fn train<R, F>(
        &mut self,
        training_data: &mut [Pattern],
        test_data: &[Pattern],
        options: &TrainingOptions,
        rng: &mut R,
        mut on_epoch: F,
    ) -> Result<Vec<EpochReport>>
    where
        R: Rng + ?Sized,
        F: FnMut(&EpochReport, &[EpochReport]) -> ControlFlow<()>,
    {
        options.validate()?;
        if training_data.is_empty() {
            return Err(Error::EmptyDataset("no training patterns".into()));
        }
        if test_data.is_empty() {
            return Err(Error::EmptyDataset("no test patterns".into()));
        }
        // Catch a mismatched dataset before any parameter has been touched.
        for pattern in training_data.iter().chain(test_data) {
            Error::check_len("pattern input", self.input_size(), pattern.input.len())?;
            Error::check_len("pattern target", self.output_size(), pattern.target.len())?;
        }

        let mut reports = Vec::with_capacity(options.epochs);
        for epoch in 0..options.epochs {
            debug!(epoch, "shuffling training data");
            training_data.shuffle(rng);

            // Train on the training data.
            for mini_batch in training_data.chunks(options.mini_batch_size) {
                self.update_mini_batch(mini_batch, options.learning_rate)?;
            }

            // Use the test data to score the epoch.
            let value = options.metric.evaluate(self, test_data)?;
            let report = EpochReport {
                epoch,
                metric: options.metric,
                value,
            };
            info!(epoch, metric = %options.metric, value, "epoch complete");
            reports.push(report);

            if on_epoch(&report, &reports).is_break() {
                info!(epoch, "stopping early");
                break;
            }
        }

        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand::{SeedableRng, rngs::StdRng};
    use std::collections::HashMap;

    fn options(epochs: usize, mini_batch_size: usize) -> TrainingOptions {
        TrainingOptions {
            epochs,
            mini_batch_size,
            learning_rate: 1.5,
            metric: Metric::Cost,
        }
    }

    fn patterns() -> Vec<Pattern> {
        vec![
            Pattern::new(array![0.1, 0.9], array![1.0, 0.0]),
            Pattern::new(array![0.8, 0.3], array![0.0, 1.0]),
            Pattern::new(array![0.6, 0.6], array![1.0, 0.0]),
        ]
    }

    fn report(epoch: usize, value: f64) -> EpochReport {
        EpochReport {
            epoch,
            metric: Metric::Cost,
            value,
        }
    }

    #[test]
    fn shuffle_preserves_elements() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut items: Vec<u32> = (0..1000).collect();

        items.shuffle(&mut rng);

        assert_ne!(items, (0..1000).collect::<Vec<_>>());
        items.sort_unstable();
        assert_eq!(items, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn shuffle_is_roughly_uniform() {
        let mut rng = StdRng::seed_from_u64(11);
        let trials = 60_000;
        let mut counts: HashMap<[u8; 3], usize> = HashMap::new();
        for _ in 0..trials {
            let mut items = [0, 1, 2];
            items.shuffle(&mut rng);
            *counts.entry(items).or_default() += 1;
        }

        // Chi-squared with 5 degrees of freedom; 20.5 is the 0.001 critical value.
        assert_eq!(counts.len(), 6);
        let expected = trials as f64 / 6.0;
        let chi_squared: f64 = counts
            .values()
            .map(|&observed| (observed as f64 - expected).powi(2) / expected)
            .sum();
        assert!(chi_squared < 20.5, "chi squared {chi_squared}");
    }

    #[test]
    fn shuffle_handles_tiny_slices() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut empty: [u8; 0] = [];
        empty.shuffle(&mut rng);
        let mut single = [7];
        single.shuffle(&mut rng);
        assert_eq!(single, [7]);
    }

    #[test]
    fn partial_final_batch_is_averaged_over_its_own_length() {
        let mut rng = StdRng::seed_from_u64(5);
        let network = Network::new(vec![2, 3, 2], &mut rng).unwrap();
        let mut training_data = patterns();
        let test_data = patterns();

        // A batch size of 4 over 3 patterns yields a single batch of 3.
        let mut trained = network.clone();
        trained
            .train_epochs(&mut training_data, &test_data, &options(1, 4), &mut rng)
            .unwrap();

        let mut by_three = network.clone();
        by_three.update_mini_batch(&patterns(), 1.5).unwrap();
        // The same step divided by 4 instead of 3 is what an under-weighted update would give.
        let mut by_four = network.clone();
        by_four.update_mini_batch(&patterns(), 1.5 * 3.0 / 4.0).unwrap();

        for ((t, three), four) in trained
            .layers()
            .iter()
            .zip(by_three.layers())
            .zip(by_four.layers())
        {
            for ((&x, &y), &z) in t
                .weights()
                .iter()
                .zip(three.weights().iter())
                .zip(four.weights().iter())
            {
                assert_abs_diff_eq!(x, y, epsilon = 1e-12);
                assert!((x - z).abs() > 1e-9);
            }
        }
    }

    #[test]
    fn emits_exactly_one_report_per_epoch() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut network = Network::new(vec![2, 3, 2], &mut rng).unwrap();
        let mut training_data = patterns();

        let mut seen = Vec::new();
        let reports = network
            .train(&mut training_data, &patterns(), &options(4, 2), &mut rng, |report, history| {
                assert_eq!(history.last(), Some(report));
                seen.push(report.epoch);
                ControlFlow::Continue(())
            })
            .unwrap();

        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(|r| r.metric == Metric::Cost && r.value >= 0.0));
    }

    #[test]
    fn callback_can_stop_training_early() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut network = Network::new(vec![2, 3, 2], &mut rng).unwrap();
        let mut training_data = patterns();

        let reports = network
            .train(&mut training_data, &patterns(), &options(10, 2), &mut rng, |_, history| {
                if history.len() == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[2].epoch, 2);
    }

    #[test]
    fn refuses_to_train_on_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut network = Network::new(vec![2, 3, 2], &mut rng).unwrap();
        let before = network.clone();

        let result = network.train_epochs(&mut [], &patterns(), &options(1, 2), &mut rng);
        assert!(matches!(result, Err(Error::EmptyDataset(_))));
        let result = network.train_epochs(&mut patterns(), &[], &options(1, 2), &mut rng);
        assert!(matches!(result, Err(Error::EmptyDataset(_))));
        assert_eq!(network, before);
    }

    #[test]
    fn refuses_mismatched_patterns_before_updating() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut network = Network::new(vec![2, 3, 2], &mut rng).unwrap();
        let before = network.clone();
        let mut training_data = patterns();
        training_data.push(Pattern::new(array![0.5, 0.5, 0.5], array![1.0, 0.0]));

        let result = network.train_epochs(&mut training_data, &patterns(), &options(1, 1), &mut rng);
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
        assert_eq!(network, before);
    }

    #[test]
    fn options_validation() {
        assert!(options(1, 1).validate().is_ok());
        assert!(options(0, 1).validate().is_err());
        assert!(options(1, 0).validate().is_err());
        let mut bad_rate = options(1, 1);
        bad_rate.learning_rate = f64::NAN;
        assert!(bad_rate.validate().is_err());
        bad_rate.learning_rate = -0.1;
        assert!(matches!(bad_rate.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn metric_direction() {
        assert!(Metric::Accuracy.improved(0.5, 0.6));
        assert!(!Metric::Accuracy.improved(0.6, 0.6));
        assert!(Metric::Cost.improved(0.5, 0.4));
        assert!(!Metric::Cost.improved(0.4, 0.5));
    }

    #[test]
    fn plateau_stops_after_patience_epochs() {
        let improving = [report(0, 0.5), report(1, 0.4), report(2, 0.3)];
        assert_eq!(
            stop_after_no_improvement(2, &improving),
            ControlFlow::Continue(())
        );

        let stalled = [report(0, 0.5), report(1, 0.3), report(2, 0.35), report(3, 0.31)];
        assert_eq!(stop_after_no_improvement(2, &stalled), ControlFlow::Break(()));
        assert_eq!(stop_after_no_improvement(3, &stalled), ControlFlow::Continue(()));
        assert_eq!(stop_after_no_improvement(0, &stalled), ControlFlow::Continue(()));
    }

    #[test]
    fn report_display() {
        assert_eq!(report(3, 0.125).to_string(), "Epoch 3: cost 0.125000");
        let accuracy = EpochReport {
            epoch: 0,
            metric: Metric::Accuracy,
            value: 0.9,
        };
        assert_eq!(accuracy.to_string(), "Epoch 0: accuracy 0.9000");
    }
}
