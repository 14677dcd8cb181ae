//! A small tree-structured Parzen estimator over categorical parameters.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Trials sampled uniformly before the estimator takes over.
pub const DEFAULT_STARTUP_TRIALS: usize = 3;
/// Fraction of observations treated as "good".
pub const DEFAULT_GAMMA: f64 = 0.25;

/// Suggests a choice index per named parameter, favouring choices that
/// appeared in high-scoring trials.
#[derive(Debug, Clone)]
pub struct TpeSampler {
    rng: StdRng,
    startup_trials: usize,
    gamma: f64,
    observations: HashMap<String, Vec<(usize, f64)>>,
}

impl TpeSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            startup_trials: DEFAULT_STARTUP_TRIALS,
            gamma: DEFAULT_GAMMA,
            observations: HashMap::new(),
        }
    }

    pub fn with_startup_trials(mut self, n: usize) -> Self {
        self.startup_trials = n;
        self
    }

    /// Pick one of `choices` options for `param`.
    pub fn suggest(&mut self, param: &str, choices: usize) -> usize {
        if choices <= 1 {
            return 0;
        }
        let history = self.observations.get(param).map(Vec::as_slice).unwrap_or(&[]);
        if history.len() < self.startup_trials {
            return self.rng.gen_range(0..choices);
        }

        let mut sorted = history.to_vec();
        sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        let n_good = ((sorted.len() as f64 * self.gamma).ceil() as usize).clamp(1, sorted.len());
        let (good, bad) = sorted.split_at(n_good);

        // l(x) / g(x) with add-one smoothing
        let density = |set: &[(usize, f64)], choice: usize| {
            let hits = set.iter().filter(|(c, _)| *c == choice).count();
            (hits + 1) as f64 / (set.len() + choices) as f64
        };
        let weights: Vec<f64> = (0..choices)
            .map(|c| density(good, c) / density(bad, c))
            .collect();

        match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => self.rng.gen_range(0..choices),
        }
    }

    pub fn observe(&mut self, param: &str, choice: usize, score: f64) {
        self.observations
            .entry(param.to_string())
            .or_default()
            .push((choice, score));
    }

    pub fn observations(&self, param: &str) -> usize {
        self.observations.get(param).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_suggestions() {
        let mut a = TpeSampler::new(42);
        let mut b = TpeSampler::new(42);
        let xs: Vec<usize> = (0..10).map(|_| a.suggest("p", 5)).collect();
        let ys: Vec<usize> = (0..10).map(|_| b.suggest("p", 5)).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().all(|x| *x < 5));
    }

    #[test]
    fn test_single_choice_is_fixed() {
        let mut s = TpeSampler::new(0);
        assert_eq!(s.suggest("p", 1), 0);
        assert_eq!(s.suggest("p", 0), 0);
    }

    #[test]
    fn test_favours_high_scoring_choice() {
        let mut s = TpeSampler::new(3).with_startup_trials(1);
        for _ in 0..4 {
            s.observe("demos", 2, 1.0);
        }
        for c in [0, 1, 3] {
            for _ in 0..4 {
                s.observe("demos", c, 0.0);
            }
        }
        let picks: Vec<usize> = (0..200).map(|_| s.suggest("demos", 4)).collect();
        let twos = picks.iter().filter(|c| **c == 2).count();
        assert!(twos > 100, "choice 2 picked {twos} times");
    }
}
