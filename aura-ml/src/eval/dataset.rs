//! The built-in gold dataset.
//!
//! Twelve research goals with short reference insights, covering ML, systems,
//! the natural sciences and mathematics. `research_goal` is the only input.

use aura_core::example::Example;

pub const GOAL_FIELD: &str = "research_goal";
pub const REFERENCE_FIELD: &str = "reference_insight";

/// Share of examples assigned to the training split.
pub const TRAIN_FRACTION: f64 = 0.7;

const GOLD: [(&str, &str); 12] = [
    (
        "What are the key limitations of Federated Learning in medical imaging?",
        "Federated Learning in medical imaging faces challenges including statistical heterogeneity...",
    ),
    (
        "How does the attention mechanism work in transformer architectures?",
        "The attention mechanism computes weighted sums of value vectors...",
    ),
    (
        "What are the main differences between GPT and BERT language models?",
        "GPT is autoregressive...",
    ),
    (
        "Explain knowledge distillation.",
        "Transferring knowledge from teacher to student...",
    ),
    ("Pros/Cons of RLHF?", "Aligned with preference but expensive..."),
    (
        "CAP Theorem implications?",
        "Consistency, Availability, Partition Tolerance trade-offs...",
    ),
    (
        "Kubernetes service discovery?",
        "ClusterIP, DNS, Environment variables...",
    ),
    (
        "Microservices security risks?",
        "Attack surface, auth complexities...",
    ),
    (
        "CRISPR-Cas9 mechanism?",
        "Bacterial immune system, sgRNA guiding Cas9...",
    ),
    (
        "mRNA vaccine mechanism?",
        "Lipid nanoparticles, translation of spike protein...",
    ),
    (
        "Quantum entanglement?",
        "Correlated particles affecting each other...",
    ),
    (
        "Riemann Hypothesis significance?",
        "Distribution of primes, Millennium Problem...",
    ),
];

/// All gold examples in their fixed order.
pub fn gold_examples() -> Vec<Example> {
    GOLD.iter()
        .map(|(goal, reference)| {
            Example::new()
                .with(GOAL_FIELD, *goal)
                .with(REFERENCE_FIELD, *reference)
                .with_inputs(&[GOAL_FIELD])
        })
        .collect()
}

/// Split in order: the first `floor(fraction * n)` examples train, the rest dev.
pub fn split(examples: Vec<Example>, fraction: f64) -> (Vec<Example>, Vec<Example>) {
    let cut = ((examples.len() as f64) * fraction.clamp(0.0, 1.0)).floor() as usize;
    let mut train = examples;
    let dev = train.split_off(cut.min(train.len()));
    (train, dev)
}

/// `(trainset, devset)` of the gold data, 8 and 4 examples.
pub fn gold_dataset() -> (Vec<Example>, Vec<Example>) {
    split(gold_examples(), TRAIN_FRACTION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gold_split_sizes() {
        let (train, dev) = gold_dataset();
        assert_eq!(train.len(), 8);
        assert_eq!(dev.len(), 4);
        assert_eq!(train[3].get(GOAL_FIELD), Some("Explain knowledge distillation."));
        assert_eq!(dev[0].get(GOAL_FIELD), Some("CRISPR-Cas9 mechanism?"));
    }

    #[test]
    fn test_inputs_marked() {
        for ex in gold_examples() {
            assert!(ex.is_input(GOAL_FIELD));
            assert!(!ex.is_input(REFERENCE_FIELD));
        }
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let (train, dev) = gold_dataset();
        assert!(train.iter().all(|t| !dev.contains(t)));
        assert_eq!(train.len() + dev.len(), gold_examples().len());
    }

    #[test]
    fn test_split_edges() {
        let (train, dev) = split(gold_examples(), 0.0);
        assert!(train.is_empty());
        assert_eq!(dev.len(), 12);
        let (train, dev) = split(Vec::new(), TRAIN_FRACTION);
        assert!(train.is_empty() && dev.is_empty());
    }
}
