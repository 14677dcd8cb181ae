//! Generate-and-compare synthesis.
//!
//! The reflector samples `n` candidate syntheses, then asks a comparator step
//! to pick the best attempt and write the final insight. It plugs into
//! [`AuraArchitect`](super::AuraArchitect) as a [`SynthesisStrategy`].

use super::synthesis::SynthesisStrategy;
use crate::adapter::REASONING_PLACEHOLDER;
use crate::error::{Result, ValidationError};
use crate::example::FieldMap;
use crate::predict::{Predictor, StepExecutor, fields};
use crate::prediction::SynthesisPrediction;
use crate::signature::{COMPARE_CANDIDATES, RESEARCH_SYNTHESIZER};
use crate::trace::Trace;
use crate::types::{Passage, format_passages};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, warn};

static ATTEMPT_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("attempt regex is valid"));

/// Replies that report equally good attempts: tie words or a list of numbers.
static TIE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:tie|tied|equal|equally|same|both|indistinguishable)\b|\d+\s*(?:,|&|\band\b|\bor\b)\s*(?:attempts?\s*)?#?\s*\d+",
    )
    .expect("tie regex is valid")
});

pub const DEFAULT_CANDIDATES: usize = 3;

#[derive(Debug, Clone)]
pub struct AuraReflector {
    n: usize,
    generate: Predictor,
    compare: Predictor,
}

impl AuraReflector {
    /// Reflector sampling `n` candidates; `n` must be at least 1.
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(ValidationError::InvalidValue {
                field: "candidates".to_string(),
                reason: "the reflector needs at least one candidate".to_string(),
            }
            .into());
        }
        Ok(Self {
            n,
            generate: Predictor::chain_of_thought("reflector.generate", &RESEARCH_SYNTHESIZER),
            compare: Predictor::chain_of_thought("reflector.compare", &COMPARE_CANDIDATES),
        })
    }

    pub fn candidates(&self) -> usize {
        self.n
    }

    /// Run generation and comparison over already retrieved context.
    pub async fn forward(
        &self,
        executor: &StepExecutor,
        context: &[Passage],
        research_goal: &str,
        trace: Option<&Trace>,
    ) -> Result<SynthesisPrediction> {
        let context_text = format_passages(context);
        let inputs = fields([
            ("context", context_text.clone()),
            ("research_goal", research_goal.to_string()),
        ]);

        let candidates = executor
            .execute(&self.generate, &inputs, self.n, trace)
            .await?;

        if candidates.len() == 1 {
            return Ok(candidate_prediction(&candidates[0]));
        }

        let compare_inputs = fields([
            ("context", context_text),
            ("research_goal", research_goal.to_string()),
            ("attempts", render_attempts(&candidates)),
        ]);
        let mut verdict = executor.call(&self.compare, &compare_inputs, trace).await?;

        let raw_choice = verdict.remove("best_attempt").unwrap_or_default();
        let chosen = select_attempt(&raw_choice, candidates.len());
        info!(chosen = chosen + 1, of = candidates.len(), "Comparator selected attempt");

        let chosen_candidate = candidate_prediction(&candidates[chosen]);
        let insight = verdict
            .remove("structured_insight")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| {
                warn!("Comparator returned no insight; using the selected candidate's");
                chosen_candidate.structured_insight.clone()
            });
        let rationale = verdict
            .remove("reasoning")
            .filter(|r| r != REASONING_PLACEHOLDER)
            .unwrap_or(chosen_candidate.rationale);

        Ok(SynthesisPrediction {
            rationale,
            structured_insight: insight,
        })
    }
}

fn candidate_prediction(record: &FieldMap) -> SynthesisPrediction {
    SynthesisPrediction {
        rationale: record
            .get("reasoning")
            .cloned()
            .unwrap_or_else(|| REASONING_PLACEHOLDER.to_string()),
        structured_insight: record.get("structured_insight").cloned().unwrap_or_default(),
    }
}

/// Numbered attempts block for the comparator, 1-based.
pub fn render_attempts(candidates: &[FieldMap]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "Attempt #{}:\nReasoning: {}\nInsight: {}",
                i + 1,
                c.get("reasoning").map(String::as_str).unwrap_or(REASONING_PLACEHOLDER),
                c.get("structured_insight").map(String::as_str).unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Zero-based index of the chosen attempt.
///
/// The first number within `1..=count` is the comparator's choice. When the
/// reply reports a tie between several attempts the lowest of them wins.
/// Falls back to the first attempt when no number is valid.
pub fn select_attempt(raw: &str, count: usize) -> usize {
    let named: Vec<usize> = ATTEMPT_NUMBER_RE
        .find_iter(raw)
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .filter(|n| (1..=count).contains(n))
        .collect();
    let chosen = if TIE_RE.is_match(raw) {
        named.iter().min().copied()
    } else {
        named.first().copied()
    };
    match chosen {
        Some(n) => n - 1,
        None => {
            warn!(reply = raw, count, "Comparator named no valid attempt; using the first");
            0
        }
    }
}

#[async_trait]
impl SynthesisStrategy for AuraReflector {
    fn name(&self) -> &'static str {
        "reflector"
    }

    async fn synthesize(
        &self,
        executor: &StepExecutor,
        context: &[Passage],
        research_goal: &str,
        trace: Option<&Trace>,
    ) -> Result<SynthesisPrediction> {
        self.forward(executor, context, research_goal, trace).await
    }

    fn predictors(&self) -> Vec<&Predictor> {
        vec![&self.generate, &self.compare]
    }

    fn predictors_mut(&mut self) -> Vec<&mut Predictor> {
        vec![&mut self.generate, &mut self.compare]
    }

    fn clone_box(&self) -> Box<dyn SynthesisStrategy> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{format_reply, input_value, signature_of};
    use crate::brain::{Brain, MockLlmProvider};
    use crate::signature::SignatureId;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_select_attempt_tie_break() {
        assert_eq!(select_attempt("2", 3), 1);
        assert_eq!(select_attempt("Attempts 3 and 2 are equally good", 3), 1);
        assert_eq!(select_attempt("1 and 3", 3), 0);
        assert_eq!(select_attempt("3, 2", 3), 1);
        assert_eq!(select_attempt("It's a tie between #3 and #2", 3), 1);
        assert_eq!(select_attempt("Attempt #7", 3), 0);
        assert_eq!(select_attempt("none stood out", 3), 0);
        assert_eq!(select_attempt("0", 3), 0);
    }

    #[test]
    fn test_select_attempt_keeps_model_choice() {
        assert_eq!(select_attempt("Attempt 3 is clearly better than attempt 1", 3), 2);
        assert_eq!(select_attempt("Attempt #2, since attempt 1 lacks citations", 3), 1);
        assert_eq!(select_attempt("Attempt 9 or rather attempt 3", 3), 2);
    }

    #[test]
    fn test_render_attempts_numbering() {
        let c = vec![
            fields([("reasoning", "r1"), ("structured_insight", "i1")]),
            fields([("structured_insight", "i2")]),
        ];
        let text = render_attempts(&c);
        assert!(text.starts_with("Attempt #1:\nReasoning: r1\nInsight: i1"));
        assert!(text.contains("Attempt #2:\nReasoning: No reasoning generated\nInsight: i2"));
    }

    fn reflector_provider(verdict: &'static str, final_insight: &'static str) -> MockLlmProvider {
        let counter = Arc::new(AtomicUsize::new(0));
        MockLlmProvider::with_responder(move |req| {
            Ok(match signature_of(req) {
                Some(SignatureId::ResearchSynthesizer) => {
                    let i = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    format_reply(&[
                        ("reasoning", &format!("reasoning {i}")),
                        ("structured_insight", &format!("insight {i}")),
                    ])
                }
                Some(SignatureId::CompareCandidates) => {
                    let attempts = input_value(req, "attempts").unwrap_or_default();
                    assert!(attempts.contains("Attempt #3"));
                    format_reply(&[
                        ("reasoning", "Attempt 2 cites more sources."),
                        ("best_attempt", verdict),
                        ("structured_insight", final_insight),
                    ])
                }
                _ => String::new(),
            })
        })
    }

    fn executor(provider: MockLlmProvider) -> StepExecutor {
        StepExecutor::new(Brain::new(Arc::new(provider)))
    }

    #[tokio::test]
    async fn test_comparator_insight_wins() {
        let exec = executor(reflector_provider("2", "merged insight"));
        let reflector = AuraReflector::new(3).unwrap();
        let out = reflector
            .forward(&exec, &[Passage::new("T", "body")], "goal", None)
            .await
            .unwrap();
        assert_eq!(out.structured_insight, "merged insight");
        assert_eq!(out.rationale, "Attempt 2 cites more sources.");
        assert_eq!(exec.brain().call_count(), 4);
    }

    #[tokio::test]
    async fn test_empty_comparator_insight_falls_back_to_choice() {
        let exec = executor(reflector_provider("Attempt 2", ""));
        let reflector = AuraReflector::new(3).unwrap();
        let out = reflector.forward(&exec, &[], "goal", None).await.unwrap();
        assert_eq!(out.structured_insight, "insight 2");
    }

    #[tokio::test]
    async fn test_single_candidate_skips_comparison() {
        let exec = executor(reflector_provider("1", "unused"));
        let reflector = AuraReflector::new(1).unwrap();
        let out = reflector.forward(&exec, &[], "goal", None).await.unwrap();
        assert_eq!(out.structured_insight, "insight 1");
        assert_eq!(exec.brain().call_count(), 1);
    }

    #[test]
    fn test_zero_candidates_rejected() {
        assert!(AuraReflector::new(0).is_err());
    }
}
