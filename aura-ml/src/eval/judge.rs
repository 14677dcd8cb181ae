//! LLM-as-judge scoring of research insights.

use aura_core::error::Result;
use aura_core::predict::{Predictor, StepExecutor, fields};
use aura_core::signature::ASSESS_RESEARCH_QUALITY;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d*\.?\d+").expect("score regex is valid"));

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 5.0;

/// Score assumed when the judge's reply carries no number.
pub const DEFAULT_SCORE: f64 = 3.0;

/// First numeric token of `raw`, clamped to `[1, 5]`; [`DEFAULT_SCORE`] when none parses.
pub fn parse_score(raw: &str) -> f64 {
    SCORE_RE
        .find(raw)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|score| score.clamp(MIN_SCORE, MAX_SCORE))
        .unwrap_or(DEFAULT_SCORE)
}

/// One judgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub score: f64,
    pub reasoning: String,
    /// The judge's score text before parsing.
    pub raw_score: String,
}

/// Chain-of-thought `AssessResearchQuality` judge.
#[derive(Debug, Clone)]
pub struct ResearchQualityJudge {
    executor: StepExecutor,
    assess: Predictor,
}

impl ResearchQualityJudge {
    pub fn new(executor: StepExecutor) -> Self {
        Self {
            executor,
            assess: Predictor::chain_of_thought("assess", &ASSESS_RESEARCH_QUALITY),
        }
    }

    pub async fn judge(
        &self,
        context: &str,
        research_goal: &str,
        generated_insight: &str,
    ) -> Result<Assessment> {
        let inputs = fields([
            ("context", context),
            ("research_goal", research_goal),
            ("generated_insight", generated_insight),
        ]);
        let mut out = self.executor.call(&self.assess, &inputs, None).await?;
        let raw_score = out.remove("assessment_score").unwrap_or_default();
        let score = parse_score(&raw_score);
        debug!(raw = %raw_score, score, "Judged insight");
        Ok(Assessment {
            score,
            reasoning: out.remove("reasoning").unwrap_or_default(),
            raw_score,
        })
    }
}
