//! Structured pipeline outputs.
//!
//! Each module returns its own [`Prediction`] variant. Consumers that only need
//! "the insight" or "the context" go through [`Prediction::insight_text`] and
//! [`Prediction::context_text`] instead of probing fields.

use crate::example::FieldMap;
use crate::types::Passage;
use serde::{Deserialize, Serialize};

/// Output of a RAG run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchPrediction {
    pub query_rationale: String,
    pub search_query: String,
    pub context: Vec<Passage>,
    pub synthesis_rationale: String,
    pub structured_insight: String,
}

/// Output of a multi-hop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiHopPrediction {
    pub context: Vec<Passage>,
    pub answer: String,
    /// Query issued at each hop, in order.
    #[serde(default)]
    pub hop_queries: Vec<String>,
}

/// One iteration of the agent loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStep {
    pub thought: String,
    pub tool: String,
    pub args: String,
    pub observation: String,
}

/// Output of an agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPrediction {
    pub answer: String,
    pub reasoning: String,
    pub trajectory: Vec<AgentStep>,
    /// Whether the agent chose `finish` before the iteration cap.
    pub finished: bool,
}

/// Output of a synthesis strategy (direct or reflector).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisPrediction {
    pub rationale: String,
    pub structured_insight: String,
}

/// The structured result of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prediction {
    Research(ResearchPrediction),
    MultiHop(MultiHopPrediction),
    Agent(AgentPrediction),
    Synthesis(SynthesisPrediction),
    /// Free-form record, e.g. loaded from elsewhere.
    Fields { fields: FieldMap },
}

impl Prediction {
    /// The text to be judged: `structured_insight`, then `answer`, then
    /// `generated_report`/`structured_report`, else the whole prediction as JSON.
    pub fn insight_text(&self) -> String {
        match self {
            Prediction::Research(p) => p.structured_insight.clone(),
            Prediction::MultiHop(p) => p.answer.clone(),
            Prediction::Agent(p) => p.answer.clone(),
            Prediction::Synthesis(p) => p.structured_insight.clone(),
            Prediction::Fields { fields } => [
                "structured_insight",
                "answer",
                "generated_report",
                "structured_report",
            ]
            .iter()
            .find_map(|k| fields.get(*k).cloned())
            .unwrap_or_else(|| serde_json::to_string(fields).unwrap_or_default()),
        }
    }

    /// Retrieved passages, when the module retrieves.
    pub fn passages(&self) -> Option<&[Passage]> {
        match self {
            Prediction::Research(p) => Some(&p.context),
            Prediction::MultiHop(p) => Some(&p.context),
            _ => None,
        }
    }

    /// Context passages joined by newline; `None` when there are none.
    pub fn context_text(&self) -> Option<String> {
        match self {
            Prediction::Fields { fields } => fields.get("context").cloned(),
            _ => self.passages().map(join_passages),
        }
        .filter(|c| !c.trim().is_empty())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Prediction::Research(_) => "research",
            Prediction::MultiHop(_) => "multi_hop",
            Prediction::Agent(_) => "agent",
            Prediction::Synthesis(_) => "synthesis",
            Prediction::Fields { .. } => "fields",
        }
    }
}

/// Passages rendered one per line.
pub fn join_passages(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prediction::Research(p) => {
                writeln!(f, "Search query: {}", p.search_query)?;
                writeln!(f, "Query rationale: {}", p.query_rationale)?;
                writeln!(f, "Sources:")?;
                for (i, passage) in p.context.iter().enumerate() {
                    writeln!(f, "  [{}] {}", i + 1, passage)?;
                }
                writeln!(f, "Synthesis rationale: {}", p.synthesis_rationale)?;
                write!(f, "Insight:\n{}", p.structured_insight)
            }
            Prediction::MultiHop(p) => {
                for (i, q) in p.hop_queries.iter().enumerate() {
                    writeln!(f, "Hop {} query: {}", i + 1, q)?;
                }
                writeln!(f, "Sources:")?;
                for (i, passage) in p.context.iter().enumerate() {
                    writeln!(f, "  [{}] {}", i + 1, passage)?;
                }
                write!(f, "Answer:\n{}", p.answer)
            }
            Prediction::Agent(p) => {
                for (i, step) in p.trajectory.iter().enumerate() {
                    writeln!(f, "Step {}: {}", i + 1, step.thought)?;
                    writeln!(f, "  -> {}({})", step.tool, step.args)?;
                    writeln!(f, "  <- {}", step.observation)?;
                }
                write!(f, "Answer:\n{}", p.answer)
            }
            Prediction::Synthesis(p) => {
                writeln!(f, "Rationale: {}", p.rationale)?;
                write!(f, "Insight:\n{}", p.structured_insight)
            }
            Prediction::Fields { fields } => {
                for (k, v) in fields {
                    writeln!(f, "{k}: {v}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::fields;

    fn research() -> Prediction {
        Prediction::Research(ResearchPrediction {
            query_rationale: "r".into(),
            search_query: "q".into(),
            context: vec![Passage::new("A", "alpha"), Passage::new("B", "beta")],
            synthesis_rationale: "s".into(),
            structured_insight: "insight".into(),
        })
    }

    #[test]
    fn test_insight_dispatch() {
        assert_eq!(research().insight_text(), "insight");
        let hop = Prediction::MultiHop(MultiHopPrediction {
            context: vec![],
            answer: "hop answer".into(),
            hop_queries: vec![],
        });
        assert_eq!(hop.insight_text(), "hop answer");
    }

    #[test]
    fn test_fields_insight_priority() {
        let p = Prediction::Fields {
            fields: fields([("answer", "a"), ("structured_report", "report")]),
        };
        assert_eq!(p.insight_text(), "a");

        let p = Prediction::Fields {
            fields: fields([("structured_report", "report")]),
        };
        assert_eq!(p.insight_text(), "report");

        let p = Prediction::Fields {
            fields: fields([("other", "x")]),
        };
        assert_eq!(p.insight_text(), r#"{"other":"x"}"#);
    }

    #[test]
    fn test_context_text() {
        assert_eq!(research().context_text().as_deref(), Some("A | alpha\nB | beta"));
        let agent = Prediction::Agent(AgentPrediction {
            answer: "a".into(),
            reasoning: "r".into(),
            trajectory: vec![],
            finished: true,
        });
        assert_eq!(agent.context_text(), None);
    }

    #[test]
    fn test_tagged_serialization() {
        let json = serde_json::to_value(research()).unwrap();
        assert_eq!(json["kind"], "research");
        assert_eq!(json["context"][0]["title"], "A");
    }
}
