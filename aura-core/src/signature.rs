//! Signature registry: declarative input/output contracts for each reasoning step.
//!
//! A [`Signature`] names an ordered set of input fields and output fields,
//! each with a semantic description. The same definition is used to build the
//! prompt and to parse the model's reply back into named fields. All
//! signatures are static and immutable; [`SignatureId`] is their stable key in
//! compiled program artifacts.

use serde::{Deserialize, Serialize};

/// One named field of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub description: &'static str,
}

impl Field {
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self { name, description }
    }
}

/// Stable identifier of a built-in signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignatureId {
    GenerateSearchQuery,
    HopQueryGenerator,
    ResearchSynthesizer,
    FinalResearcher,
    AssessResearchQuality,
    CompareCandidates,
    ReActStep,
    ReActExtract,
    ProposeInstruction,
}

impl SignatureId {
    pub const ALL: [SignatureId; 9] = [
        SignatureId::GenerateSearchQuery,
        SignatureId::HopQueryGenerator,
        SignatureId::ResearchSynthesizer,
        SignatureId::FinalResearcher,
        SignatureId::AssessResearchQuality,
        SignatureId::CompareCandidates,
        SignatureId::ReActStep,
        SignatureId::ReActExtract,
        SignatureId::ProposeInstruction,
    ];

    /// Resolve the static signature definition.
    pub fn signature(self) -> &'static Signature {
        match self {
            SignatureId::GenerateSearchQuery => &GENERATE_SEARCH_QUERY,
            SignatureId::HopQueryGenerator => &HOP_QUERY_GENERATOR,
            SignatureId::ResearchSynthesizer => &RESEARCH_SYNTHESIZER,
            SignatureId::FinalResearcher => &FINAL_RESEARCHER,
            SignatureId::AssessResearchQuality => &ASSESS_RESEARCH_QUALITY,
            SignatureId::CompareCandidates => &COMPARE_CANDIDATES,
            SignatureId::ReActStep => &REACT_STEP,
            SignatureId::ReActExtract => &REACT_EXTRACT,
            SignatureId::ProposeInstruction => &PROPOSE_INSTRUCTION,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignatureId::GenerateSearchQuery => "GenerateSearchQuery",
            SignatureId::HopQueryGenerator => "HopQueryGenerator",
            SignatureId::ResearchSynthesizer => "ResearchSynthesizer",
            SignatureId::FinalResearcher => "FinalResearcher",
            SignatureId::AssessResearchQuality => "AssessResearchQuality",
            SignatureId::CompareCandidates => "CompareCandidates",
            SignatureId::ReActStep => "ReActStep",
            SignatureId::ReActExtract => "ReActExtract",
            SignatureId::ProposeInstruction => "ProposeInstruction",
        }
    }
}

impl std::fmt::Display for SignatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named input/output contract for one reasoning step.
#[derive(Debug, PartialEq, Eq)]
pub struct Signature {
    pub id: SignatureId,
    pub instructions: &'static str,
    pub inputs: &'static [Field],
    pub outputs: &'static [Field],
}

impl Signature {
    pub fn name(&self) -> &'static str {
        self.id.as_str()
    }

    pub fn input_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inputs.iter().map(|f| f.name)
    }

    pub fn output_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.outputs.iter().map(|f| f.name)
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|f| f.name == name)
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|f| f.name == name)
    }

    /// Compact `"a, b -> c"` form.
    pub fn to_string_format(&self) -> String {
        let inputs: Vec<&str> = self.input_names().collect();
        let outputs: Vec<&str> = self.output_names().collect();
        format!("{} -> {}", inputs.join(", "), outputs.join(", "))
    }

    /// Multi-line description of the contract, used by the instruction proposer.
    pub fn describe(&self) -> String {
        let mut out = format!("{} ({})\n", self.name(), self.to_string_format());
        for f in self.inputs {
            out.push_str(&format!("  input  {}: {}\n", f.name, f.description));
        }
        for f in self.outputs {
            out.push_str(&format!("  output {}: {}\n", f.name, f.description));
        }
        out
    }
}

pub static GENERATE_SEARCH_QUERY: Signature = Signature {
    id: SignatureId::GenerateSearchQuery,
    instructions: "Transform a high-level research goal into an optimized search query.",
    inputs: &[Field::new(
        "research_goal",
        "The complex, high-level research objective",
    )],
    outputs: &[Field::new(
        "search_query",
        "A keyword-optimized query for retrieval",
    )],
};

pub static HOP_QUERY_GENERATOR: Signature = Signature {
    id: SignatureId::HopQueryGenerator,
    instructions: "Generate a search query based on what we already know (context) and what we still need to know.",
    inputs: &[
        Field::new(
            "context",
            "The accumulated knowledge from previous retrieval hops",
        ),
        Field::new("question", "The original complex research question"),
    ],
    outputs: &[Field::new(
        "search_query",
        "A targeted search query to fill information gaps",
    )],
};

pub static RESEARCH_SYNTHESIZER: Signature = Signature {
    id: SignatureId::ResearchSynthesizer,
    instructions: "Synthesize retrieved context into a structured research insight.",
    inputs: &[
        Field::new("context", "Retrieved passages from the knowledge base"),
        Field::new("research_goal", "The original research question"),
    ],
    outputs: &[Field::new(
        "structured_insight",
        "A reasoned, citation-backed synthesis",
    )],
};

pub static FINAL_RESEARCHER: Signature = Signature {
    id: SignatureId::FinalResearcher,
    instructions: "Synthesize the final answer using the fully accumulated context.",
    inputs: &[
        Field::new(
            "context",
            "The complete set of retrieved passages from all hops",
        ),
        Field::new("question", "The original research question"),
    ],
    outputs: &[Field::new(
        "answer",
        "A comprehensive, multi-faceted answer to the question",
    )],
};

pub static ASSESS_RESEARCH_QUALITY: Signature = Signature {
    id: SignatureId::AssessResearchQuality,
    instructions: "Assess the quality of generated research insights.",
    inputs: &[
        Field::new("context", "The retrieved passages from the knowledge base"),
        Field::new(
            "research_goal",
            "The original research question to be answered",
        ),
        Field::new("generated_insight", "The synthesized research output"),
    ],
    outputs: &[
        Field::new("assessment_score", "Quality score from 1-5"),
        Field::new("reasoning", "Detailed explanation of the score"),
    ],
};

pub static COMPARE_CANDIDATES: Signature = Signature {
    id: SignatureId::CompareCandidates,
    instructions: "Several student attempts at the same research synthesis are given. \
        Compare them for faithfulness to the context and coverage of the goal, pick the best \
        attempt, and write the final insight. If two or more attempts are equally good, pick \
        the one with the lowest attempt number.",
    inputs: &[
        Field::new("context", "Retrieved passages from the knowledge base"),
        Field::new("research_goal", "The original research question"),
        Field::new("attempts", "Numbered candidate syntheses with their reasoning"),
    ],
    outputs: &[
        Field::new(
            "best_attempt",
            "The number of the best attempt (lowest number among equals)",
        ),
        Field::new(
            "structured_insight",
            "A reasoned, citation-backed synthesis",
        ),
    ],
};

pub static REACT_STEP: Signature = Signature {
    id: SignatureId::ReActStep,
    instructions: "You are an agent answering a question with tools. In each turn, reason about \
        the trajectory so far, then choose exactly one tool and its argument. When you have \
        enough information, choose the tool `finish` with an empty argument.",
    inputs: &[
        Field::new("question", "The question to answer"),
        Field::new("tools", "The available tools and what they do"),
        Field::new("trajectory", "Previous thoughts, tool calls and observations"),
    ],
    outputs: &[
        Field::new("next_thought", "Reasoning about the current situation"),
        Field::new("next_tool_name", "The name of the tool to call next"),
        Field::new("next_tool_args", "The single string argument for the tool"),
    ],
};

pub static REACT_EXTRACT: Signature = Signature {
    id: SignatureId::ReActExtract,
    instructions: "Given the question and the agent's trajectory, produce the best final answer.",
    inputs: &[
        Field::new("question", "The question to answer"),
        Field::new("trajectory", "Thoughts, tool calls and observations gathered so far"),
    ],
    outputs: &[Field::new("answer", "The final answer to the question")],
};

pub static PROPOSE_INSTRUCTION: Signature = Signature {
    id: SignatureId::ProposeInstruction,
    instructions: "Propose an improved instruction for a language model step. The instruction \
        must keep the same inputs and outputs but should make the step more accurate and more \
        useful for research synthesis.",
    inputs: &[
        Field::new("signature_description", "The step's fields and their meaning"),
        Field::new("current_instruction", "The instruction currently used"),
        Field::new("demonstrations", "Example inputs and outputs for the step"),
        Field::new("proposal_hint", "A stylistic direction for this proposal"),
    ],
    outputs: &[Field::new(
        "proposed_instruction",
        "The new instruction, as plain text",
    )],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_format() {
        assert_eq!(
            GENERATE_SEARCH_QUERY.to_string_format(),
            "research_goal -> search_query"
        );
        assert_eq!(
            ASSESS_RESEARCH_QUALITY.to_string_format(),
            "context, research_goal, generated_insight -> assessment_score, reasoning"
        );
    }

    #[test]
    fn test_registry_roundtrip() {
        for id in SignatureId::ALL {
            assert_eq!(id.signature().id, id);
            assert!(!id.signature().outputs.is_empty());
        }
    }

    #[test]
    fn test_field_lookup() {
        assert!(HOP_QUERY_GENERATOR.has_input("context"));
        assert!(HOP_QUERY_GENERATOR.has_output("search_query"));
        assert!(!HOP_QUERY_GENERATOR.has_output("answer"));
    }

    #[test]
    fn test_id_serialization() {
        let json = serde_json::to_string(&SignatureId::FinalResearcher).unwrap();
        assert_eq!(json, "\"FinalResearcher\"");
        let back: SignatureId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SignatureId::FinalResearcher);
    }
}
