//! Integration tests for the research programs.
//!
//! These run each program end-to-end over the local knowledge base with a
//! deterministic MockLlmProvider that routes on the signature of each call.

use aura_core::adapter::{format_reply, input_value, signature_of};
use aura_core::error::ErrorKind;
use aura_core::modules::synthesis::SynthesisStrategy;
use aura_core::types::{ToolDefinition, ToolOutput};
use aura_core::{
    AuraAgent, AuraArchitect, AuraMultiHop, AuraReflector, Brain, LocalKnowledgeBase,
    MockLlmProvider, Prediction, Program, RegisteredTool, SignatureId, StepExecutor, Trace,
};
use std::sync::Arc;

fn scripted_provider() -> MockLlmProvider {
    MockLlmProvider::with_responder(|req| {
        Ok(match signature_of(req) {
            Some(SignatureId::GenerateSearchQuery) => format_reply(&[
                ("reasoning", "Distillation is a training technique."),
                ("search_query", "knowledge distillation"),
            ]),
            Some(SignatureId::HopQueryGenerator) => format_reply(&[
                ("reasoning", "Look for the missing piece."),
                ("search_query", "teacher student models"),
            ]),
            Some(SignatureId::ResearchSynthesizer) => format_reply(&[
                ("reasoning", "The passages describe compression."),
                (
                    "structured_insight",
                    "Knowledge distillation trains a small student to mimic a large teacher [1].",
                ),
            ]),
            Some(SignatureId::FinalResearcher) => format_reply(&[
                ("reasoning", "Combined both hops."),
                ("answer", "A student model learns from a teacher model's outputs."),
            ]),
            Some(SignatureId::CompareCandidates) => format_reply(&[
                ("reasoning", "All attempts agree."),
                ("best_attempt", "1"),
                ("structured_insight", "Distillation compresses a teacher into a student."),
            ]),
            Some(SignatureId::ReActStep) => {
                let trajectory = input_value(req, "trajectory").unwrap_or_default();
                if trajectory.contains("Observation 1") {
                    format_reply(&[
                        ("next_thought", "I know enough."),
                        ("next_tool_name", "finish"),
                        ("next_tool_args", ""),
                    ])
                } else {
                    format_reply(&[
                        ("next_thought", "Look it up."),
                        ("next_tool_name", "lookup"),
                        ("next_tool_args", "knowledge distillation"),
                    ])
                }
            }
            Some(SignatureId::ReActExtract) => format_reply(&[
                ("reasoning", "The lookup answered it."),
                ("answer", "Distillation transfers knowledge to a smaller model."),
            ]),
            _ => String::new(),
        })
    })
}

fn executor() -> (StepExecutor, Arc<MockLlmProvider>) {
    let provider = Arc::new(scripted_provider());
    (StepExecutor::new(Brain::new(provider.clone())), provider)
}

#[tokio::test]
async fn test_architect_end_to_end() {
    let (exec, provider) = executor();
    let program = AuraArchitect::new(exec, Arc::new(LocalKnowledgeBase::new()), 3);

    let prediction = program
        .forward("Explain knowledge distillation.", None)
        .await
        .unwrap();

    let Prediction::Research(research) = &prediction else {
        panic!("expected research prediction, got {}", prediction.kind());
    };
    assert_eq!(research.search_query, "knowledge distillation");
    assert_eq!(research.context.len(), 3);
    assert!(!research.structured_insight.is_empty());
    assert_eq!(prediction.insight_text(), research.structured_insight);
    assert_eq!(provider.request_count(), 2);
}

#[tokio::test]
async fn test_architect_with_reflector() {
    let (exec, provider) = executor();
    let reflector: Box<dyn SynthesisStrategy> = Box::new(AuraReflector::new(3).unwrap());
    let program =
        AuraArchitect::with_strategy(exec, Arc::new(LocalKnowledgeBase::new()), 2, reflector);

    let prediction = program.run("Explain knowledge distillation.", None).await.unwrap();
    assert_eq!(
        prediction.structured_insight,
        "Distillation compresses a teacher into a student."
    );
    // query + three candidates + comparison
    assert_eq!(provider.request_count(), 5);
    assert_eq!(program.named_predictors().len(), 3);
}

#[tokio::test]
async fn test_multihop_end_to_end() {
    let (exec, _) = executor();
    let program = AuraMultiHop::new(exec, Arc::new(LocalKnowledgeBase::new()), 2, 3).unwrap();

    let trace = Trace::new();
    let prediction = program.run("How do teachers help students?", Some(&trace)).await.unwrap();
    assert_eq!(prediction.hop_queries.len(), 2);
    // Both hops hit the same three local passages.
    assert_eq!(prediction.context.len(), 3);
    assert_eq!(trace.len(), 3);
    assert!(prediction.answer.contains("student"));
}

#[tokio::test]
async fn test_agent_end_to_end() {
    let (exec, _) = executor();
    let mut agent = AuraAgent::new(exec, 5);
    agent
        .register_tool(RegisteredTool {
            definition: ToolDefinition {
                name: "lookup".to_string(),
                description: "Look up a topic.".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "query": { "type": "string" } },
                    "required": ["query"]
                }),
            },
            executor: Arc::new(|args: serde_json::Value| {
                Box::pin(async move {
                    let query = args["query"].as_str().unwrap_or_default().to_string();
                    Ok(ToolOutput::text(format!("Found notes on {query}.")))
                })
            }),
        })
        .unwrap();

    let prediction = agent.forward("What is knowledge distillation?", None).await.unwrap();
    let Prediction::Agent(run) = prediction else {
        panic!("expected agent prediction");
    };
    assert!(run.finished);
    assert_eq!(run.trajectory[0].observation, "Found notes on knowledge distillation.");
    assert_eq!(run.answer, "Distillation transfers knowledge to a smaller model.");
}

#[tokio::test]
async fn test_program_state_round_trip() {
    let (exec, _) = executor();
    let mut program = AuraArchitect::new(exec.clone(), Arc::new(LocalKnowledgeBase::new()), 3);

    let trace = Trace::new();
    program.forward("Explain RAG.", Some(&trace)).await.unwrap();
    for entry in trace.entries() {
        let demo = entry.to_demo();
        let predictor = program.predictor_mut(&entry.predictor).unwrap();
        predictor.set_demos(vec![demo]);
    }
    let state = program.dump_state();
    assert_eq!(state.total_demos(), 2);

    let json = serde_json::to_string(&state).unwrap();
    let restored: aura_core::ProgramState = serde_json::from_str(&json).unwrap();
    let mut fresh = AuraArchitect::new(exec, Arc::new(LocalKnowledgeBase::new()), 3);
    fresh.load_state(&restored).unwrap();
    assert_eq!(fresh.dump_state(), state);
}

#[tokio::test]
async fn test_empty_reply_is_generation_error() {
    let provider = Arc::new(MockLlmProvider::with_response(""));
    let program = AuraArchitect::new(
        StepExecutor::new(Brain::new(provider)),
        Arc::new(LocalKnowledgeBase::new()),
        3,
    );
    let err = program.run("goal", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Generation);
    assert_eq!(err.stage(), Some("query generation"));
}
