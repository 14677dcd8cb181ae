//! Bounded ReAct agent.
//!
//! The agent alternates thought, tool call and observation for at most
//! `max_iters` iterations or until it picks the `finish` tool, then an
//! extraction step writes the final answer from the trajectory. Tool failures
//! never abort the loop; they are fed back as observations.

use crate::error::{AuraError, Result, ToolError};
use crate::predict::{Predictor, StepExecutor, fields};
use crate::prediction::{AgentPrediction, AgentStep, Prediction};
use crate::program::Program;
use crate::signature::{REACT_EXTRACT, REACT_STEP};
use crate::trace::Trace;
use crate::types::{ToolDefinition, ToolOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the terminal action.
pub const FINISH_TOOL: &str = "finish";

pub const DEFAULT_MAX_ITERS: usize = 5;

/// Async tool entry point taking JSON arguments.
pub type ToolExecutor = Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = std::result::Result<ToolOutput, ToolError>> + Send>>
        + Send
        + Sync,
>;

/// A registered tool with its definition and executor.
#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    pub executor: ToolExecutor,
}

impl RegisteredTool {
    /// Name of the first required parameter; plain-string arguments are bound to it.
    fn primary_parameter(&self) -> String {
        self.definition
            .parameters
            .get("required")
            .and_then(|r| r.get(0))
            .and_then(|v| v.as_str())
            .unwrap_or("input")
            .to_string()
    }
}

#[derive(Clone)]
pub struct AuraAgent {
    executor: StepExecutor,
    tools: BTreeMap<String, RegisteredTool>,
    max_iters: usize,
    react: Predictor,
    extract: Predictor,
}

impl AuraAgent {
    pub fn new(executor: StepExecutor, max_iters: usize) -> Self {
        Self {
            executor,
            tools: BTreeMap::new(),
            max_iters: max_iters.max(1),
            react: Predictor::new("react", &REACT_STEP),
            extract: Predictor::chain_of_thought("extract", &REACT_EXTRACT),
        }
    }

    /// Register a tool. Names must be unique and must not shadow `finish`.
    pub fn register_tool(&mut self, tool: RegisteredTool) -> std::result::Result<(), ToolError> {
        let name = tool.definition.name.clone();
        if name == FINISH_TOOL || self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered { name });
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|k| k.as_str()).collect()
    }

    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    fn tools_description(&self) -> String {
        let mut lines: Vec<String> = self
            .tools
            .values()
            .enumerate()
            .map(|(i, t)| {
                format!(
                    "{}. {}: {} Argument: {}",
                    i + 1,
                    t.definition.name,
                    t.definition.description,
                    t.primary_parameter()
                )
            })
            .collect();
        lines.push(format!(
            "{}. {}: Signal that the final answer can be written. Argument: none",
            lines.len() + 1,
            FINISH_TOOL
        ));
        lines.join("\n")
    }

    /// Execute a tool and render the outcome as an observation string.
    async fn observe(&self, tool_name: &str, args: &str) -> String {
        let Some(tool) = self.tools.get(tool_name) else {
            let err = ToolError::NotFound {
                name: tool_name.to_string(),
            };
            return format!("Error: {err}. Available tools: {}", self.tool_names().join(", "));
        };

        let primary = |value: String| {
            let mut map = serde_json::Map::new();
            map.insert(tool.primary_parameter(), Value::String(value));
            Value::Object(map)
        };
        let arguments = match serde_json::from_str::<Value>(args) {
            Ok(v @ Value::Object(_)) => v,
            // `"2+2"` with the quotes: bind the decoded string
            Ok(Value::String(s)) => primary(s),
            _ => primary(args.to_string()),
        };

        match (tool.executor)(arguments).await {
            Ok(output) => output.content,
            Err(err) => {
                warn!(tool = tool_name, error = %err, "Tool call failed");
                format!("Error: {err}")
            }
        }
    }

    pub async fn run(&self, question: &str, trace: Option<&Trace>) -> Result<AgentPrediction> {
        let tools = self.tools_description();
        let mut steps: Vec<AgentStep> = Vec::new();
        let mut finished = false;

        for iteration in 1..=self.max_iters {
            let inputs = fields([
                ("question", question.to_string()),
                ("tools", tools.clone()),
                ("trajectory", render_trajectory(&steps)),
            ]);
            let mut out = self
                .executor
                .call(&self.react, &inputs, trace)
                .await
                .map_err(|e| e.at_stage(format!("agent step {iteration}")))?;

            let thought = out.remove("next_thought").unwrap_or_default();
            let tool = normalize_tool_name(&out.remove("next_tool_name").unwrap_or_default());
            let args = out.remove("next_tool_args").unwrap_or_default().trim().to_string();

            if tool == FINISH_TOOL {
                debug!(iteration, "Agent chose to finish");
                steps.push(AgentStep {
                    thought,
                    tool,
                    args,
                    observation: "Completed.".to_string(),
                });
                finished = true;
                break;
            }

            let observation = self.observe(&tool, &args).await;
            info!(iteration, tool = %tool, "Agent tool call");
            steps.push(AgentStep {
                thought,
                tool,
                args,
                observation,
            });
        }

        if !finished {
            info!(max_iters = self.max_iters, "Agent reached iteration cap");
        }

        let inputs = fields([
            ("question", question.to_string()),
            ("trajectory", render_trajectory(&steps)),
        ]);
        let (answer, reasoning) = match self.executor.call(&self.extract, &inputs, trace).await {
            Ok(mut out) => (
                out.remove("answer").unwrap_or_default(),
                out.remove("reasoning").unwrap_or_default(),
            ),
            Err(AuraError::Generation(err)) => {
                warn!(error = %err, "Answer extraction unparseable; using last thought");
                let partial = steps
                    .iter()
                    .rev()
                    .map(|s| s.thought.trim())
                    .find(|t| !t.is_empty())
                    .unwrap_or_default()
                    .to_string();
                (partial, crate::adapter::REASONING_PLACEHOLDER.to_string())
            }
            Err(err) => return Err(err.at_stage("answer extraction")),
        };

        Ok(AgentPrediction {
            answer,
            reasoning,
            trajectory: steps,
            finished,
        })
    }
}

/// Tool names come back in assorted shapes: `` `finish` ``, `Finish`, `finish()`.
fn normalize_tool_name(raw: &str) -> String {
    raw.trim()
        .trim_matches('`')
        .trim_end_matches("()")
        .trim()
        .to_ascii_lowercase()
}

/// Numbered thought/action/observation transcript.
pub fn render_trajectory(steps: &[AgentStep]) -> String {
    if steps.is_empty() {
        return "No steps taken yet.".to_string();
    }
    steps
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let n = i + 1;
            format!(
                "Thought {n}: {}\nAction {n}: {}({})\nObservation {n}: {}",
                s.thought, s.tool, s.args, s.observation
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Program for AuraAgent {
    fn name(&self) -> &str {
        "aura_agent"
    }

    async fn forward(&self, goal: &str, trace: Option<&Trace>) -> Result<Prediction> {
        self.run(goal, trace).await.map(Prediction::Agent)
    }

    fn named_predictors(&self) -> Vec<&Predictor> {
        vec![&self.react, &self.extract]
    }

    fn named_predictors_mut(&mut self) -> Vec<&mut Predictor> {
        vec![&mut self.react, &mut self.extract]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{format_reply, input_value, signature_of};
    use crate::brain::{Brain, MockLlmProvider};
    use crate::signature::SignatureId;
    use serde_json::json;

    fn echo_tool() -> RegisteredTool {
        RegisteredTool {
            definition: ToolDefinition {
                name: "echo".to_string(),
                description: "Echo input text.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }),
            },
            executor: Arc::new(|args: Value| {
                Box::pin(async move {
                    let text = args["text"].as_str().unwrap_or("").to_string();
                    Ok(ToolOutput::text(format!("echo: {text}")))
                })
            }),
        }
    }

    fn failing_tool() -> RegisteredTool {
        RegisteredTool {
            definition: ToolDefinition {
                name: "broken".to_string(),
                description: "Always fails.".to_string(),
                parameters: json!({ "required": ["x"] }),
            },
            executor: Arc::new(|_| {
                Box::pin(async {
                    Err(ToolError::ExecutionFailed {
                        name: "broken".into(),
                        message: "boom".into(),
                    })
                })
            }),
        }
    }

    fn agent(provider: MockLlmProvider) -> AuraAgent {
        let mut agent = AuraAgent::new(StepExecutor::new(Brain::new(Arc::new(provider))), 5);
        agent.register_tool(echo_tool()).unwrap();
        agent.register_tool(failing_tool()).unwrap();
        agent
    }

    #[tokio::test]
    async fn test_finish_after_one_tool_call() {
        let provider = MockLlmProvider::with_responder(|req| {
            Ok(match signature_of(req) {
                Some(SignatureId::ReActStep) => {
                    let traj = input_value(req, "trajectory").unwrap_or_default();
                    if traj.contains("echo: hi") {
                        format_reply(&[
                            ("next_thought", "I have it."),
                            ("next_tool_name", "`Finish`"),
                            ("next_tool_args", ""),
                        ])
                    } else {
                        format_reply(&[
                            ("next_thought", "Echo first."),
                            ("next_tool_name", "echo"),
                            ("next_tool_args", "hi"),
                        ])
                    }
                }
                Some(SignatureId::ReActExtract) => {
                    format_reply(&[("reasoning", "seen"), ("answer", "hi")])
                }
                _ => String::new(),
            })
        });
        let pred = agent(provider).run("say hi", None).await.unwrap();
        assert!(pred.finished);
        assert_eq!(pred.trajectory.len(), 2);
        assert_eq!(pred.trajectory[0].observation, "echo: hi");
        assert_eq!(pred.answer, "hi");
    }

    #[tokio::test]
    async fn test_iteration_cap_still_extracts() {
        let provider = MockLlmProvider::with_responder(|req| {
            Ok(match signature_of(req) {
                Some(SignatureId::ReActStep) => format_reply(&[
                    ("next_thought", "Keep going."),
                    ("next_tool_name", "broken"),
                    ("next_tool_args", "{\"x\": 1}"),
                ]),
                Some(SignatureId::ReActExtract) => format_reply(&[("answer", "partial")]),
                _ => String::new(),
            })
        });
        let agent = agent(provider);
        let pred = agent.run("loop forever", None).await.unwrap();
        assert!(!pred.finished);
        assert_eq!(pred.trajectory.len(), 5);
        assert!(pred.trajectory[0].observation.starts_with("Error: Tool 'broken' execution failed"));
        assert_eq!(pred.answer, "partial");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_observed() {
        let provider = MockLlmProvider::with_responder(|req| {
            Ok(match signature_of(req) {
                Some(SignatureId::ReActStep) => {
                    let traj = input_value(req, "trajectory").unwrap_or_default();
                    if traj.contains("Tool not found") {
                        format_reply(&[
                            ("next_thought", "Oops."),
                            ("next_tool_name", "finish"),
                            ("next_tool_args", ""),
                        ])
                    } else {
                        format_reply(&[
                            ("next_thought", "Search the web."),
                            ("next_tool_name", "web_search"),
                            ("next_tool_args", "x"),
                        ])
                    }
                }
                _ => format_reply(&[("answer", "done")]),
            })
        });
        let pred = agent(provider).run("q", None).await.unwrap();
        assert!(pred.trajectory[0].observation.contains("Tool not found: web_search"));
        assert!(pred.finished);
    }

    #[tokio::test]
    async fn test_unparseable_extraction_falls_back_to_last_thought() {
        let provider = MockLlmProvider::with_responder(|req| {
            Ok(match signature_of(req) {
                Some(SignatureId::ReActStep) => format_reply(&[
                    ("next_thought", "The answer is 4."),
                    ("next_tool_name", "finish"),
                    ("next_tool_args", ""),
                ]),
                _ => "   ".to_string(),
            })
        });
        let pred = agent(provider).run("2+2?", None).await.unwrap();
        assert_eq!(pred.answer, "The answer is 4.");
    }

    #[test]
    fn test_register_rejects_duplicates_and_finish() {
        let mut agent = agent(MockLlmProvider::new());
        assert!(agent.register_tool(echo_tool()).is_err());
        let mut finish = echo_tool();
        finish.definition.name = FINISH_TOOL.to_string();
        assert!(agent.register_tool(finish).is_err());
    }

    #[test]
    fn test_render_trajectory() {
        assert_eq!(render_trajectory(&[]), "No steps taken yet.");
        let text = render_trajectory(&[AgentStep {
            thought: "t".into(),
            tool: "echo".into(),
            args: "a".into(),
            observation: "o".into(),
        }]);
        assert_eq!(text, "Thought 1: t\nAction 1: echo(a)\nObservation 1: o");
    }
}
