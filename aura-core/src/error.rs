//! Error types for the AURA core library.
//!
//! Uses `thiserror` for public API error types. Every failure maps onto one
//! of five kinds (see [`ErrorKind`]); pipeline modules wrap step failures in
//! [`AuraError::Stage`] so the caller learns which stage failed and why.

use std::path::PathBuf;

/// Top-level error type for the AURA core library.
#[derive(Debug, thiserror::Error)]
pub enum AuraError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("LLM provider error: {0}")]
    Llm(#[from] LlmError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<AuraError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The coarse failure taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input to a step.
    Validation,
    /// Model output could not be parsed against its signature.
    Generation,
    /// Network, auth, or timeout failure from the model or retrieval backend.
    Provider,
    /// Invalid provider/model/credential combination at setup time.
    Configuration,
    /// An agent tool received input outside its permitted grammar.
    SandboxViolation,
}

impl AuraError {
    /// Wrap this error with the name of the pipeline stage that produced it.
    pub fn at_stage(self, stage: impl Into<String>) -> Self {
        AuraError::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Classify the error, looking through stage wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuraError::Validation(_) => ErrorKind::Validation,
            AuraError::Generation(_) => ErrorKind::Generation,
            AuraError::Llm(_) | AuraError::Retrieval(_) => ErrorKind::Provider,
            AuraError::Config(_) => ErrorKind::Configuration,
            AuraError::Tool(ToolError::SandboxViolation { .. }) => ErrorKind::SandboxViolation,
            AuraError::Tool(_) => ErrorKind::Validation,
            AuraError::Stage { source, .. } => source.kind(),
            AuraError::Io(_) => ErrorKind::Provider,
            AuraError::Serialization(_) => ErrorKind::Generation,
        }
    }

    /// The innermost stage name, if the error was raised inside a pipeline.
    pub fn stage(&self) -> Option<&str> {
        match self {
            AuraError::Stage { stage, source } => source.stage().or(Some(stage.as_str())),
            _ => None,
        }
    }
}

/// Errors from malformed or missing step inputs.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing input field '{field}' for signature {signature}")]
    MissingInput { signature: String, field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Train and dev splits overlap in {count} example(s)")]
    SplitLeak { count: usize },
}

/// Errors from parsing model output against a signature.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Response for {signature} contained none of the fields [{expected}]")]
    Unparseable { signature: String, expected: String },

    #[error("Response for {signature} is missing required field '{field}'")]
    MissingField { signature: String, field: String },

    #[error("Model returned an empty response for {signature}")]
    Empty { signature: String },
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from the retrieval backend.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Retrieval request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Retrieval request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Malformed retrieval response: {message}")]
    MalformedResponse { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Unknown provider '{provider}' (expected one of: {expected})")]
    UnknownProvider { provider: String, expected: String },

    #[error("Provider '{provider}' requires an API key")]
    MissingCredential { provider: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from agent tool registration and execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    NotFound { name: String },

    #[error("Tool already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Tool '{name}' execution failed: {message}")]
    ExecutionFailed { name: String, message: String },

    #[error("Tool '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },

    #[error("Tool '{name}' rejected input outside its sandbox: {reason}")]
    SandboxViolation { name: String, reason: String },
}

/// A type alias for results using the top-level `AuraError`.
pub type Result<T> = std::result::Result<T, AuraError>;
