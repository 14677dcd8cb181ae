//! Error types for the aura-ml crate.

use aura_core::error::{AuraError, ValidationError};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for evaluation and optimization.
#[derive(Debug, Error)]
pub enum MlError {
    #[error(transparent)]
    Core(#[from] AuraError),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Optimization error: {0}")]
    Optimization(String),

    #[error("Distillation error: {0}")]
    Distillation(String),

    #[error("Artifact error at {path}: {message}")]
    Artifact { path: PathBuf, message: String },

    #[error("Optimization cancelled before any candidate was scored")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl MlError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn optimization(msg: impl Into<String>) -> Self {
        Self::Optimization(msg.into())
    }

    pub fn distillation(msg: impl Into<String>) -> Self {
        Self::Distillation(msg.into())
    }

    pub fn artifact(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Artifact {
            path: path.into(),
            message: msg.into(),
        }
    }
}

impl From<ValidationError> for MlError {
    fn from(err: ValidationError) -> Self {
        Self::Core(err.into())
    }
}

pub type Result<T> = std::result::Result<T, MlError>;
