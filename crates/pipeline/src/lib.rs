//! Response pipeline — ordered stages over a draft answer.
//!
//! Verification, post-processing, citation, format. Every stage maps a
//! `Draft` to a `Draft`; a stage that errors logs and passes its input
//! through unchanged. A broken stage must never cost the user an
//! otherwise good answer.

pub mod stages;

use async_trait::async_trait;
use clarion_core::RetrievedSource;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use stages::{CitationStage, FormatStage, PostProcessingStage, VerificationStage};

/// The answer as it moves through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub text: String,
    /// Sources gathered during reasoning, for verification and citation.
    pub sources: Vec<RetrievedSource>,
    /// Fraction of answer sentences supported by the sources, when the
    /// verification stage could compute it.
    pub support: Option<f32>,
}

impl Draft {
    pub fn new(text: impl Into<String>, sources: Vec<RetrievedSource>) -> Self {
        Self {
            text: text.into(),
            sources,
            support: None,
        }
    }
}

/// One pipeline stage.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Transform the draft. Errors are absorbed by the pipeline.
    async fn apply(&self, draft: Draft) -> Result<Draft, StageError>;
}

/// A stage-internal failure. Only ever logged.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StageError(pub String);

/// The ordered stage list.
pub struct ResponsePipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl ResponsePipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// The standard stage order.
    pub fn standard() -> Self {
        Self::new()
            .with_stage(Box::new(VerificationStage))
            .with_stage(Box::new(PostProcessingStage))
            .with_stage(Box::new(CitationStage))
            .with_stage(Box::new(FormatStage))
    }

    pub fn with_stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Run every stage in order.
    pub async fn run(&self, mut draft: Draft) -> Draft {
        for stage in &self.stages {
            let input = draft.clone();
            draft = match stage.apply(draft).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(stage = stage.name(), error = %e, "stage failed, passing draft through");
                    input
                }
            };
        }
        draft
    }
}

impl Default for ResponsePipeline {
    fn default() -> Self {
        Self::standard()
    }
}
