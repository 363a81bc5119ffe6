//! The standard pipeline stages.

use async_trait::async_trait;
use clarion_core::ERROR_MARKER;
use tracing::debug;

use crate::{Draft, Stage, StageError};

/// Cross-checks answer sentences against the retrieved sources.
///
/// Purely lexical: a sentence counts as supported when it shares a
/// salient term with some source snippet. With no sources the stage
/// passes through without a verdict.
pub struct VerificationStage;

#[async_trait]
impl Stage for VerificationStage {
    fn name(&self) -> &str {
        "verification"
    }

    async fn apply(&self, mut draft: Draft) -> Result<Draft, StageError> {
        if draft.sources.is_empty() {
            return Ok(draft);
        }

        let context = draft
            .sources
            .iter()
            .map(|s| s.snippet.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");

        let sentences: Vec<&str> = draft
            .text
            .split(['.', '!', '?'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if sentences.is_empty() {
            return Ok(draft);
        }

        let supported = sentences
            .iter()
            .filter(|sentence| {
                sentence
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| t.len() > 3)
                    .any(|term| context.contains(term))
            })
            .count();

        let support = supported as f32 / sentences.len() as f32;
        debug!(supported, total = sentences.len(), "verification complete");
        draft.support = Some(support);
        Ok(draft)
    }
}

/// Strips tool-internal markers that leaked into the answer text.
pub struct PostProcessingStage;

#[async_trait]
impl Stage for PostProcessingStage {
    fn name(&self) -> &str {
        "post_processing"
    }

    async fn apply(&self, mut draft: Draft) -> Result<Draft, StageError> {
        let cleaned: Vec<&str> = draft
            .text
            .lines()
            .filter(|line| {
                let trimmed = line.trim();
                !trimmed.starts_with(ERROR_MARKER)
                    && !trimmed.starts_with("Thought:")
                    && !trimmed.starts_with("Observation:")
            })
            .collect();
        draft.text = cleaned.join("\n");
        Ok(draft)
    }
}

/// Appends a sources section with deduplicated references.
pub struct CitationStage;

#[async_trait]
impl Stage for CitationStage {
    fn name(&self) -> &str {
        "citation"
    }

    async fn apply(&self, mut draft: Draft) -> Result<Draft, StageError> {
        let mut references: Vec<&str> = Vec::new();
        for source in &draft.sources {
            if let Some(reference) = source.reference.as_deref() {
                if !references.contains(&reference) {
                    references.push(reference);
                }
            }
        }
        if references.is_empty() {
            return Ok(draft);
        }

        draft.text.push_str("\n\nSources:\n");
        for reference in references {
            draft.text.push_str(&format!("- {reference}\n"));
        }
        Ok(draft)
    }
}

/// Final output shaping: collapse blank runs, trim, single trailing
/// newline removed (transport adds its own framing).
pub struct FormatStage;

#[async_trait]
impl Stage for FormatStage {
    fn name(&self) -> &str {
        "format"
    }

    async fn apply(&self, mut draft: Draft) -> Result<Draft, StageError> {
        let mut out = String::with_capacity(draft.text.len());
        let mut blank_run = 0usize;
        for line in draft.text.lines() {
            if line.trim().is_empty() {
                blank_run += 1;
                if blank_run > 1 {
                    continue;
                }
            } else {
                blank_run = 0;
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
        draft.text = out.trim().to_string();
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clarion_core::RetrievedSource;

    fn source(snippet: &str, reference: Option<&str>) -> RetrievedSource {
        RetrievedSource {
            id: "s".into(),
            collection: "visa_kb".into(),
            score: 0.9,
            snippet: snippet.into(),
            reference: reference.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn verification_scores_supported_sentences() {
        let draft = Draft::new(
            "KITAS is a limited stay permit. The moon is made of cheese.",
            vec![source("KITAS is a limited stay permit for foreigners", None)],
        );
        let output = VerificationStage.apply(draft).await.unwrap();
        let support = output.support.unwrap();
        assert!(support > 0.0 && support < 1.0);
    }

    #[tokio::test]
    async fn verification_passes_through_without_sources() {
        let output = VerificationStage
            .apply(Draft::new("anything", vec![]))
            .await
            .unwrap();
        assert!(output.support.is_none());
    }

    #[tokio::test]
    async fn post_processing_strips_internal_markers() {
        let draft = Draft::new(
            "The answer is 42.\nError: tool timed out\nThought: let me check\nDone.",
            vec![],
        );
        let output = PostProcessingStage.apply(draft).await.unwrap();
        assert!(!output.text.contains("Error:"));
        assert!(!output.text.contains("Thought:"));
        assert!(output.text.contains("The answer is 42."));
        assert!(output.text.contains("Done."));
    }

    #[tokio::test]
    async fn citation_appends_deduplicated_references() {
        let draft = Draft::new(
            "KITAS needs a sponsor.",
            vec![
                source("a", Some("kitas_guide.md")),
                source("b", Some("kitas_guide.md")),
                source("c", Some("sponsorship.md")),
            ],
        );
        let output = CitationStage.apply(draft).await.unwrap();
        assert_eq!(output.text.matches("kitas_guide.md").count(), 1);
        assert!(output.text.contains("sponsorship.md"));
    }

    #[tokio::test]
    async fn citation_skips_sources_without_references() {
        let draft = Draft::new("Answer.", vec![source("a", None)]);
        let output = CitationStage.apply(draft).await.unwrap();
        assert!(!output.text.contains("Sources:"));
    }

    #[tokio::test]
    async fn format_collapses_blank_runs() {
        let draft = Draft::new("line one\n\n\n\nline two   \n", vec![]);
        let output = FormatStage.apply(draft).await.unwrap();
        assert_eq!(output.text, "line one\n\nline two");
    }
}
