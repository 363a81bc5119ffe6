//! Vision analysis tool — delegates to a vision-capable model tier.
//!
//! Not in the trusted set: model output about an image still needs the
//! normal evidence gate.

use async_trait::async_trait;
use clarion_core::{ModelBackend, TierRequest, Tool, ToolError, ToolKind, ToolResult};
use std::sync::Arc;

pub struct VisionAnalysisTool {
    backend: Arc<dyn ModelBackend>,
}

impl VisionAnalysisTool {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for VisionAnalysisTool {
    fn kind(&self) -> ToolKind {
        ToolKind::VisionAnalysis
    }

    fn description(&self) -> &str {
        "Analyze an image (document scan, permit photo, form) and answer a question about it."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "image_url": {
                    "type": "string",
                    "description": "URL of the image to analyze"
                },
                "question": {
                    "type": "string",
                    "description": "What to determine about the image"
                }
            },
            "required": ["image_url", "question"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let image_url = arguments["image_url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'image_url' argument".into()))?;
        let question = arguments["question"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'question' argument".into()))?;

        let request = TierRequest::new(format!(
            "Analyze the image at {image_url} and answer: {question}"
        ));

        match self.backend.invoke(request).await {
            Ok(response) => Ok(ToolResult {
                call_id: String::new(),
                success: true,
                output: response.text,
                data: None,
            }),
            Err(e) => Ok(ToolResult {
                call_id: String::new(),
                success: false,
                output: format!("Error: vision analysis failed: {}", e),
                data: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clarion_core::{GatewayError, TierResponse, Usage};

    struct FixedBackend {
        reply: Option<String>,
    }

    #[async_trait]
    impl ModelBackend for FixedBackend {
        fn tier_id(&self) -> &str {
            "vision"
        }

        fn model(&self) -> &str {
            "vision-test"
        }

        async fn invoke(&self, _request: TierRequest) -> Result<TierResponse, GatewayError> {
            match &self.reply {
                Some(text) => Ok(TierResponse {
                    text: text.clone(),
                    usage: Usage::new(10, 5),
                    model: "vision-test".into(),
                }),
                None => Err(GatewayError::Timeout {
                    tier: "vision".into(),
                    timeout_secs: 60,
                }),
            }
        }
    }

    #[tokio::test]
    async fn analysis_returns_model_text() {
        let tool = VisionAnalysisTool::new(Arc::new(FixedBackend {
            reply: Some("The permit expires 2026-01-01.".into()),
        }));
        let result = tool
            .execute(serde_json::json!({
                "image_url": "https://example.com/permit.png",
                "question": "When does it expire?"
            }))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("expires"));
    }

    #[tokio::test]
    async fn backend_failure_is_error_marked() {
        let tool = VisionAnalysisTool::new(Arc::new(FixedBackend { reply: None }));
        let result = tool
            .execute(serde_json::json!({
                "image_url": "https://example.com/permit.png",
                "question": "When does it expire?"
            }))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.starts_with("Error:"));
    }

    #[tokio::test]
    async fn missing_arguments_rejected() {
        let tool = VisionAnalysisTool::new(Arc::new(FixedBackend { reply: None }));
        assert!(
            tool.execute(serde_json::json!({"image_url": "x"}))
                .await
                .is_err()
        );
    }
}
