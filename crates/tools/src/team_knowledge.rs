//! Team knowledge tool — internal directory lookup.
//!
//! Answers "who handles X" questions from a structured directory.
//! Trusted: a successful hit stands on its own without retrieval.

use async_trait::async_trait;
use clarion_core::{Tool, ToolError, ToolKind, ToolResult};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TeamMember {
    pub name: String,
    pub role: String,
    pub expertise: Vec<String>,
    pub contact: String,
}

pub struct TeamKnowledgeTool {
    directory: Vec<TeamMember>,
}

impl TeamKnowledgeTool {
    pub fn new() -> Self {
        Self {
            directory: default_directory(),
        }
    }

    pub fn with_directory(directory: Vec<TeamMember>) -> Self {
        Self { directory }
    }
}

impl Default for TeamKnowledgeTool {
    fn default() -> Self {
        Self::new()
    }
}

fn member(name: &str, role: &str, expertise: &[&str], contact: &str) -> TeamMember {
    TeamMember {
        name: name.into(),
        role: role.into(),
        expertise: expertise.iter().map(|s| s.to_string()).collect(),
        contact: contact.into(),
    }
}

fn default_directory() -> Vec<TeamMember> {
    vec![
        member("Ayu Lestari", "Immigration Lead", &["kitas", "visa", "work permit", "immigration"], "ayu@team.example"),
        member("Budi Santoso", "Tax Advisor", &["tax", "npwp", "vat", "withholding"], "budi@team.example"),
        member("Clara Wijaya", "Corporate Secretary", &["incorporation", "pt pma", "licensing"], "clara@team.example"),
        member("Dewi Pratiwi", "Client Success", &["onboarding", "billing", "escalation"], "dewi@team.example"),
    ]
}

#[async_trait]
impl Tool for TeamKnowledgeTool {
    fn kind(&self) -> ToolKind {
        ToolKind::TeamKnowledge
    }

    fn description(&self) -> &str {
        "Look up team members by name or area of expertise. Use for 'who handles X' questions."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "topic": {
                    "type": "string",
                    "description": "A person's name or a topic, e.g. 'tax' or 'Ayu'"
                }
            },
            "required": ["topic"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let topic = arguments["topic"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'topic' argument".into()))?;
        let needle = topic.to_lowercase();

        let matches: Vec<&TeamMember> = self
            .directory
            .iter()
            .filter(|m| {
                m.name.to_lowercase().contains(&needle)
                    || m.role.to_lowercase().contains(&needle)
                    || m.expertise.iter().any(|e| needle.contains(e) || e.contains(&needle))
            })
            .collect();

        if matches.is_empty() {
            return Ok(ToolResult {
                call_id: String::new(),
                success: false,
                output: format!("Error: no team member found for '{}'", topic),
                data: None,
            });
        }

        let output = matches
            .iter()
            .map(|m| format!("{} — {} ({})", m.name, m.role, m.contact))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output,
            data: Some(serde_json::json!({ "members": matches })),
        })
    }
}
