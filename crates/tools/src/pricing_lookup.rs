//! Pricing lookup tool — service price table.
//!
//! Looks up the listed price for a service by name or fuzzy substring.
//! A successful lookup is self-evidencing: this tool is in the trusted
//! set and its output does not require corroborating retrieval.

use async_trait::async_trait;
use clarion_core::{Tool, ToolError, ToolKind, ToolResult};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PriceEntry {
    pub service: String,
    pub price_usd: f64,
    pub unit: String,
    pub notes: String,
}

pub struct PricingLookupTool {
    entries: Vec<PriceEntry>,
}

impl PricingLookupTool {
    /// Registry with the standard service catalog.
    pub fn new() -> Self {
        Self {
            entries: default_catalog(),
        }
    }

    /// Registry with an operator-supplied catalog.
    pub fn with_catalog(entries: Vec<PriceEntry>) -> Self {
        Self { entries }
    }

    fn lookup(&self, service: &str) -> Vec<&PriceEntry> {
        let needle = service.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.service.to_lowercase().contains(&needle))
            .collect()
    }
}

impl Default for PricingLookupTool {
    fn default() -> Self {
        Self::new()
    }
}

fn entry(service: &str, price_usd: f64, unit: &str, notes: &str) -> PriceEntry {
    PriceEntry {
        service: service.into(),
        price_usd,
        unit: unit.into(),
        notes: notes.into(),
    }
}

fn default_catalog() -> Vec<PriceEntry> {
    vec![
        entry("KITAS work permit processing", 1200.0, "per application", "Includes sponsor letter and immigration filing."),
        entry("KITAS investor permit processing", 1500.0, "per application", "Requires proof of capital deposit."),
        entry("Company incorporation (PT PMA)", 2800.0, "per company", "Foreign-owned limited company, end to end."),
        entry("Tax registration (NPWP)", 150.0, "per registration", "Personal or corporate tax number."),
        entry("Monthly tax compliance", 250.0, "per month", "VAT and withholding filings."),
        entry("Annual tax return preparation", 600.0, "per return", "Corporate annual filing."),
        entry("Document translation (sworn)", 18.0, "per page", "Indonesian to English or reverse."),
    ]
}

#[async_trait]
impl Tool for PricingLookupTool {
    fn kind(&self) -> ToolKind {
        ToolKind::PricingLookup
    }

    fn description(&self) -> &str {
        "Look up the listed price for a service. Matches by exact name or substring."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "service": {
                    "type": "string",
                    "description": "Service name or fragment, e.g. 'KITAS' or 'tax registration'"
                }
            },
            "required": ["service"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let service = arguments["service"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'service' argument".into()))?;

        let matches = self.lookup(service);
        if matches.is_empty() {
            return Ok(ToolResult {
                call_id: String::new(),
                success: false,
                output: format!("Error: no price listed for '{}'", service),
                data: None,
            });
        }

        let output = matches
            .iter()
            .map(|e| format!("{}: ${:.2} {} — {}", e.service, e.price_usd, e.unit, e.notes))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output,
            data: Some(serde_json::json!({ "matches": matches })),
        })
    }
}
