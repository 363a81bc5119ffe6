//! Model pricing, used by the cascade's cumulative cost cap.
//!
//! All prices are USD per one million tokens. A model the table has
//! never heard of is charged at a conservative mid-range rate, so the
//! cost cap keeps binding even when tier configuration drifts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// USD cost of one invocation.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        let input = f64::from(input_tokens) * self.input_per_million;
        let output = f64::from(output_tokens) * self.output_per_million;
        (input + output) / 1_000_000.0
    }
}

/// Thread-safe pricing table with built-in defaults and overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
    fallback: ModelPricing,
}

const DEFAULT_PRICES: &[(&str, f64, f64)] = &[
    ("anthropic/claude-sonnet-4", 3.0, 15.0),
    ("anthropic/claude-3.5-haiku", 0.8, 4.0),
    ("openai/gpt-4o", 2.5, 10.0),
    ("openai/gpt-4o-mini", 0.15, 0.6),
    ("google/gemini-2.0-flash", 0.1, 0.4),
    ("meta-llama/llama-3.1-70b", 0.52, 0.75),
];

impl PricingTable {
    /// Table seeded with the models the default tier ladder uses.
    pub fn with_defaults() -> Self {
        let prices = DEFAULT_PRICES
            .iter()
            .map(|(model, input, output)| (model.to_string(), ModelPricing::new(*input, *output)))
            .collect();
        Self {
            prices: RwLock::new(prices),
            // Unknown models are charged like a mid-range model.
            fallback: ModelPricing::new(3.0, 15.0),
        }
    }

    /// Add or override a model's pricing.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(model.into(), pricing);
        }
    }

    /// Cost of invoking `model` with the given token counts.
    pub fn cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        let prices = match self.prices.read() {
            Ok(prices) => prices,
            Err(poisoned) => poisoned.into_inner(),
        };
        prices
            .get(model)
            .unwrap_or(&self.fallback)
            .cost(input_tokens, output_tokens)
    }

    /// Rough input-token estimate for a prompt whose invocation failed
    /// before usage was reported (~4 chars per token).
    pub fn estimate_prompt_tokens(prompt_chars: usize) -> u32 {
        (prompt_chars / 4).max(1) as u32
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_cost() {
        let table = PricingTable::with_defaults();
        // 1M input + 1M output of gpt-4o-mini.
        let cost = table.cost("openai/gpt-4o-mini", 1_000_000, 1_000_000);
        assert!((cost - 0.75).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_is_charged_the_fallback_rate() {
        let table = PricingTable::with_defaults();
        let cost = table.cost("mystery/model", 1_000_000, 0);
        assert!((cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn override_wins() {
        let table = PricingTable::with_defaults();
        table.set("local/llama", ModelPricing::new(0.0, 0.0));
        assert_eq!(table.cost("local/llama", 500_000, 500_000), 0.0);
    }

    #[test]
    fn prompt_token_estimate_is_never_zero() {
        assert_eq!(PricingTable::estimate_prompt_tokens(400), 100);
        assert_eq!(PricingTable::estimate_prompt_tokens(0), 1);
    }
}
