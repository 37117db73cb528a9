use converse_core::config::{ModelPrice, PricingConfig};
use converse_core::{CostRecord, TokenUsage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

const CROSS_REGION_PREFIXES: &[&str] = &["us.", "eu.", "apac.", "global."];

const DEFAULT_PRICE: ModelPrice = ModelPrice::new(0.0008, 0.0032);

// USD per 1000 tokens, on-demand.
const BUILTIN_PRICES: &[(&str, ModelPrice)] = &[
    ("amazon.nova-micro-v1:0", ModelPrice::new(0.000035, 0.00014)),
    ("amazon.nova-lite-v1:0", ModelPrice::new(0.00006, 0.00024)),
    ("amazon.nova-pro-v1:0", ModelPrice::new(0.0008, 0.0032)),
    ("amazon.nova-premier-v1:0", ModelPrice::new(0.0025, 0.0125)),
    (
        "anthropic.claude-3-haiku-20240307-v1:0",
        ModelPrice::new(0.00025, 0.00125),
    ),
    (
        "anthropic.claude-3-5-haiku-20241022-v1:0",
        ModelPrice::new(0.0008, 0.004),
    ),
    (
        "anthropic.claude-3-5-sonnet-20240620-v1:0",
        ModelPrice::new(0.003, 0.015),
    ),
    (
        "anthropic.claude-3-5-sonnet-20241022-v2:0",
        ModelPrice::new(0.003, 0.015),
    ),
    (
        "anthropic.claude-3-7-sonnet-20250219-v1:0",
        ModelPrice::new(0.003, 0.015),
    ),
];

#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    prices: HashMap<String, ModelPrice>,
    default: ModelPrice,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PriceTable {
    pub fn builtin() -> Self {
        Self {
            prices: BUILTIN_PRICES
                .iter()
                .map(|(model, price)| (model.to_string(), *price))
                .collect(),
            default: DEFAULT_PRICE,
        }
    }

    /// Built-in prices overlaid with configured ones.
    pub fn from_config(config: &PricingConfig) -> Self {
        let mut table = Self::builtin();
        for (model, price) in &config.models {
            table.prices.insert(strip_region_prefix(model).to_string(), *price);
        }
        if let Some(default) = config.default {
            table.default = default;
        }
        table
    }

    pub fn price_for(&self, model_id: &str) -> ModelPrice {
        self.prices
            .get(model_id)
            .or_else(|| self.prices.get(strip_region_prefix(model_id)))
            .copied()
            .unwrap_or(self.default)
    }

    pub fn cost(&self, usage: &TokenUsage, model_id: &str) -> f64 {
        let price = self.price_for(model_id);
        (usage.input_tokens as f64 / 1000.0) * price.input
            + (usage.output_tokens as f64 / 1000.0) * price.output
    }
}

fn strip_region_prefix(model_id: &str) -> &str {
    CROSS_REGION_PREFIXES
        .iter()
        .find_map(|prefix| model_id.strip_prefix(prefix))
        .unwrap_or(model_id)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_requests: u64,
    pub cumulative_cost_estimate: f64,
}

/// Process-wide token and cost accumulator. One lock guards each
/// read-modify-write so concurrent completions never lose updates.
#[derive(Debug, Default)]
pub struct UsageTracker {
    prices: PriceTable,
    stats: Mutex<UsageStats>,
}

impl UsageTracker {
    pub fn new(prices: PriceTable) -> Self {
        Self {
            prices,
            stats: Mutex::new(UsageStats::default()),
        }
    }

    pub fn record(&self, usage: &TokenUsage, model_id: &str) -> CostRecord {
        let request_cost = self.prices.cost(usage, model_id);
        let mut stats = self
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        stats.total_input_tokens += usage.input_tokens;
        stats.total_output_tokens += usage.output_tokens;
        stats.total_requests += 1;
        stats.cumulative_cost_estimate += request_cost;

        debug!(
            "Recorded {} input / {} output tokens for {} (${:.6})",
            usage.input_tokens, usage.output_tokens, model_id, request_cost
        );
        CostRecord {
            request_cost,
            cumulative_cost: stats.cumulative_cost_estimate,
            total_requests: stats.total_requests,
        }
    }

    pub fn stats(&self) -> UsageStats {
        *self
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }
}
