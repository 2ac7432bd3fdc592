//! Per-model price table and running cost accumulation.

use crate::types::TokenUsage;
use std::collections::HashMap;

/// Assumed completion tokens per row when projecting cost before a run.
pub const AVERAGE_OUTPUT_TOKENS: u64 = 400;

/// USD prices per 1000 tokens for one model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    /// Price per 1000 prompt tokens.
    pub input_per_1k: f64,
    /// Price per 1000 completion tokens.
    pub output_per_1k: f64,
}

/// Static mapping from model identifier to prices. Read-only for a run.
#[derive(Debug, Clone)]
pub struct CostTable {
    prices: HashMap<String, ModelPrice>,
}

impl CostTable {
    /// An empty table; every model is untracked.
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    /// Register a price for a model identifier.
    pub fn insert(&mut self, model: impl Into<String>, price: ModelPrice) {
        self.prices.insert(model.into(), price);
    }

    /// Look up the price for a model identifier.
    pub fn price(&self, model: &str) -> Option<ModelPrice> {
        self.prices.get(model).copied()
    }
}

impl Default for CostTable {
    /// The built-in price table.
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert(
            "gpt-3.5-turbo",
            ModelPrice {
                input_per_1k: 0.0010,
                output_per_1k: 0.0020,
            },
        );
        table.insert(
            "gpt-4",
            ModelPrice {
                input_per_1k: 0.03,
                output_per_1k: 0.06,
            },
        );
        table
    }
}

/// Accumulates the estimated USD cost of a run, one completion at a time.
#[derive(Debug)]
pub struct CostTracker<'a> {
    table: &'a CostTable,
    total: f64,
}

impl<'a> CostTracker<'a> {
    /// Start a tracker over the given price table.
    pub fn new(table: &'a CostTable) -> Self {
        Self { table, total: 0.0 }
    }

    /// Fold one completion's token usage into the total.
    ///
    /// A model absent from the table contributes nothing; cost is silently
    /// untracked rather than failing the run.
    pub fn record(&mut self, model: &str, usage: &TokenUsage) {
        if let Some(price) = self.table.price(model) {
            self.total += (usage.prompt_tokens as f64 * price.input_per_1k
                + usage.completion_tokens as f64 * price.output_per_1k)
                / 1000.0;
        }
    }

    /// The accumulated USD total so far.
    pub fn total(&self) -> f64 {
        self.total
    }
}

/// Project the cost of extracting `rows` rows before running anything.
///
/// Assumes [`AVERAGE_OUTPUT_TOKENS`] completion tokens per row. Returns 0.0
/// for models absent from the table.
pub fn projected_cost(table: &CostTable, model: &str, rows: u64, avg_prompt_tokens: u64) -> f64 {
    let mut tracker = CostTracker::new(table);
    let usage = TokenUsage {
        prompt_tokens: rows * avg_prompt_tokens,
        completion_tokens: rows * AVERAGE_OUTPUT_TOKENS,
    };
    tracker.record(model, &usage);
    tracker.total()
}
