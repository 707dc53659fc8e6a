use std::collections::HashSet;

use serde::Serialize;

use crate::types::UsageRecord;

/// Prices are quoted per this many tokens.
pub const TOKENS_PER_PRICE_UNIT: f64 = 1000.0;

/// Price per 1000 tokens for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricingEntry {
    pub input: f64,
    pub output: f64,
}

/// What a token count costs under one pricing entry.
///
/// Values are full precision; rounding happens only when rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

/// Negative counts come from a misbehaving caller; they price as zero.
pub fn clamp_tokens(tokens: i64) -> u64 {
    tokens.max(0) as u64
}

impl CostBreakdown {
    /// Price a token pair. A missing entry yields an all-zero breakdown.
    pub fn from_tokens(entry: Option<&PricingEntry>, input_tokens: i64, output_tokens: i64) -> Self {
        let Some(p) = entry else {
            return Self::default();
        };
        let input_cost = clamp_tokens(input_tokens) as f64 / TOKENS_PER_PRICE_UNIT * p.input;
        let output_cost = clamp_tokens(output_tokens) as f64 / TOKENS_PER_PRICE_UNIT * p.output;
        Self {
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }

    /// Add another breakdown component-wise. Totals are summed as totals,
    /// not rebuilt from the summed parts.
    pub fn accumulate(&mut self, other: &CostBreakdown) {
        self.input_cost += other.input_cost;
        self.output_cost += other.output_cost;
        self.total_cost += other.total_cost;
    }
}

/// Trait for looking up pricing by model name.
pub trait PricingMap {
    /// Exact, case-sensitive match.
    fn get(&self, model: &str) -> Option<&PricingEntry>;

    /// Called whenever a lookup misses.
    fn report_missing(&self, model: &str) {
        tracing::warn!(model, "no pricing entry for model, costs shown as zero");
    }

    fn lookup(&self, model: &str) -> Option<&PricingEntry> {
        let entry = self.get(model);
        if entry.is_none() {
            self.report_missing(model);
        }
        entry
    }

    fn compute_cost(&self, input_tokens: i64, output_tokens: i64, model: &str) -> CostBreakdown {
        CostBreakdown::from_tokens(self.lookup(model), input_tokens, output_tokens)
    }

    /// Models that records were logged with but that have no pricing.
    fn unpriced_models(&self, records: &[UsageRecord]) -> Vec<String> {
        let mut models: Vec<String> = records
            .iter()
            .map(|r| r.original_model.clone())
            .filter(|m| !m.is_empty())
            .collect::<HashSet<_>>()
            .into_iter()
            .filter(|m| self.get(m).is_none())
            .collect();
        models.sort();
        models
    }
}
