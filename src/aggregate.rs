use serde::Serialize;

use crate::cost::{clamp_tokens, CostBreakdown, PricingMap};
use crate::types::{PromptSummary, StatWindow, TokenUsageStats, UsageRecord, UsageStatBucket};

/// A record together with what it would cost under the selected model.
#[derive(Debug, Clone, Serialize)]
pub struct PricedRecord<'a> {
    #[serde(flatten)]
    pub record: &'a UsageRecord,
    pub cost: CostBreakdown,
}

/// Totals over a set of records, all priced under one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordAggregate {
    pub record_count: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub cost: CostBreakdown,
    pub average_cost_per_record: f64,
}

impl RecordAggregate {
    pub fn total_cost(&self) -> f64 {
        self.cost.total_cost
    }

    fn accumulate(&mut self, input_tokens: i64, output_tokens: i64, cost: &CostBreakdown) {
        self.record_count += 1;
        self.total_input_tokens = self.total_input_tokens.saturating_add(clamp_tokens(input_tokens));
        self.total_output_tokens = self
            .total_output_tokens
            .saturating_add(clamp_tokens(output_tokens));
        self.cost.accumulate(cost);
    }

    fn finish(mut self) -> Self {
        self.average_cost_per_record = if self.record_count == 0 {
            0.0
        } else {
            self.cost.total_cost / self.record_count as f64
        };
        self
    }
}

/// Price every record with the selected model, never the model it was
/// originally run on.
pub fn price_records<'a>(
    records: &'a [UsageRecord],
    model: &str,
    pricing: &dyn PricingMap,
) -> Vec<PricedRecord<'a>> {
    let entry = pricing.lookup(model);
    records
        .iter()
        .map(|record| PricedRecord {
            record,
            cost: CostBreakdown::from_tokens(entry, record.input_tokens, record.output_tokens),
        })
        .collect()
}

pub fn aggregate(records: &[UsageRecord], model: &str, pricing: &dyn PricingMap) -> RecordAggregate {
    summarize(&price_records(records, model, pricing))
}

/// Reduce already-priced rows, so a view that shows both rows and totals
/// prices each record once.
pub fn summarize(rows: &[PricedRecord<'_>]) -> RecordAggregate {
    let mut agg = RecordAggregate::default();
    for row in rows {
        agg.accumulate(row.record.input_tokens, row.record.output_tokens, &row.cost);
    }
    agg.finish()
}

/// One usage-stat window with its cost attached.
#[derive(Debug, Clone, Serialize)]
pub struct PricedBucket {
    pub window: StatWindow,
    pub label: &'static str,
    #[serde(flatten)]
    pub bucket: UsageStatBucket,
    pub cost: CostBreakdown,
    pub cost_per_request: f64,
}

/// Today / 7-day / month / lifetime cards, in that order.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub buckets: Vec<PricedBucket>,
}

pub fn price_stats(stats: &TokenUsageStats, model: &str, pricing: &dyn PricingMap) -> UsageSummary {
    let entry = pricing.lookup(model);
    let buckets = StatWindow::ALL
        .iter()
        .map(|&window| {
            let bucket = stats.bucket(window).clone();
            let cost = CostBreakdown::from_tokens(entry, bucket.input_tokens, bucket.output_tokens);
            // Request counts come from upstream as-is.
            let cost_per_request = if bucket.total_requests > 0 {
                cost.total_cost / bucket.total_requests as f64
            } else {
                0.0
            };
            PricedBucket {
                window,
                label: window.label(),
                bucket,
                cost,
                cost_per_request,
            }
        })
        .collect();
    UsageSummary { buckets }
}

#[derive(Debug, Clone, Serialize)]
pub struct PricedPrompt<'a> {
    #[serde(flatten)]
    pub summary: &'a PromptSummary,
    pub cost: CostBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptCostPage<'a> {
    pub rows: Vec<PricedPrompt<'a>>,
    pub total: CostBreakdown,
}

pub fn price_prompts<'a>(
    prompts: &'a [PromptSummary],
    model: &str,
    pricing: &dyn PricingMap,
) -> PromptCostPage<'a> {
    let entry = pricing.lookup(model);
    let mut total = CostBreakdown::default();
    let rows = prompts
        .iter()
        .map(|summary| {
            let cost = CostBreakdown::from_tokens(
                entry,
                summary.total_input_tokens,
                summary.total_output_tokens,
            );
            total.accumulate(&cost);
            PricedPrompt { summary, cost }
        })
        .collect();
    PromptCostPage { rows, total }
}
