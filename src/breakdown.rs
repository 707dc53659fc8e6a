use std::collections::BTreeMap;

use serde::Serialize;

use crate::cost::{CostBreakdown, PricingMap};
use crate::types::{AgentTokens, MatrixSummary, PromptTokenMatrix};

/// Relative tolerance when comparing the two ways of totalling a prompt.
const CONSISTENCY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Serialize)]
pub struct AgentCost {
    pub tokens: AgentTokens,
    pub cost: CostBreakdown,
}

/// Per-agent cost matrix for one prompt.
#[derive(Debug, Clone, Serialize)]
pub struct PromptBreakdown {
    pub prompt_id: String,
    pub agents: BTreeMap<String, AgentCost>,
    pub summary: MatrixSummary,
    /// Priced directly from the backend's summary row.
    pub totals: CostBreakdown,
}

pub fn breakdown(matrix: &PromptTokenMatrix, model: &str, pricing: &dyn PricingMap) -> PromptBreakdown {
    let entry = pricing.lookup(model);
    let agents = matrix
        .agents
        .iter()
        .map(|(name, tokens)| {
            let cost = CostBreakdown::from_tokens(entry, tokens.input_tokens, tokens.output_tokens);
            (
                name.clone(),
                AgentCost {
                    tokens: tokens.clone(),
                    cost,
                },
            )
        })
        .collect();

    let totals = CostBreakdown::from_tokens(
        entry,
        matrix.summary.total_input_tokens,
        matrix.summary.total_output_tokens,
    );

    PromptBreakdown {
        prompt_id: matrix.prompt_id.clone(),
        agents,
        summary: matrix.summary.clone(),
        totals,
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= CONSISTENCY_TOLERANCE * a.abs().max(b.abs()).max(f64::MIN_POSITIVE)
}

impl PromptBreakdown {
    /// The per-agent costs added up.
    pub fn sum_of_parts(&self) -> CostBreakdown {
        let mut sum = CostBreakdown::default();
        for agent in self.agents.values() {
            sum.accumulate(&agent.cost);
        }
        sum
    }

    /// Whether the summary-row totals agree with the sum of the agent rows.
    /// A mismatch means the backend's summary row does not add up.
    pub fn is_consistent(&self) -> bool {
        let parts = self.sum_of_parts();
        if self.totals.total_cost == 0.0 && parts.total_cost == 0.0 {
            return true;
        }
        close(self.totals.input_cost, parts.input_cost)
            && close(self.totals.output_cost, parts.output_cost)
            && close(self.totals.total_cost, parts.total_cost)
    }
}
