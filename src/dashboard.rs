use serde::Serialize;

use crate::aggregate::{
    price_prompts, price_records, price_stats, summarize, PricedRecord, PromptCostPage,
    RecordAggregate, UsageSummary,
};
use crate::breakdown::{breakdown, PromptBreakdown};
use crate::client::{DataSource, FetchError};
use crate::cost::{PricingEntry, PricingMap};
use crate::pricing::PricingTable;
use crate::types::{Page, PromptSummary, PromptTokenMatrix, TokenUsageStats, UsageRecord};

/// Load state of one independently fetched part of the dashboard.
#[derive(Debug, Clone)]
pub enum Section<T> {
    Idle,
    Loading,
    Loaded(T),
    Failed(String),
}

impl<T> Section<T> {
    fn from_result(name: &str, result: Result<T, FetchError>) -> Self {
        match result {
            Ok(data) => Section::Loaded(data),
            Err(e) => {
                // Reported to the user through `DashboardView::failures`.
                tracing::debug!(section = name, error = %e, "fetch failed");
                Section::Failed(e.to_string())
            }
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Section::Loaded(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Section::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Section::Loading)
    }
}

/// Token handed out per prompt search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTicket(u64);

/// Orders prompt searches so only the newest one's answer is shown.
#[derive(Debug, Default)]
pub struct SearchSequencer {
    latest: u64,
}

impl SearchSequencer {
    pub fn issue(&mut self) -> SearchTicket {
        self.latest += 1;
        SearchTicket(self.latest)
    }

    pub fn is_current(&self, ticket: SearchTicket) -> bool {
        ticket.0 == self.latest
    }
}

/// Everything fetched so far plus the selected model. Derived values are
/// never stored here; see [`DashboardState::view`].
pub struct DashboardState {
    pub model: String,
    pub page: u32,
    pub page_size: u32,
    pub records: Section<Page<UsageRecord>>,
    pub stats: Section<TokenUsageStats>,
    pub prompts: Section<Page<PromptSummary>>,
    pub prompt_tokens: Section<PromptTokenMatrix>,
    pub search_query: Option<String>,
    sequencer: SearchSequencer,
}

impl DashboardState {
    pub fn new(model: &str, page: u32, page_size: u32) -> Self {
        Self {
            model: model.to_string(),
            page: page.max(1),
            page_size: page_size.max(1),
            records: Section::Idle,
            stats: Section::Idle,
            prompts: Section::Idle,
            prompt_tokens: Section::Idle,
            search_query: None,
            sequencer: SearchSequencer::default(),
        }
    }

    pub fn set_model(&mut self, model: &str) {
        self.model = model.to_string();
    }

    /// Step through the pricing table. Returns the newly selected model.
    pub fn cycle_model(&mut self, pricing: &PricingTable, step: isize) -> &str {
        if let Some(next) = pricing.neighbour(&self.model, step) {
            let next = next.to_string();
            self.set_model(&next);
        }
        &self.model
    }

    pub fn apply_records(&mut self, page: u32, result: Result<Page<UsageRecord>, FetchError>) {
        // A slow response for a page the user already left.
        if page != self.page {
            tracing::debug!(page, current = self.page, "dropping records for old page");
            return;
        }
        self.records = Section::from_result("records", result);
    }

    pub fn apply_stats(&mut self, result: Result<TokenUsageStats, FetchError>) {
        self.stats = Section::from_result("stats", result);
    }

    pub fn apply_prompts(&mut self, result: Result<Page<PromptSummary>, FetchError>) {
        self.prompts = Section::from_result("prompts", result);
    }

    pub fn load_records(&mut self, source: &dyn DataSource) {
        self.records = Section::Loading;
        let result = source.agent_logs(self.page, self.page_size);
        self.apply_records(self.page, result);
    }

    pub fn load_stats(&mut self, source: &dyn DataSource) {
        self.stats = Section::Loading;
        self.apply_stats(source.token_usage_stats());
    }

    pub fn load_prompts(&mut self, source: &dyn DataSource) {
        self.prompts = Section::Loading;
        self.apply_prompts(source.prompts_summary(self.page, self.page_size));
    }

    /// Fetch records, stats and the prompt summary concurrently. Each
    /// lands in its own section whatever the others do.
    pub fn load_all(&mut self, source: &dyn DataSource) {
        self.records = Section::Loading;
        self.stats = Section::Loading;
        self.prompts = Section::Loading;

        let (page, page_size) = (self.page, self.page_size);
        let (records, (stats, prompts)) = rayon::join(
            || source.agent_logs(page, page_size),
            || {
                rayon::join(
                    || source.token_usage_stats(),
                    || source.prompts_summary(page, page_size),
                )
            },
        );

        self.apply_records(page, records);
        self.apply_stats(stats);
        self.apply_prompts(prompts);
    }

    /// Start a prompt search. Any earlier search still in flight is
    /// superseded by the returned ticket.
    pub fn begin_search(&mut self, prompt_id: &str) -> SearchTicket {
        self.search_query = Some(prompt_id.to_string());
        self.prompt_tokens = Section::Loading;
        self.sequencer.issue()
    }

    /// Apply a search response. Returns false when the response belongs to a
    /// superseded search and was discarded.
    pub fn finish_search(
        &mut self,
        ticket: SearchTicket,
        result: Result<PromptTokenMatrix, FetchError>,
    ) -> bool {
        if !self.sequencer.is_current(ticket) {
            tracing::debug!(?ticket, "discarding stale prompt search response");
            return false;
        }
        self.prompt_tokens = Section::from_result("prompt_tokens", result);
        true
    }

    pub fn search(&mut self, source: &dyn DataSource, prompt_id: &str) {
        let ticket = self.begin_search(prompt_id);
        let result = source.prompt_tokens(prompt_id);
        self.finish_search(ticket, result);
    }

    pub fn clear_search(&mut self) {
        // Bump the sequence so an in-flight answer is ignored.
        self.sequencer.issue();
        self.search_query = None;
        self.prompt_tokens = Section::Idle;
    }

    /// Price every loaded section under the selected model.
    pub fn view<'a>(&'a self, pricing: &dyn PricingMap) -> DashboardView<'a> {
        let model = self.model.as_str();
        let pricing_entry = pricing.get(model).copied();

        let records = self
            .records
            .data()
            .map(|page| price_records(&page.data, model, pricing));
        let aggregate = records.as_deref().map(summarize);

        let mut failures = Vec::new();
        for (section, error) in [
            ("records", self.records.error()),
            ("stats", self.stats.error()),
            ("prompts", self.prompts.error()),
            ("prompt_tokens", self.prompt_tokens.error()),
        ] {
            if let Some(message) = error {
                failures.push(SectionFailure {
                    section,
                    message: message.to_string(),
                });
            }
        }

        DashboardView {
            model,
            pricing_entry,
            page: self.records.data().map(|p| PageInfo::of(p)),
            records,
            aggregate,
            usage: self.stats.data().map(|s| price_stats(s, model, pricing)),
            prompts: self
                .prompts
                .data()
                .map(|p| price_prompts(&p.data, model, pricing)),
            breakdown: self
                .prompt_tokens
                .data()
                .map(|m| breakdown(m, model, pricing)),
            failures,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionFailure {
    pub section: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageInfo {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl PageInfo {
    fn of<T>(page: &Page<T>) -> Self {
        Self {
            total: page.total,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages,
        }
    }
}

/// A consistent snapshot of every derived value for one model. `None`
/// means the section has no data (not loaded, or its fetch failed).
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView<'a> {
    pub model: &'a str,
    pub pricing_entry: Option<PricingEntry>,
    pub page: Option<PageInfo>,
    pub records: Option<Vec<PricedRecord<'a>>>,
    pub aggregate: Option<RecordAggregate>,
    pub usage: Option<UsageSummary>,
    pub prompts: Option<PromptCostPage<'a>>,
    pub breakdown: Option<PromptBreakdown>,
    pub failures: Vec<SectionFailure>,
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cost::tests::{approx, record};
    use crate::types::{AgentTokens, MatrixSummary, UsageStatBucket};

    /// In-memory backend; any endpoint can be made to fail.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub fail_records: bool,
        pub fail_stats: bool,
        pub fail_prompts: bool,
        pub calls: AtomicUsize,
    }

    fn down(endpoint: &str) -> FetchError {
        FetchError::Status {
            endpoint: endpoint.to_string(),
            status: 500,
        }
    }

    pub(crate) fn matrix(prompt_id: &str) -> PromptTokenMatrix {
        PromptTokenMatrix {
            prompt_id: prompt_id.to_string(),
            agents: [
                (
                    "planner".to_string(),
                    AgentTokens {
                        input_tokens: 1000,
                        output_tokens: 200,
                        total_tokens: 1200,
                    },
                ),
                (
                    "writer".to_string(),
                    AgentTokens {
                        input_tokens: 470,
                        output_tokens: 430,
                        total_tokens: 900,
                    },
                ),
            ]
            .into_iter()
            .collect(),
            summary: MatrixSummary {
                total_input_tokens: 1470,
                total_output_tokens: 630,
                total_tokens: 2100,
            },
        }
    }

    impl DataSource for FakeSource {
        fn agent_logs(&self, page: u32, page_size: u32) -> Result<Page<UsageRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_records {
                return Err(down("/agent-logs"));
            }
            Ok(Page {
                total: 2,
                page,
                page_size,
                total_pages: 1,
                data: vec![record("1", "agent-001", 875, 375), record("4", "agent-001", 1176, 504)],
            })
        }

        fn token_usage_stats(&self) -> Result<TokenUsageStats, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_stats {
                return Err(down("/token-usage-stats"));
            }
            Ok(TokenUsageStats {
                today: UsageStatBucket {
                    input_tokens: 2051,
                    output_tokens: 879,
                    total_tokens: 2930,
                    total_requests: 2,
                },
                ..Default::default()
            })
        }

        fn prompts_summary(&self, page: u32, page_size: u32) -> Result<Page<PromptSummary>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_prompts {
                return Err(down("/prompts-summary"));
            }
            Ok(Page {
                total: 1,
                page,
                page_size,
                total_pages: 1,
                data: vec![PromptSummary {
                    prompt_id: "prompt-42".into(),
                    prompt: Some("Summarize quarterly financial report".into()),
                    agent_count: 2,
                    total_input_tokens: 1470,
                    total_output_tokens: 630,
                    total_tokens: 2100,
                    timestamp: None,
                }],
            })
        }

        fn prompt_tokens(&self, prompt_id: &str) -> Result<PromptTokenMatrix, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if prompt_id == "missing" {
                return Err(FetchError::Status {
                    endpoint: format!("/prompt-tokens/{prompt_id}"),
                    status: 404,
                });
            }
            Ok(matrix(prompt_id))
        }
    }

    #[test]
    fn load_all_fills_every_section() {
        let source = FakeSource::default();
        let mut state = DashboardState::new("Gemini 2.0 Flash", 1, 50);
        state.load_all(&source);

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(state.records.data().is_some());
        assert!(state.stats.data().is_some());
        assert!(state.prompts.data().is_some());
        assert!(matches!(state.prompt_tokens, Section::Idle));
    }

    #[test]
    fn one_failed_fetch_leaves_the_others_intact() {
        let source = FakeSource {
            fail_stats: true,
            ..Default::default()
        };
        let mut state = DashboardState::new("Gemini 2.0 Flash", 1, 50);
        state.load_all(&source);

        assert!(state.stats.error().is_some());
        assert!(!state.stats.is_loading());

        let pricing = PricingTable::builtin();
        let view = state.view(&pricing);
        assert!(view.usage.is_none());
        assert_eq!(view.records.as_ref().map(Vec::len), Some(2));
        assert!(view.prompts.is_some());
        assert_eq!(view.failures.len(), 1);
        assert_eq!(view.failures[0].section, "stats");
    }

    #[test]
    fn every_fetch_failing_still_yields_a_view() {
        let source = FakeSource {
            fail_records: true,
            fail_stats: true,
            fail_prompts: true,
            ..Default::default()
        };
        let mut state = DashboardState::new("Gemini 2.0 Flash", 1, 50);
        state.load_all(&source);
        let view = state.view(&PricingTable::builtin());
        assert!(view.records.is_none());
        assert!(view.aggregate.is_none());
        assert_eq!(view.failures.len(), 3);
    }

    #[test]
    fn stale_search_response_is_discarded() {
        let mut state = DashboardState::new("Claude 3.5 Sonnet", 1, 50);
        let first = state.begin_search("old");
        let second = state.begin_search("new");

        assert!(state.finish_search(second, Ok(matrix("new"))));
        assert!(!state.finish_search(first, Ok(matrix("old"))));

        let shown = state.prompt_tokens.data().unwrap();
        assert_eq!(shown.prompt_id, "new");
        assert_eq!(state.search_query.as_deref(), Some("new"));
    }

    #[test]
    fn stale_failure_does_not_clobber_newer_result() {
        let mut state = DashboardState::new("Claude 3.5 Sonnet", 1, 50);
        let first = state.begin_search("slow");
        let second = state.begin_search("fast");
        state.finish_search(second, Ok(matrix("fast")));
        state.finish_search(first, Err(down("/prompt-tokens/slow")));
        assert!(state.prompt_tokens.error().is_none());
    }

    #[test]
    fn cleared_search_ignores_in_flight_answer() {
        let mut state = DashboardState::new("Claude 3.5 Sonnet", 1, 50);
        let ticket = state.begin_search("p");
        state.clear_search();
        assert!(!state.finish_search(ticket, Ok(matrix("p"))));
        assert!(matches!(state.prompt_tokens, Section::Idle));
    }

    #[test]
    fn failed_search_sets_only_its_section() {
        let source = FakeSource::default();
        let mut state = DashboardState::new("Claude 3.5 Sonnet", 1, 50);
        state.load_all(&source);
        state.search(&source, "missing");
        assert!(state.prompt_tokens.error().unwrap().contains("404"));
        assert!(state.records.data().is_some());
    }

    #[test]
    fn records_for_an_abandoned_page_are_dropped() {
        let source = FakeSource::default();
        let mut state = DashboardState::new("Claude 3.5 Sonnet", 1, 50);
        let late = source.agent_logs(1, 50);
        state.page = 2;
        state.records = Section::Loading;
        state.apply_records(1, late);
        assert!(state.records.is_loading());
    }

    #[test]
    fn model_switch_recomputes_every_derived_value() {
        let source = FakeSource::default();
        let pricing = PricingTable::builtin();
        let mut state = DashboardState::new("Gemini 2.0 Flash", 1, 50);
        state.load_all(&source);
        state.search(&source, "prompt-42");

        let gemini_total = state.view(&pricing).aggregate.unwrap().total_cost();

        state.set_model("Claude 3.5 Sonnet");
        let view = state.view(&pricing);
        let sonnet = PricingTable::builtin();
        let expected: f64 = [(875, 375), (1176, 504)]
            .iter()
            .map(|&(i, o)| sonnet.compute_cost(i, o, "Claude 3.5 Sonnet").total_cost)
            .sum();

        assert_eq!(view.model, "Claude 3.5 Sonnet");
        assert!(approx(view.aggregate.as_ref().unwrap().total_cost(), expected));
        assert_ne!(view.aggregate.as_ref().unwrap().total_cost(), gemini_total);
        for row in view.records.as_ref().unwrap() {
            assert_eq!(
                row.cost,
                sonnet.compute_cost(row.record.input_tokens, row.record.output_tokens, "Claude 3.5 Sonnet")
            );
        }
        let usage = view.usage.as_ref().unwrap();
        assert_eq!(
            usage.buckets[0].cost,
            sonnet.compute_cost(2051, 879, "Claude 3.5 Sonnet")
        );
        let b = view.breakdown.as_ref().unwrap();
        assert!(approx(b.totals.total_cost, 0.01386));
        assert!(b.is_consistent());
        assert!(approx(view.prompts.as_ref().unwrap().total.total_cost, 0.01386));
    }

    #[test]
    fn cycle_model_walks_table_order() {
        let pricing = PricingTable::builtin();
        let mut state = DashboardState::new("GPT-4o", 1, 50);
        assert_eq!(state.cycle_model(&pricing, 1), "GPT-4o mini");
        assert_eq!(state.cycle_model(&pricing, -1), "GPT-4o");
    }

    #[test]
    fn view_with_unknown_model_is_all_zero() {
        let source = FakeSource::default();
        let mut state = DashboardState::new("GPT-4", 1, 50);
        state.load_all(&source);
        let view = state.view(&PricingTable::builtin());
        assert!(view.pricing_entry.is_none());
        let agg = view.aggregate.unwrap();
        assert_eq!(agg.total_cost(), 0.0);
        assert_eq!(agg.total_input_tokens, 2051);
    }
}
