use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Row, Table},
    DefaultTerminal, Frame,
};

use crate::client::{DataSource, FetchError};
use crate::dashboard::{DashboardState, DashboardView, SearchTicket, Section};
use crate::output::{format_money, format_thousands, format_timestamp, format_tokens, pricing_line, truncate};
use crate::pricing::PricingTable;
use crate::types::{Page, PromptSummary, PromptTokenMatrix, TokenUsageStats, UsageRecord};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A finished fetch, delivered from its worker thread.
enum Msg {
    Records(u32, Result<Page<UsageRecord>, FetchError>),
    Stats(Result<TokenUsageStats, FetchError>),
    Prompts(Result<Page<PromptSummary>, FetchError>),
    PromptTokens(SearchTicket, Result<PromptTokenMatrix, FetchError>),
}

enum InputMode {
    Normal,
    Search(String),
}

struct App<'p> {
    state: DashboardState,
    pricing: &'p PricingTable,
    source: Arc<dyn DataSource>,
    tx: Sender<Msg>,
    rx: Receiver<Msg>,
    mode: InputMode,
    status: String,
    export_root: PathBuf,
}

impl<'p> App<'p> {
    fn new(
        state: DashboardState,
        pricing: &'p PricingTable,
        source: Arc<dyn DataSource>,
        export_root: PathBuf,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            state,
            pricing,
            source,
            tx,
            rx,
            mode: InputMode::Normal,
            status: String::new(),
            export_root,
        }
    }

    fn spawn<F>(&self, fetch: F)
    where
        F: FnOnce(&dyn DataSource) -> Msg + Send + 'static,
    {
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        thread::spawn(move || {
            // The receiver is gone only once the dashboard has quit.
            let _ = tx.send(fetch(source.as_ref()));
        });
    }

    fn fetch_records(&mut self) {
        self.state.records = Section::Loading;
        let (page, page_size) = (self.state.page, self.state.page_size);
        self.spawn(move |s| Msg::Records(page, s.agent_logs(page, page_size)));
    }

    fn fetch_all(&mut self) {
        self.fetch_records();
        self.state.stats = Section::Loading;
        self.spawn(|s| Msg::Stats(s.token_usage_stats()));
        self.state.prompts = Section::Loading;
        let (page, page_size) = (self.state.page, self.state.page_size);
        self.spawn(move |s| Msg::Prompts(s.prompts_summary(page, page_size)));
    }

    fn search(&mut self, prompt_id: String) {
        let ticket = self.state.begin_search(&prompt_id);
        self.spawn(move |s| Msg::PromptTokens(ticket, s.prompt_tokens(&prompt_id)));
    }

    fn apply(&mut self, msg: Msg) {
        match msg {
            Msg::Records(page, result) => self.state.apply_records(page, result),
            Msg::Stats(result) => self.state.apply_stats(result),
            Msg::Prompts(result) => self.state.apply_prompts(result),
            Msg::PromptTokens(ticket, result) => {
                self.state.finish_search(ticket, result);
            }
        }
    }

    fn drain(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            self.apply(msg);
        }
    }

    fn export(&mut self) {
        let view = self.state.view(self.pricing);
        self.status = match crate::export::export(&view, &self.export_root, Local::now().date_naive()) {
            Ok(path) => format!("Exported to {}", path.display()),
            Err(e) => format!("Export failed: {e}"),
        };
    }

    /// Returns true when the dashboard should quit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if let InputMode::Search(ref mut input) = self.mode {
            match key.code {
                KeyCode::Enter => {
                    let query = input.trim().to_string();
                    self.mode = InputMode::Normal;
                    if query.is_empty() {
                        self.state.clear_search();
                    } else {
                        self.search(query);
                    }
                }
                KeyCode::Esc => self.mode = InputMode::Normal,
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Char(c) => input.push(c),
                _ => {}
            }
            return false;
        }

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Left | KeyCode::Char('h') => {
                self.state.cycle_model(self.pricing, -1);
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.state.cycle_model(self.pricing, 1);
            }
            KeyCode::Char('/') => {
                self.mode = InputMode::Search(self.state.search_query.clone().unwrap_or_default());
            }
            KeyCode::Char('c') => self.state.clear_search(),
            KeyCode::Char('n') => {
                // Unknown page count while loading or after a failure: stay put.
                let last = self
                    .state
                    .records
                    .data()
                    .map_or(self.state.page, |p| p.total_pages.max(1));
                if self.state.page < last {
                    self.state.page += 1;
                    self.fetch_records();
                }
            }
            KeyCode::Char('p') if self.state.page > 1 => {
                self.state.page -= 1;
                self.fetch_records();
            }
            KeyCode::Char('r') => self.fetch_all(),
            KeyCode::Char('e') => self.export(),
            _ => {}
        }
        false
    }
}

pub fn run(
    state: DashboardState,
    pricing: &PricingTable,
    source: Arc<dyn DataSource>,
    export_root: PathBuf,
) -> Result<()> {
    let mut app = App::new(state, pricing, source, export_root);
    app.fetch_all();

    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, &mut app);
    ratatui::restore();
    result
}

fn event_loop(terminal: &mut DefaultTerminal, app: &mut App<'_>) -> Result<()> {
    loop {
        app.drain();
        terminal.draw(|frame| draw(frame, &*app))?;

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && app.handle_key(key) {
                    return Ok(());
                }
            }
        }
    }
}

fn header_style() -> Style {
    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
}

fn section_placeholder<T>(section: &Section<T>) -> &'static str {
    match section {
        Section::Idle => "",
        Section::Loading => "Loading…",
        Section::Loaded(_) => "No data available",
        Section::Failed(_) => "Failed to load",
    }
}

fn placeholder<T>(frame: &mut Frame, area: Rect, block: Block, section: &Section<T>) {
    let text = match section.error() {
        Some(e) => Line::from(Span::styled(
            format!("{}: {e}", section_placeholder(section)),
            Style::default().fg(Color::Red),
        )),
        None => Line::from(section_placeholder(section)),
    };
    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn draw(frame: &mut Frame, app: &App<'_>) {
    let view = app.state.view(app.pricing);
    let show_breakdown = app.state.search_query.is_some();

    let [title, stats, records, summary, breakdown, footer] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(7),
        Constraint::Min(6),
        Constraint::Length(3),
        Constraint::Length(if show_breakdown { 8 } else { 0 }),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    draw_title(frame, title, &view);
    draw_stats(frame, stats, app, &view);
    draw_records(frame, records, app, &view);
    draw_summary(frame, summary, &view);
    if show_breakdown {
        draw_breakdown(frame, breakdown, app, &view);
    }
    draw_footer(frame, footer, app);
}

fn draw_title(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let line = Line::from(vec![
        Span::styled("Model: ", header_style()),
        Span::raw(pricing_line(view)),
    ]);
    frame.render_widget(
        Paragraph::new(line).block(Block::bordered().title("Token Cost Calculator  ←/→ model")),
        area,
    );
}

fn draw_stats(frame: &mut Frame, area: Rect, app: &App<'_>, view: &DashboardView<'_>) {
    let block = Block::bordered().title("Usage Summary");
    let Some(usage) = &view.usage else {
        placeholder(frame, area, block, &app.state.stats);
        return;
    };
    let rows: Vec<Row> = usage
        .buckets
        .iter()
        .map(|b| {
            Row::new(vec![
                b.label.to_string(),
                format_tokens(b.bucket.total_tokens),
                format_tokens(b.bucket.total_requests),
                format_money(b.cost.total_cost, 4),
                format_money(b.cost_per_request, 4),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(14),
            Constraint::Length(10),
            Constraint::Length(14),
            Constraint::Length(14),
        ],
    )
    .header(Row::new(vec!["Period", "Tokens", "Requests", "Cost", "Cost/Req"]).style(header_style()))
    .block(block);
    frame.render_widget(table, area);
}

fn draw_records(frame: &mut Frame, area: Rect, app: &App<'_>, view: &DashboardView<'_>) {
    let title = match &view.page {
        Some(p) => format!(
            "Agent Logs  page {}/{}  ({} records)  n/p page",
            p.page,
            p.total_pages.max(1),
            format_thousands(p.total)
        ),
        None => "Agent Logs".to_string(),
    };
    let block = Block::bordered().title(title);
    let Some(records) = view.records.as_ref().filter(|r| !r.is_empty()) else {
        placeholder(frame, area, block, &app.state.records);
        return;
    };
    let rows: Vec<Row> = records
        .iter()
        .map(|row| {
            let r = row.record;
            Row::new(vec![
                truncate(&r.agent_name, 16),
                truncate(&r.input_data, 36),
                truncate(&r.original_model, 18),
                format_tokens(r.input_tokens),
                format_tokens(r.output_tokens),
                format_money(row.cost.total_cost, 4),
                format_timestamp(&r.timestamp),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(16),
            Constraint::Min(20),
            Constraint::Length(18),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(19),
        ],
    )
    .header(
        Row::new(vec!["Agent", "Prompt", "Original Model", "Input", "Output", "Cost", "Timestamp"])
            .style(header_style()),
    )
    .block(block);
    frame.render_widget(table, area);
}

fn draw_summary(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let text = match &view.aggregate {
        Some(agg) => format!(
            "Total cost {}   Input {}   Output {}   Avg/request {}",
            format_money(agg.total_cost(), 4),
            format_thousands(agg.total_input_tokens),
            format_thousands(agg.total_output_tokens),
            format_money(agg.average_cost_per_record, 4),
        ),
        None => format!("Total cost {}", format_money(0.0, 4)),
    };
    frame.render_widget(
        Paragraph::new(text).block(Block::bordered().title("Cost Summary")),
        area,
    );
}

fn draw_breakdown(frame: &mut Frame, area: Rect, app: &App<'_>, view: &DashboardView<'_>) {
    let query = app.state.search_query.as_deref().unwrap_or("");
    let block = Block::bordered().title(format!("Prompt {query}  (c clears)"));
    let Some(b) = &view.breakdown else {
        placeholder(frame, area, block, &app.state.prompt_tokens);
        return;
    };
    let mut rows: Vec<Row> = b
        .agents
        .iter()
        .map(|(name, agent)| {
            Row::new(vec![
                name.clone(),
                format_tokens(agent.tokens.input_tokens),
                format_tokens(agent.tokens.output_tokens),
                format_money(agent.cost.total_cost, 6),
            ])
        })
        .collect();
    let total_label = if b.is_consistent() { "TOTAL" } else { "TOTAL (mismatch)" };
    rows.push(
        Row::new(vec![
            total_label.to_string(),
            format_tokens(b.summary.total_input_tokens),
            format_tokens(b.summary.total_output_tokens),
            format_money(b.totals.total_cost, 6),
        ])
        .style(Style::default().add_modifier(Modifier::BOLD)),
    );
    let table = Table::new(
        rows,
        [
            Constraint::Min(16),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(14),
        ],
    )
    .header(Row::new(vec!["Agent", "Input", "Output", "Cost"]).style(header_style()))
    .block(block);
    frame.render_widget(table, area);
}

fn draw_footer(frame: &mut Frame, area: Rect, app: &App<'_>) {
    let line = match &app.mode {
        InputMode::Search(input) => Line::from(vec![
            Span::styled("Prompt ID: ", header_style()),
            Span::raw(format!("{input}_")),
        ]),
        InputMode::Normal if !app.status.is_empty() => Line::from(app.status.as_str()),
        InputMode::Normal => Line::from(Span::styled(
            "←/→ model  / search  n/p page  r reload  e export  q quit",
            Style::default().fg(Color::DarkGray),
        )),
    };
    frame.render_widget(Paragraph::new(line), area);
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyModifiers;

    use super::*;
    use crate::dashboard::tests::FakeSource;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app(pricing: &PricingTable) -> App<'_> {
        app_with(pricing, FakeSource::default())
    }

    fn app_with(pricing: &PricingTable, source: FakeSource) -> App<'_> {
        let state = DashboardState::new("GPT-4o", 1, 50);
        App::new(state, pricing, Arc::new(source), std::env::temp_dir())
    }

    fn type_text(app: &mut App<'_>, text: &str) {
        for c in text.chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
    }

    fn wait_for(app: &mut App<'_>, n: usize) {
        for _ in 0..n {
            let msg = app.rx.recv_timeout(Duration::from_secs(5)).unwrap();
            app.apply(msg);
        }
    }

    #[test]
    fn arrows_cycle_the_model() {
        let pricing = PricingTable::builtin();
        let mut app = app(&pricing);
        app.handle_key(key(KeyCode::Right));
        assert_eq!(app.state.model, "GPT-4o mini");
        app.handle_key(key(KeyCode::Left));
        app.handle_key(key(KeyCode::Left));
        assert_eq!(app.state.model, "Amazon Titan Lite");
    }

    #[test]
    fn fetch_all_fills_sections_from_workers() {
        let pricing = PricingTable::builtin();
        let mut app = app(&pricing);
        app.fetch_all();
        wait_for(&mut app, 3);
        assert!(app.state.records.data().is_some());
        assert!(app.state.stats.data().is_some());
        assert!(app.state.prompts.data().is_some());
    }

    #[test]
    fn search_input_submits_on_enter() {
        let pricing = PricingTable::builtin();
        let mut app = app(&pricing);
        app.handle_key(key(KeyCode::Char('/')));
        type_text(&mut app, "prompt-4x");
        app.handle_key(key(KeyCode::Backspace));
        type_text(&mut app, "2");
        assert!(!app.handle_key(key(KeyCode::Enter)));

        assert!(app.state.prompt_tokens.is_loading());
        wait_for(&mut app, 1);
        assert_eq!(app.state.prompt_tokens.data().unwrap().prompt_id, "prompt-42");
    }

    #[test]
    fn only_latest_search_is_shown() {
        let pricing = PricingTable::builtin();
        let mut app = app(&pricing);
        app.search("first".into());
        app.search("second".into());
        wait_for(&mut app, 2);
        assert_eq!(app.state.prompt_tokens.data().unwrap().prompt_id, "second");
    }

    #[test]
    fn q_quits_only_outside_search() {
        let pricing = PricingTable::builtin();
        let mut app = app(&pricing);
        app.handle_key(key(KeyCode::Char('/')));
        assert!(!app.handle_key(key(KeyCode::Char('q'))));
        app.handle_key(key(KeyCode::Esc));
        assert!(app.handle_key(key(KeyCode::Char('q'))));
    }

    #[test]
    fn next_page_needs_a_loaded_page() {
        let pricing = PricingTable::builtin();
        let mut app = app_with(
            &pricing,
            FakeSource {
                fail_records: true,
                ..Default::default()
            },
        );
        app.handle_key(key(KeyCode::Char('n')));
        assert_eq!(app.state.page, 1);

        app.fetch_all();
        wait_for(&mut app, 3);
        assert!(app.state.records.error().is_some());
        app.handle_key(key(KeyCode::Char('n')));
        app.handle_key(key(KeyCode::Char('n')));
        assert_eq!(app.state.page, 1);
    }

    #[test]
    fn next_page_stops_at_last_page() {
        let pricing = PricingTable::builtin();
        let mut app = app(&pricing);
        app.fetch_all();
        wait_for(&mut app, 3);
        // The fake backend reports a single page.
        app.handle_key(key(KeyCode::Char('n')));
        assert_eq!(app.state.page, 1);
    }

    #[test]
    fn paging_stops_at_first_page() {
        let pricing = PricingTable::builtin();
        let mut app = app(&pricing);
        app.handle_key(key(KeyCode::Char('p')));
        assert_eq!(app.state.page, 1);
    }
}
