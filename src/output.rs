use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, CellAlignment, ContentArrangement, Table};

use crate::cost::{clamp_tokens, CostBreakdown, TOKENS_PER_PRICE_UNIT};
use crate::dashboard::DashboardView;
use crate::pricing::PricingTable;

/// "1234567" -> "1,234,567"
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Dollar amount with a fixed number of decimals and grouped integer part.
pub fn format_money(amount: f64, places: usize) -> String {
    let fixed = format!("{:.*}", places, amount.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };
    let grouped = int_part
        .parse::<u64>()
        .map(format_thousands)
        .unwrap_or_else(|_| int_part.to_string());
    let sign = if amount < 0.0 && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(f) => format!("{sign}${grouped}.{f}"),
        None => format!("{sign}${grouped}"),
    }
}

pub fn format_tokens(n: i64) -> String {
    format_thousands(clamp_tokens(n))
}

/// Cut to `max` characters, marking the cut with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    let single_line = s.replace(['\n', '\r'], " ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let mut out: String = single_line.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn format_timestamp(raw: &str) -> String {
    match crate::types::parse_timestamp(raw) {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "N/A".to_string(),
    }
}

fn new_table(header: Vec<String>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header.into_iter().map(Cell::new));
    table
}

fn num(s: String) -> Cell {
    Cell::new(s).set_alignment(CellAlignment::Right)
}

fn cost_tooltip(cost: &CostBreakdown) -> String {
    format!(
        "{} + {}",
        format_money(cost.input_cost, 4),
        format_money(cost.output_cost, 4)
    )
}

pub fn records_table(view: &DashboardView<'_>, breakdown: bool) -> Option<Table> {
    let rows = view.records.as_ref()?;
    let mut header = vec![
        "Agent".to_string(),
        "Prompt".to_string(),
        "Original Model".to_string(),
        "Input".to_string(),
        "Output".to_string(),
        "Total".to_string(),
        format!("Cost ({})", view.model),
    ];
    if breakdown {
        header.push("Input + Output".to_string());
    }
    header.push("Timestamp".to_string());

    let mut table = new_table(header);
    for row in rows {
        let r = row.record;
        let mut cells = vec![
            Cell::new(&r.agent_name),
            Cell::new(truncate(&r.input_data, 40)),
            Cell::new(&r.original_model),
            num(format_tokens(r.input_tokens)),
            num(format_tokens(r.output_tokens)),
            num(format_thousands(
                clamp_tokens(r.input_tokens).saturating_add(clamp_tokens(r.output_tokens)),
            )),
            num(format_money(row.cost.total_cost, 4)),
        ];
        if breakdown {
            cells.push(num(cost_tooltip(&row.cost)));
        }
        cells.push(Cell::new(format_timestamp(&r.timestamp)));
        table.add_row(cells);
    }

    if let Some(agg) = &view.aggregate {
        let mut cells = vec![
            Cell::new("TOTAL"),
            Cell::new(""),
            Cell::new(""),
            num(format_thousands(agg.total_input_tokens)),
            num(format_thousands(agg.total_output_tokens)),
            num(format_thousands(
                agg.total_input_tokens.saturating_add(agg.total_output_tokens),
            )),
            num(format_money(agg.total_cost(), 4)),
        ];
        if breakdown {
            cells.push(num(cost_tooltip(&agg.cost)));
        }
        cells.push(Cell::new(""));
        table.add_row(cells);
    }
    Some(table)
}

/// The three summary cards under the record table.
pub fn summary_table(view: &DashboardView<'_>) -> Option<Table> {
    let agg = view.aggregate.as_ref()?;
    let mut table = new_table(vec![
        "Total Input Tokens".to_string(),
        "Total Output Tokens".to_string(),
        "Average Cost per Request".to_string(),
        format!("Total Cost ({})", view.model),
    ]);
    table.add_row(vec![
        num(format_thousands(agg.total_input_tokens)),
        num(format_thousands(agg.total_output_tokens)),
        num(format_money(agg.average_cost_per_record, 4)),
        num(format_money(agg.total_cost(), 4)),
    ]);
    Some(table)
}

pub fn stats_table(view: &DashboardView<'_>) -> Option<Table> {
    let usage = view.usage.as_ref()?;
    let mut table = new_table(vec![
        "Period".to_string(),
        "Input".to_string(),
        "Output".to_string(),
        "Total Tokens".to_string(),
        "Requests".to_string(),
        format!("Cost ({})", view.model),
        "Cost / Request".to_string(),
    ]);
    for b in &usage.buckets {
        table.add_row(vec![
            Cell::new(b.label),
            num(format_tokens(b.bucket.input_tokens)),
            num(format_tokens(b.bucket.output_tokens)),
            num(format_tokens(b.bucket.total_tokens)),
            num(format_tokens(b.bucket.total_requests)),
            num(format_money(b.cost.total_cost, 4)),
            num(format_money(b.cost_per_request, 4)),
        ]);
    }
    Some(table)
}

pub fn prompts_table(view: &DashboardView<'_>) -> Option<Table> {
    let page = view.prompts.as_ref()?;
    let mut table = new_table(vec![
        "Prompt ID".to_string(),
        "Prompt".to_string(),
        "Agents".to_string(),
        "Input".to_string(),
        "Output".to_string(),
        "Total".to_string(),
        format!("Cost ({})", view.model),
    ]);
    for row in &page.rows {
        let s = row.summary;
        table.add_row(vec![
            Cell::new(&s.prompt_id),
            Cell::new(truncate(s.prompt.as_deref().unwrap_or(""), 40)),
            num(s.agent_count.to_string()),
            num(format_tokens(s.total_input_tokens)),
            num(format_tokens(s.total_output_tokens)),
            num(format_tokens(s.total_tokens)),
            num(format_money(row.cost.total_cost, 4)),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL"),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        num(format_money(page.total.total_cost, 4)),
    ]);
    Some(table)
}

pub fn breakdown_table(view: &DashboardView<'_>) -> Option<Table> {
    let b = view.breakdown.as_ref()?;
    let mut table = new_table(vec![
        "Agent".to_string(),
        "Input".to_string(),
        "Output".to_string(),
        "Total".to_string(),
        "Input Cost".to_string(),
        "Output Cost".to_string(),
        format!("Cost ({})", view.model),
    ]);
    for (name, agent) in &b.agents {
        table.add_row(vec![
            Cell::new(name),
            num(format_tokens(agent.tokens.input_tokens)),
            num(format_tokens(agent.tokens.output_tokens)),
            num(format_tokens(agent.tokens.total_tokens)),
            num(format_money(agent.cost.input_cost, 6)),
            num(format_money(agent.cost.output_cost, 6)),
            num(format_money(agent.cost.total_cost, 6)),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL"),
        num(format_tokens(b.summary.total_input_tokens)),
        num(format_tokens(b.summary.total_output_tokens)),
        num(format_tokens(b.summary.total_tokens)),
        num(format_money(b.totals.input_cost, 6)),
        num(format_money(b.totals.output_cost, 6)),
        num(format_money(b.totals.total_cost, 6)),
    ]);
    Some(table)
}

/// Pricing table listing, with the selected model marked.
pub fn models_table(pricing: &PricingTable, selected: &str) -> Table {
    let mut table = new_table(vec![
        "".to_string(),
        "Model".to_string(),
        "Input / 1K".to_string(),
        "Output / 1K".to_string(),
        "Input / 1M".to_string(),
        "Output / 1M".to_string(),
    ]);
    for (name, entry) in pricing.iter() {
        table.add_row(vec![
            Cell::new(if name == selected { "*" } else { "" }),
            Cell::new(name),
            num(format!("${}", entry.input)),
            num(format!("${}", entry.output)),
            num(format_money(entry.input * TOKENS_PER_PRICE_UNIT, 2)),
            num(format_money(entry.output * TOKENS_PER_PRICE_UNIT, 2)),
        ]);
    }
    table
}

/// The picker's reminder of what one price unit buys.
pub fn pricing_line(view: &DashboardView<'_>) -> String {
    match view.pricing_entry {
        Some(p) => format!(
            "{}: input ${}/1K tokens ({}/1M), output ${}/1K tokens ({}/1M). 1000 tokens = ${} (input) or ${} (output)",
            view.model,
            p.input,
            format_money(p.input * TOKENS_PER_PRICE_UNIT, 2),
            p.output,
            format_money(p.output * TOKENS_PER_PRICE_UNIT, 2),
            p.input,
            p.output,
        ),
        None => format!("{}: no pricing data, costs shown as $0", view.model),
    }
}

/// One line per failed section; nothing when `quiet` (`--cli`).
pub fn failure_lines(view: &DashboardView<'_>, quiet: bool) -> Vec<String> {
    if quiet {
        return Vec::new();
    }
    view.failures
        .iter()
        .map(|f| format!("{} unavailable: {}", f.section, f.message))
        .collect()
}

/// Failed sections are reported on stderr; the rest of the output still prints.
pub fn print_failures(view: &DashboardView<'_>, quiet: bool) {
    for line in failure_lines(view, quiet) {
        eprintln!("{line}");
    }
}

pub fn print_tables(tables: impl IntoIterator<Item = (&'static str, Option<Table>)>) {
    for (title, table) in tables {
        if let Some(table) = table {
            println!("{title}");
            println!("{table}");
        }
    }
}

pub fn print_json(view: &DashboardView<'_>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(view)?);
    Ok(())
}
