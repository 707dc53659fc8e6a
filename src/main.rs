mod aggregate;
mod breakdown;
mod cli;
mod client;
mod config;
mod cost;
mod dashboard;
mod export;
mod output;
mod pricing;
mod tui;
mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, OutputFormat};
use client::ApiClient;
use cost::PricingMap;
use dashboard::DashboardState;

fn init_tracing(cli: &Cli, command: &Command) {
    let default = if cli.cli { "error" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // The dashboard owns the terminal; anything written to it would tear the frame.
    if matches!(command, Command::Dash) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::sink)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.effective_command();
    init_tracing(&cli, &command);

    let config = config::load_config();
    let pricing = pricing::load_pricing(config.pricing_file.as_deref())
        .context("failed to load pricing table")?;
    tracing::debug!(revision = pricing.revision(), models = pricing.len(), "pricing loaded");

    let model = config.model(cli.model.as_deref());
    if !pricing.contains(&model) {
        tracing::warn!(model = %model, "selected model is not in the pricing table");
    }

    let base_url = config.api_base_url(
        cli.api_url.as_deref(),
        std::env::var(config::API_URL_ENV).ok(),
    );
    let source = ApiClient::new(&base_url, config.timeout());
    let mut state = DashboardState::new(&model, cli.page, config.page_size(cli.page_size));
    tracing::debug!(base_url = %base_url, model = %state.model, "starting");

    match command {
        Command::Models => {
            println!("Pricing revision {}", pricing.revision());
            println!("{}", output::models_table(&pricing, &state.model));
        }
        Command::Records => {
            state.load_records(&source);
            let view = state.view(&pricing);
            emit(&cli, &view, || {
                output::print_tables([
                    ("Agent Logs", output::records_table(&view, cli.breakdown)),
                    ("Cost Summary", output::summary_table(&view)),
                ]);
                if let Some(page) = state.records.data() {
                    let unpriced = pricing.unpriced_models(&page.data);
                    if !unpriced.is_empty() && !cli.cli {
                        eprintln!("Logged with unpriced models: {}", unpriced.join(", "));
                    }
                }
            })?;
        }
        Command::Stats => {
            state.load_stats(&source);
            let view = state.view(&pricing);
            emit(&cli, &view, || {
                output::print_tables([("Usage Summary", output::stats_table(&view))]);
            })?;
        }
        Command::Prompts => {
            state.load_prompts(&source);
            let view = state.view(&pricing);
            emit(&cli, &view, || {
                output::print_tables([("Prompts", output::prompts_table(&view))]);
            })?;
        }
        Command::Prompt { ref id } => {
            state.search(&source, id);
            let view = state.view(&pricing);
            emit(&cli, &view, || {
                output::print_tables([(
                    "Prompt Cost Breakdown",
                    output::breakdown_table(&view),
                )]);
                if let Some(b) = &view.breakdown {
                    if !b.is_consistent() {
                        eprintln!(
                            "Note: per-agent costs sum to {}, backend totals give {}",
                            output::format_money(b.sum_of_parts().total_cost, 6),
                            output::format_money(b.totals.total_cost, 6),
                        );
                    }
                }
            })?;
        }
        Command::Export { ref out, ref prompt } => {
            state.load_all(&source);
            if let Some(id) = prompt {
                state.search(&source, id);
            }
            let view = state.view(&pricing);
            output::print_failures(&view, cli.cli);
            let root = out.clone().unwrap_or_else(config::export_root);
            let path = export::export(&view, &root, chrono::Local::now().date_naive())
                .context("export failed")?;
            println!("Exported to {}", path.display());
        }
        Command::Dash => {
            tui::run(state, &pricing, Arc::new(source), config::export_root())?;
        }
    }

    Ok(())
}

/// Print `view` as JSON, or run `tables` for the table format. Failed
/// sections go to stderr (unless `--cli`) and do not change the exit status.
fn emit(cli: &Cli, view: &dashboard::DashboardView<'_>, tables: impl FnOnce()) -> Result<()> {
    match cli.format {
        OutputFormat::Json => output::print_json(view)?,
        OutputFormat::Table => {
            if !cli.cli {
                println!("{}\n", output::pricing_line(view));
            }
            tables();
        }
    }
    output::print_failures(view, cli.cli);
    Ok(())
}
