use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "tkcost",
    about = "What agent token usage would cost under any LLM pricing model"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Pricing model to cost usage with (exact name, see `tkcost models`)
    #[arg(long, short, global = true)]
    pub model: Option<String>,

    /// Backend base URL (overrides TKCOST_API_BASE_URL and config)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Page of records / prompt summaries to fetch
    #[arg(long, global = true, default_value = "1")]
    pub page: u32,

    /// Rows per page
    #[arg(long, global = true)]
    pub page_size: Option<u32>,

    /// Output format: table (default), json
    #[arg(long, global = true, default_value = "table")]
    pub format: OutputFormat,

    /// Show input and output cost next to each total
    #[arg(long, global = true)]
    pub breakdown: bool,

    /// Suppress diagnostics on stderr (for scripting)
    #[arg(long, global = true)]
    pub cli: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Per-record costs with totals (default)
    Records,
    /// Usage summary: today, last 7 days, last month, overall
    Stats,
    /// Prompt summary list
    Prompts,
    /// Per-agent cost matrix for one prompt
    Prompt {
        /// Prompt ID to look up
        id: String,
    },
    /// List the pricing table
    Models,
    /// Write every view as CSV sheets
    Export {
        /// Parent directory for the export (default: Downloads)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also include the breakdown of this prompt
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Interactive dashboard
    Dash,
}

#[derive(ValueEnum, Debug, Clone, PartialEq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl Cli {
    pub fn effective_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Records)
    }
}
