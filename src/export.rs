//! Export of every dashboard view as one workbook, one worksheet per view.
//!
//! Sheet assembly is pure and works on a [`DashboardView`]; cells are turned
//! into display strings only here. Writing is a separate step.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use thiserror::Error;

use crate::cost::clamp_tokens;
use crate::dashboard::DashboardView;
use crate::output::{format_money, format_thousands, format_tokens};

/// Decimal places for per-row cost cells.
const ROW_PLACES: usize = 6;
/// Decimal places for totals and averages.
const TOTAL_PLACES: usize = 4;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build workbook: {0}")]
    Workbook(#[from] XlsxError),
}

/// One labelled table of display strings.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: &'static str,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Lowercase, with every run of other characters collapsed to one '-'.
pub fn model_slug(model: &str) -> String {
    let mut slug = String::with_capacity(model.len());
    for c in model.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// `token-costs-claude-3-5-sonnet-2025-01-15.xlsx`
pub fn export_name(model: &str, date: NaiveDate) -> String {
    format!("token-costs-{}-{}.xlsx", model_slug(model), date.format("%Y-%m-%d"))
}

fn records_sheet(view: &DashboardView<'_>) -> Option<Sheet> {
    let rows = view.records.as_ref()?;
    let m = view.model;
    Some(Sheet {
        name: "records",
        headers: vec![
            "ID".to_string(),
            "Agent".to_string(),
            "Prompt".to_string(),
            "Output".to_string(),
            "Original Model".to_string(),
            "Input Tokens".to_string(),
            "Output Tokens".to_string(),
            "Total Tokens".to_string(),
            format!("Input Cost ({m})"),
            format!("Output Cost ({m})"),
            format!("Total Cost ({m})"),
            "Timestamp".to_string(),
        ],
        rows: rows
            .iter()
            .map(|row| {
                let r = row.record;
                vec![
                    r.id.clone(),
                    r.agent_name.clone(),
                    r.input_data.clone(),
                    r.output_data.preview().unwrap_or_default(),
                    r.original_model.clone(),
                    format_tokens(r.input_tokens),
                    format_tokens(r.output_tokens),
                    format_thousands(
                        clamp_tokens(r.input_tokens).saturating_add(clamp_tokens(r.output_tokens)),
                    ),
                    format_money(row.cost.input_cost, ROW_PLACES),
                    format_money(row.cost.output_cost, ROW_PLACES),
                    format_money(row.cost.total_cost, ROW_PLACES),
                    r.timestamp.clone(),
                ]
            })
            .collect(),
    })
}

// Always present, so an export is never empty; header only without records.
fn cost_summary_sheet(view: &DashboardView<'_>) -> Sheet {
    let m = view.model;
    let rows = match view.aggregate.as_ref() {
        Some(agg) => vec![
            vec!["Records".to_string(), format_thousands(agg.record_count as u64)],
            vec![
                "Total Input Tokens".to_string(),
                format_thousands(agg.total_input_tokens),
            ],
            vec![
                "Total Output Tokens".to_string(),
                format_thousands(agg.total_output_tokens),
            ],
            vec![
                "Total Input Cost".to_string(),
                format_money(agg.cost.input_cost, TOTAL_PLACES),
            ],
            vec![
                "Total Output Cost".to_string(),
                format_money(agg.cost.output_cost, TOTAL_PLACES),
            ],
            vec![
                "Total Cost".to_string(),
                format_money(agg.total_cost(), TOTAL_PLACES),
            ],
            vec![
                "Average Cost per Request".to_string(),
                format_money(agg.average_cost_per_record, TOTAL_PLACES),
            ],
        ],
        None => Vec::new(),
    };
    Sheet {
        name: "cost_summary",
        headers: vec!["Metric".to_string(), format!("Value ({m})")],
        rows,
    }
}

fn prompt_summary_sheet(view: &DashboardView<'_>) -> Option<Sheet> {
    let page = view.prompts.as_ref()?;
    let m = view.model;
    let mut rows: Vec<Vec<String>> = page
        .rows
        .iter()
        .map(|row| {
            let s = row.summary;
            vec![
                s.prompt_id.clone(),
                s.prompt.clone().unwrap_or_default(),
                s.agent_count.to_string(),
                format_tokens(s.total_input_tokens),
                format_tokens(s.total_output_tokens),
                format_tokens(s.total_tokens),
                format_money(row.cost.total_cost, ROW_PLACES),
                s.timestamp.clone().unwrap_or_default(),
            ]
        })
        .collect();
    rows.push(vec![
        "TOTAL".to_string(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        format_money(page.total.total_cost, TOTAL_PLACES),
        String::new(),
    ]);
    Some(Sheet {
        name: "prompt_summary",
        headers: vec![
            "Prompt ID".to_string(),
            "Prompt".to_string(),
            "Agents".to_string(),
            "Input Tokens".to_string(),
            "Output Tokens".to_string(),
            "Total Tokens".to_string(),
            format!("Cost ({m})"),
            "Timestamp".to_string(),
        ],
        rows,
    })
}

fn prompt_breakdown_sheet(view: &DashboardView<'_>) -> Option<Sheet> {
    let b = view.breakdown.as_ref()?;
    let m = view.model;
    let mut rows: Vec<Vec<String>> = b
        .agents
        .iter()
        .map(|(name, agent)| {
            vec![
                b.prompt_id.clone(),
                name.clone(),
                format_tokens(agent.tokens.input_tokens),
                format_tokens(agent.tokens.output_tokens),
                format_tokens(agent.tokens.total_tokens),
                format_money(agent.cost.input_cost, ROW_PLACES),
                format_money(agent.cost.output_cost, ROW_PLACES),
                format_money(agent.cost.total_cost, ROW_PLACES),
            ]
        })
        .collect();
    rows.push(vec![
        b.prompt_id.clone(),
        "TOTAL".to_string(),
        format_tokens(b.summary.total_input_tokens),
        format_tokens(b.summary.total_output_tokens),
        format_tokens(b.summary.total_tokens),
        format_money(b.totals.input_cost, ROW_PLACES),
        format_money(b.totals.output_cost, ROW_PLACES),
        format_money(b.totals.total_cost, ROW_PLACES),
    ]);
    Some(Sheet {
        name: "prompt_breakdown",
        headers: vec![
            "Prompt ID".to_string(),
            "Agent".to_string(),
            "Input Tokens".to_string(),
            "Output Tokens".to_string(),
            "Total Tokens".to_string(),
            format!("Input Cost ({m})"),
            format!("Output Cost ({m})"),
            format!("Total Cost ({m})"),
        ],
        rows,
    })
}

fn usage_summary_sheet(view: &DashboardView<'_>) -> Option<Sheet> {
    let usage = view.usage.as_ref()?;
    let m = view.model;
    Some(Sheet {
        name: "usage_summary",
        headers: vec![
            "Period".to_string(),
            "Input Tokens".to_string(),
            "Output Tokens".to_string(),
            "Total Tokens".to_string(),
            "Requests".to_string(),
            format!("Input Cost ({m})"),
            format!("Output Cost ({m})"),
            format!("Total Cost ({m})"),
            format!("Cost per Request ({m})"),
        ],
        rows: usage
            .buckets
            .iter()
            .map(|b| {
                vec![
                    b.label.to_string(),
                    format_tokens(b.bucket.input_tokens),
                    format_tokens(b.bucket.output_tokens),
                    format_tokens(b.bucket.total_tokens),
                    format_tokens(b.bucket.total_requests),
                    format_money(b.cost.input_cost, TOTAL_PLACES),
                    format_money(b.cost.output_cost, TOTAL_PLACES),
                    format_money(b.cost.total_cost, TOTAL_PLACES),
                    format_money(b.cost_per_request, TOTAL_PLACES),
                ]
            })
            .collect(),
    })
}

/// The cost summary plus every sheet the view has data for; other sections
/// without data are left out.
pub fn assemble(view: &DashboardView<'_>) -> Vec<Sheet> {
    [
        records_sheet(view),
        Some(cost_summary_sheet(view)),
        prompt_summary_sheet(view),
        prompt_breakdown_sheet(view),
        usage_summary_sheet(view),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Render sheets into an xlsx workbook held in memory.
pub fn encode(sheets: &[Sheet]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name)?;
        for (col, title) in sheet.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, title.as_str(), &header)?;
        }
        for (row, cells) in sheet.rows.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                worksheet.write_string(row as u32 + 1, col as u16, cell.as_str())?;
            }
        }
        worksheet.set_freeze_panes(1, 0)?;
        worksheet.autofit();
    }
    workbook.save_to_buffer()
}

/// Assemble the view and write it to `root` as one workbook. Returns the
/// workbook path.
pub fn export(view: &DashboardView<'_>, root: &Path, date: NaiveDate) -> Result<PathBuf, ExportError> {
    let sheets = assemble(view);
    let data = encode(&sheets)?;
    fs::create_dir_all(root).map_err(|source| ExportError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let path = root.join(export_name(view.model, date));
    fs::write(&path, data).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    tracing::info!(path = %path.display(), sheets = sheets.len(), "export written");
    Ok(path)
}
