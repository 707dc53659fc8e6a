use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Backends emit `null` for missing counters; treat it like 0.
fn null_as_zero<'de, D>(d: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(d)?.unwrap_or(0))
}

fn null_as_empty<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// One agent call as logged by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub agent_name: String,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub input_tokens: i64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub output_tokens: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub original_model: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub input_data: String,
    #[serde(default)]
    pub output_data: OutputData,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub timestamp: String,
}

/// Accepts RFC 3339 as well as the zone-less ISO form Python backends emit,
/// which is read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Local));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some(naive.and_utc().with_timezone(&Local))
}

/// The free-form `output_data` payload of a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OutputData {
    Text(String),
    Structured(serde_json::Value),
    #[default]
    Absent,
}

impl OutputData {
    /// Single-line rendering for tables and exports.
    pub fn preview(&self) -> Option<String> {
        match self {
            OutputData::Text(s) => Some(s.clone()),
            OutputData::Structured(v) => Some(v.to_string()),
            OutputData::Absent => None,
        }
    }
}

impl<'de> Deserialize<'de> for OutputData {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<serde_json::Value>::deserialize(d)? {
            None | Some(serde_json::Value::Null) => OutputData::Absent,
            Some(serde_json::Value::String(s)) => OutputData::Text(s),
            Some(other) => OutputData::Structured(other),
        })
    }
}

impl Serialize for OutputData {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            OutputData::Text(text) => s.serialize_str(text),
            OutputData::Structured(v) => v.serialize(s),
            OutputData::Absent => s.serialize_none(),
        }
    }
}

/// Paginated envelope shared by `/agent-logs` and `/prompts-summary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// Token and request counts for one time window, aggregated upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStatBucket {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub input_tokens: i64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub output_tokens: i64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_tokens: i64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_requests: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatWindow {
    Today,
    Last7Days,
    LastMonth,
    Overall,
}

impl StatWindow {
    pub const ALL: [StatWindow; 4] = [
        StatWindow::Today,
        StatWindow::Last7Days,
        StatWindow::LastMonth,
        StatWindow::Overall,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StatWindow::Today => "Today",
            StatWindow::Last7Days => "Last 7 Days",
            StatWindow::LastMonth => "Last Month",
            StatWindow::Overall => "Overall",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsageStats {
    #[serde(default)]
    pub today: UsageStatBucket,
    #[serde(default)]
    pub last_7_days: UsageStatBucket,
    #[serde(default)]
    pub last_month: UsageStatBucket,
    #[serde(default)]
    pub overall: UsageStatBucket,
}

impl TokenUsageStats {
    pub fn bucket(&self, window: StatWindow) -> &UsageStatBucket {
        match window {
            StatWindow::Today => &self.today,
            StatWindow::Last7Days => &self.last_7_days,
            StatWindow::LastMonth => &self.last_month,
            StatWindow::Overall => &self.overall,
        }
    }
}

/// One row of `/prompts-summary`: a prompt and the tokens all agents spent on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSummary {
    pub prompt_id: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub agent_count: i64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_input_tokens: i64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_output_tokens: i64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_tokens: i64,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentTokens {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub input_tokens: i64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub output_tokens: i64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_tokens: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixSummary {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_input_tokens: i64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_output_tokens: i64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_tokens: i64,
}

/// `/prompt-tokens/{id}`: per-agent token usage for one prompt plus the
/// backend's own totals row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTokenMatrix {
    pub prompt_id: String,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentTokens>,
    #[serde(default)]
    pub summary: MatrixSummary,
}
