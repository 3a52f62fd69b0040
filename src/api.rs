//! Payloads exchanged with the trace services.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FetchFailure;

pub const DEFAULT_LOOKBACK_SECS: i64 = 3600;
pub const MAX_PAGE_SIZE: u32 = 500;
pub const FALLBACK_PAGE_SIZE: u32 = 100;

/// Identifiers are matched case-insensitively by the store.
pub fn normalize_trace_id(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortKey {
    #[default]
    #[serde(rename = "duration")]
    Duration,
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "spancount")]
    SpanCount,
}

impl SortKey {
    pub fn title(self) -> &'static str {
        match self {
            SortKey::Duration => "Duration",
            SortKey::Start => "Start",
            SortKey::SpanCount => "Spans",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    #[serde(rename = "ASC")]
    Asc,
    #[default]
    #[serde(rename = "DESC")]
    Desc,
}

impl SortOrder {
    pub fn flipped(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
}

impl DurationFilter {
    pub fn is_empty(&self) -> bool {
        self.gte.is_none() && self.lte.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub service: Vec<String>,
    #[serde(default)]
    pub operation: Vec<String>,
    #[serde(default)]
    pub status: Vec<String>,
    #[serde(
        rename = "durationMs",
        default,
        skip_serializing_if = "DurationFilter::is_empty"
    )]
    pub duration_ms: DurationFilter,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    #[serde(default)]
    pub by: SortKey,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    #[serde(default)]
    pub size: u32,
}

/// Body of `POST /api/traces/list`. Times are unix seconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub from: i64,
    #[serde(default)]
    pub to: i64,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub sort: SortSpec,
    #[serde(default)]
    pub page: PageSpec,
}

impl SearchRequest {
    /// Fills in what the list service would otherwise default: an hour-long
    /// window ending at `now` and a page size within `1..=500`.
    pub fn normalized(mut self, now: i64) -> Self {
        if self.to == 0 {
            self.to = now;
        }
        if self.from == 0 {
            self.from = self.to - DEFAULT_LOOKBACK_SECS;
        }
        if self.page.size == 0 || self.page.size > MAX_PAGE_SIZE {
            self.page.size = FALLBACK_PAGE_SIZE;
        }
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum TraceStatus {
    #[default]
    Ok,
    Error,
    Other(String),
}

impl TraceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TraceStatus::Ok => "OK",
            TraceStatus::Error => "ERROR",
            TraceStatus::Other(other) => other,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TraceStatus::Error)
    }
}

impl From<String> for TraceStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "OK" | "Ok" | "STATUS_CODE_OK" => TraceStatus::Ok,
            "ERROR" | "Error" | "STATUS_CODE_ERROR" => TraceStatus::Error,
            _ => TraceStatus::Other(value),
        }
    }
}

impl From<TraceStatus> for String {
    fn from(status: TraceStatus) -> Self {
        status.as_str().to_owned()
    }
}

impl Serialize for TraceStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TraceStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(TraceStatus::from).unwrap_or_default())
    }
}

impl fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the trace finder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummary {
    pub trace_id: String,
    #[serde(default)]
    pub start_ts: String,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub root_service: String,
    #[serde(default)]
    pub root_operation: String,
    #[serde(default)]
    pub status: TraceStatus,
    #[serde(default)]
    pub span_count: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub svc_breakdown: Vec<(String, f64)>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<TraceSummary>,
}

/// `GET /api/traces/{traceId}`. Span records stay untyped until validated.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceDetail {
    #[serde(default)]
    pub trace_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub spans: Vec<Value>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A completion candidate with its recent occurrence count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Suggestion {
    pub value: String,
    pub count: u64,
}

const SUGGESTION_VALUE_FIELDS: [&str; 3] = ["ServiceName", "SpanName", "Val"];

/// Parses newline-delimited suggestion rows. Counts may be quoted.
pub fn parse_suggestions(body: &str) -> Result<Vec<Suggestion>, FetchFailure> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let row: serde_json::Map<String, Value> = serde_json::from_str(line)?;
            let value = SUGGESTION_VALUE_FIELDS
                .iter()
                .find_map(|field| row.get(*field).and_then(Value::as_str))
                .ok_or_else(|| FetchFailure::Decode(format!("suggestion row without value: {line}")))?;
            let count = match row.get("c") {
                Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
                Some(Value::String(s)) => s.parse().unwrap_or(0),
                _ => 0,
            };
            Ok(Suggestion {
                value: value.to_owned(),
                count,
            })
        })
        .collect()
}
