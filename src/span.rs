//! Span records and the validator that turns the loosely typed records of a
//! trace detail payload into [`Span`]s.
//!
//! Validation never fails as a whole. Records missing a required field are
//! dropped and reported, duplicated ids keep their first occurrence, and an
//! end timestamp before the start is clamped to the start with the span
//! flagged as suspect.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Malformation, MalformedSpan};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub service: String,
    pub start_unix_nanos: i64,
    pub end_unix_nanos: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Set when the recorded end preceded the start and was clamped.
    #[serde(skip)]
    pub suspect: bool,
}

impl Span {
    pub fn new(
        span_id: impl Into<String>,
        service: impl Into<String>,
        name: impl Into<String>,
        start_unix_nanos: i64,
        end_unix_nanos: i64,
    ) -> Self {
        Self {
            span_id: span_id.into(),
            parent_span_id: None,
            name: name.into(),
            kind: None,
            service: service.into(),
            start_unix_nanos,
            end_unix_nanos,
            attributes: BTreeMap::new(),
            status_code: None,
            status_message: None,
            suspect: false,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent.into());
        self
    }

    pub fn duration_ns(&self) -> u64 {
        self.end_unix_nanos
            .saturating_sub(self.start_unix_nanos)
            .max(0) as u64
    }

    pub fn is_error(&self) -> bool {
        self.status_code
            .as_deref()
            .is_some_and(|code| code.eq_ignore_ascii_case("error") || code == "STATUS_CODE_ERROR")
    }
}

/// Result of one validation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatedSpans {
    pub spans: Vec<Span>,
    pub rejected: Vec<MalformedSpan>,
    /// Records dropped because an earlier record used the same `spanId`.
    pub duplicates: usize,
    /// Spans whose end was clamped to their start.
    pub suspect: usize,
}

impl ValidatedSpans {
    pub fn dropped(&self) -> usize {
        self.rejected.len() + self.duplicates
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

pub fn validate(records: &[Value]) -> ValidatedSpans {
    let mut out = ValidatedSpans::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let span = match parse_record(record) {
            Ok(span) => span,
            Err(reason) => {
                out.rejected.push(MalformedSpan { index, reason });
                continue;
            }
        };

        if !seen.insert(span.span_id.clone()) {
            out.duplicates += 1;
            continue;
        }
        if span.suspect {
            out.suspect += 1;
        }
        out.spans.push(span);
    }

    if out.dropped() > 0 || out.suspect > 0 {
        log::warn!(
            "span validation: kept {}, dropped {} malformed and {} duplicate, clamped {}",
            out.spans.len(),
            out.rejected.len(),
            out.duplicates,
            out.suspect
        );
    }

    out
}

fn parse_record(record: &Value) -> Result<Span, Malformation> {
    let Value::Object(map) = record else {
        return Err(Malformation::NotAnObject);
    };

    let span_id = required_str(map, "spanId")?;
    if span_id.is_empty() {
        return Err(Malformation::Missing("spanId"));
    }
    let name = required_str(map, "name")?;
    let service = required_str(map, "service")?;
    let start = required_timestamp(map, "startUnixNanos")?;
    let end = required_timestamp(map, "endUnixNanos")?;

    let parent_span_id = optional_str(map, "parentSpanId").filter(|p| !p.is_empty());

    Ok(Span {
        span_id: span_id.to_owned(),
        parent_span_id,
        name: name.to_owned(),
        kind: optional_str(map, "kind").filter(|k| !k.is_empty()),
        service: service.to_owned(),
        start_unix_nanos: start,
        end_unix_nanos: end.max(start),
        attributes: attributes(map.get("attributes")),
        status_code: optional_str(map, "statusCode").filter(|s| !s.is_empty()),
        status_message: optional_str(map, "statusMessage").filter(|s| !s.is_empty()),
        suspect: end < start,
    })
}

fn required_str<'a>(map: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, Malformation> {
    map.get(field)
        .and_then(Value::as_str)
        .ok_or(Malformation::Missing(field))
}

fn optional_str(map: &Map<String, Value>, field: &str) -> Option<String> {
    map.get(field).and_then(Value::as_str).map(str::to_owned)
}

fn required_timestamp(map: &Map<String, Value>, field: &'static str) -> Result<i64, Malformation> {
    match map.get(field) {
        None | Some(Value::Null) => Err(Malformation::Missing(field)),
        Some(value) => timestamp(value).ok_or(Malformation::NotATimestamp(field)),
    }
}

fn timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|v| i64::try_from(v).ok()))
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .filter(|f| *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                    .map(|f| f as i64)
            }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

// Non-string attribute values keep their compact JSON text.
fn attributes(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(map)) = value else {
        return BTreeMap::new();
    };
    map.iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}
