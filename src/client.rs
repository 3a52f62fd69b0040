//! Access to the trace services.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;

use crate::api::{
    normalize_trace_id, parse_suggestions, SearchRequest, SearchResponse, Suggestion, TraceDetail,
};
use crate::error::FetchFailure;
use crate::flame::{CostMode, FlameNode, GroupBy};

/// Error bodies are cut to this many bytes before being shown.
pub const MAX_ERROR_BODY: usize = 4096;

/// The operations the explorer needs from a trace backend.
pub trait TraceService: Send + Sync {
    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, FetchFailure>;

    fn trace(&self, trace_id: &str) -> Result<TraceDetail, FetchFailure>;

    /// Server-side aggregation of one trace.
    fn flame(
        &self,
        trace_id: &str,
        group_by: GroupBy,
        mode: CostMode,
    ) -> Result<FlameNode, FetchFailure>;

    fn suggest_services(&self, query: &str) -> Result<Vec<Suggestion>, FetchFailure>;

    fn suggest_operations(&self, query: &str) -> Result<Vec<Suggestion>, FetchFailure>;
}

/// Builds request URLs below a base URL that may carry a path prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    pub fn new(base: &str) -> Result<Self, FetchFailure> {
        let base = Url::parse(base.trim()).map_err(|err| FetchFailure::Url(format!("{base}: {err}")))?;
        if base.cannot_be_a_base() {
            return Err(FetchFailure::Url(format!("{base}: not a base url")));
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn list(&self) -> Result<Url, FetchFailure> {
        self.join(&["api", "traces", "list"])
    }

    pub fn trace(&self, trace_id: &str) -> Result<Url, FetchFailure> {
        self.join(&["api", "traces", &normalize_trace_id(trace_id)])
    }

    pub fn flame(&self, trace_id: &str, group_by: GroupBy, mode: CostMode) -> Result<Url, FetchFailure> {
        let mut url = self.join(&["api", "traces", &normalize_trace_id(trace_id), "flame"])?;
        url.query_pairs_mut()
            .append_pair("groupBy", group_by.as_str())
            .append_pair("mode", mode.as_str());
        Ok(url)
    }

    pub fn suggest(&self, what: &str, params: &[(&str, &str)]) -> Result<Url, FetchFailure> {
        let mut url = self.join(&["api", "traces", "suggest", what])?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn join(&self, segments: &[&str]) -> Result<Url, FetchFailure> {
        let mut url = self.base.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|()| FetchFailure::Url(format!("{}: not a base url", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

pub struct HttpTraceService {
    endpoints: Endpoints,
    client: Client,
}

impl HttpTraceService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchFailure> {
        let endpoints = Endpoints::new(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("spanscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchFailure::Transport)?;
        Ok(Self { endpoints, client })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn execute(&self, request: RequestBuilder) -> Result<String, FetchFailure> {
        let response = request.send()?;
        let status = response.status();
        log::debug!("{} {}", status.as_u16(), response.url());
        let body = response.text()?;
        if !status.is_success() {
            return Err(FetchFailure::Status {
                status: status.as_u16(),
                body: error_message(&body),
            });
        }
        Ok(body)
    }

    fn get_suggestions(&self, url: Url) -> Result<Vec<Suggestion>, FetchFailure> {
        let body = self.execute(self.client.get(url))?;
        parse_suggestions(&body)
    }
}

impl TraceService for HttpTraceService {
    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, FetchFailure> {
        let url = self.endpoints.list()?;
        let body = self.execute(self.client.post(url).json(request))?;
        Ok(serde_json::from_str(&body)?)
    }

    fn trace(&self, trace_id: &str) -> Result<TraceDetail, FetchFailure> {
        let url = self.endpoints.trace(trace_id)?;
        let body = self.execute(self.client.get(url))?;
        Ok(serde_json::from_str(&body)?)
    }

    fn flame(
        &self,
        trace_id: &str,
        group_by: GroupBy,
        mode: CostMode,
    ) -> Result<FlameNode, FetchFailure> {
        let url = self.endpoints.flame(trace_id, group_by, mode)?;
        let body = self.execute(self.client.get(url))?;
        Ok(serde_json::from_str(&body)?)
    }

    fn suggest_services(&self, query: &str) -> Result<Vec<Suggestion>, FetchFailure> {
        self.get_suggestions(self.endpoints.suggest("services", &[("q", query)])?)
    }

    fn suggest_operations(&self, query: &str) -> Result<Vec<Suggestion>, FetchFailure> {
        self.get_suggestions(self.endpoints.suggest("operations", &[("q", query)])?)
    }
}

/// Prefers the `error` field of a JSON error body; falls back to the raw text.
pub fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned());
    truncate(message, MAX_ERROR_BODY)
}

fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}
