//! Explorer view state.
//!
//! The state is a plain value. Every user interaction is an [`Event`] and
//! [`ExplorerState::apply`] returns the next state; nothing else mutates it.

use crate::api::{normalize_trace_id, SearchRequest, SortKey, SortOrder, SortSpec};
use crate::flame::{CostMode, GroupBy};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Tab {
    #[default]
    Timeline,
    Flame,
}

impl Tab {
    pub const ALL: [Tab; 2] = [Tab::Timeline, Tab::Flame];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Timeline => "Timeline",
            Tab::Flame => "Flame",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterField {
    Service,
    Operation,
    MinDurationMs,
    MaxDurationMs,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StatusFilter {
    #[default]
    Any,
    Ok,
    Error,
}

impl StatusFilter {
    pub const ALL: [StatusFilter; 3] = [StatusFilter::Any, StatusFilter::Ok, StatusFilter::Error];

    pub fn title(self) -> &'static str {
        match self {
            StatusFilter::Any => "Any status",
            StatusFilter::Ok => "OK",
            StatusFilter::Error => "ERROR",
        }
    }
}

/// Filter inputs exactly as typed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterText {
    pub service: String,
    pub operation: String,
    pub min_duration_ms: String,
    pub max_duration_ms: String,
}

impl FilterText {
    pub fn get(&self, field: FilterField) -> &str {
        match field {
            FilterField::Service => &self.service,
            FilterField::Operation => &self.operation,
            FilterField::MinDurationMs => &self.min_duration_ms,
            FilterField::MaxDurationMs => &self.max_duration_ms,
        }
    }

    fn get_mut(&mut self, field: FilterField) -> &mut String {
        match field {
            FilterField::Service => &mut self.service,
            FilterField::Operation => &mut self.operation,
            FilterField::MinDurationMs => &mut self.min_duration_ms,
            FilterField::MaxDurationMs => &mut self.max_duration_ms,
        }
    }
}

/// Key of a trace fetch. Opening the same trace again, or reloading it,
/// bumps `attempt` so a failed fetch can be retried.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TraceKey {
    pub trace_id: String,
    pub attempt: u64,
}

/// Key of a server-side flame request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FlameQuery {
    pub trace_id: String,
    pub attempt: u64,
    pub group_by: GroupBy,
    pub mode: CostMode,
}

#[derive(Clone, Debug)]
pub enum Event {
    EditFilter(FilterField, String),
    SetStatus(StatusFilter),
    /// Sorting by the current key flips the order.
    SetSort(SortKey),
    Search,
    OpenTrace(String),
    /// Fetches the open trace again.
    Reload,
    CloseTrace,
    SelectTab(Tab),
    SetGroupBy(GroupBy),
    SetMode(CostMode),
    SelectSpan(Option<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExplorerState {
    pub filters: FilterText,
    pub status: StatusFilter,
    pub sort: SortSpec,
    pub page_size: u32,
    pub lookback_secs: i64,
    /// Bumped by every search; used as the search request key.
    pub search_nonce: u64,
    pub open_trace: Option<String>,
    /// Bumped whenever a trace is opened or reloaded.
    pub trace_attempt: u64,
    pub tab: Tab,
    pub group_by: GroupBy,
    pub mode: CostMode,
    pub selected_span: Option<String>,
}

impl Default for ExplorerState {
    fn default() -> Self {
        Self::new(50, 3600)
    }
}

impl ExplorerState {
    /// Starts with one pending search so the finder fills on launch.
    pub fn new(page_size: u32, lookback_secs: i64) -> Self {
        Self {
            filters: FilterText::default(),
            status: StatusFilter::Any,
            sort: SortSpec::default(),
            page_size,
            lookback_secs,
            search_nonce: 1,
            open_trace: None,
            trace_attempt: 0,
            tab: Tab::Timeline,
            group_by: GroupBy::ServiceOperation,
            mode: CostMode::SelfTime,
            selected_span: None,
        }
    }

    pub fn apply(mut self, event: Event) -> Self {
        match event {
            Event::EditFilter(field, text) => *self.filters.get_mut(field) = text,
            Event::SetStatus(status) => self.status = status,
            Event::SetSort(by) => {
                self.sort = if self.sort.by == by {
                    SortSpec {
                        by,
                        order: self.sort.order.flipped(),
                    }
                } else {
                    SortSpec {
                        by,
                        order: SortOrder::Desc,
                    }
                };
                self.search_nonce += 1;
            }
            Event::Search => self.search_nonce += 1,
            Event::OpenTrace(id) => {
                let id = normalize_trace_id(&id);
                if id.is_empty() {
                    return self;
                }
                if self.open_trace.as_deref() != Some(id.as_str()) {
                    self.selected_span = None;
                }
                self.open_trace = Some(id);
                self.trace_attempt += 1;
            }
            Event::Reload => {
                if self.open_trace.is_some() {
                    self.trace_attempt += 1;
                }
            }
            Event::CloseTrace => {
                self.open_trace = None;
                self.selected_span = None;
            }
            Event::SelectTab(tab) => self.tab = tab,
            Event::SetGroupBy(group_by) => self.group_by = group_by,
            Event::SetMode(mode) => self.mode = mode,
            Event::SelectSpan(span) => self.selected_span = span,
        }
        self
    }

    /// The list request for the current filters, anchored at `now` (unix
    /// seconds).
    pub fn search_request(&self, now: i64) -> SearchRequest {
        let mut request = SearchRequest {
            from: now - self.lookback_secs,
            to: now,
            sort: self.sort,
            ..Default::default()
        };
        request.filters.service = split_list(&self.filters.service);
        request.filters.operation = split_list(&self.filters.operation);
        request.filters.status = match self.status {
            StatusFilter::Any => Vec::new(),
            StatusFilter::Ok => vec!["OK".to_owned()],
            StatusFilter::Error => vec!["ERROR".to_owned()],
        };
        request.filters.duration_ms.gte = parse_ms(&self.filters.min_duration_ms);
        request.filters.duration_ms.lte = parse_ms(&self.filters.max_duration_ms);
        request.page.size = self.page_size;
        request.normalized(now)
    }

    pub fn trace_key(&self) -> Option<TraceKey> {
        self.open_trace.as_ref().map(|trace_id| TraceKey {
            trace_id: trace_id.clone(),
            attempt: self.trace_attempt,
        })
    }

    pub fn flame_query(&self) -> Option<FlameQuery> {
        self.open_trace.as_ref().map(|trace_id| FlameQuery {
            trace_id: trace_id.clone(),
            attempt: self.trace_attempt,
            group_by: self.group_by,
            mode: self.mode,
        })
    }

    /// Duration inputs that are neither empty nor a number.
    pub fn invalid_filters(&self) -> Vec<FilterField> {
        [FilterField::MinDurationMs, FilterField::MaxDurationMs]
            .into_iter()
            .filter(|&field| {
                let text = self.filters.get(field).trim();
                !text.is_empty() && parse_ms(text).is_none()
            })
            .collect()
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_ms(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
}
