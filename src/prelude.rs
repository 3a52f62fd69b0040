// Preludes: re-export commonly used items for convenience
pub use crate::widgets;

pub use crate::api::{SearchRequest, SearchResponse, Suggestion, TraceDetail, TraceSummary};
pub use crate::client::{HttpTraceService, TraceService};
pub use crate::config::{Config, FlameSource};
pub use crate::dataflow::{Delivery, Request};
pub use crate::error::{Error, FetchFailure, Result};
pub use crate::flame::{aggregate, CostMode, FlameNode, GroupBy};
pub use crate::span::{validate, Span, ValidatedSpans};
pub use crate::state::{Event, ExplorerState, Tab};
pub use crate::timeline::{layout, Timeline, TimelineParams};
