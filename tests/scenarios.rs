//! End-to-end scenarios: payloads as a trace backend returns them, through
//! validation, layout and aggregation, and the explorer driving a backend
//! through request slots.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use spanscope::api::{SearchRequest, SearchResponse, Suggestion, TraceDetail, TraceSummary};
use spanscope::client::TraceService;
use spanscope::dataflow::{Delivery, Request};
use spanscope::error::FetchFailure;
use spanscope::flame::{aggregate, root_label, CostMode, FlameNode, GroupBy};
use spanscope::span::validate;
use spanscope::state::{Event, ExplorerState, FilterField, TraceKey};
use spanscope::timeline::{layout, Timeline, TimelineParams};

fn two_span_trace() -> Vec<Value> {
    vec![
        json!({
            "spanId": "a",
            "name": "op1",
            "service": "A",
            "startUnixNanos": "1000",
            "endUnixNanos": "1100",
        }),
        json!({
            "spanId": "b",
            "parentSpanId": "a",
            "name": "op2",
            "service": "B",
            "startUnixNanos": 1010,
            "endUnixNanos": 1040,
            "statusCode": "ERROR",
        }),
    ]
}

#[test]
fn a_parent_and_child_from_two_services() {
    let validated = validate(&two_span_trace());
    assert_eq!(validated.spans.len(), 2);
    assert_eq!(validated.dropped(), 0);

    let Timeline::Laid(laid) = layout(&validated.spans, TimelineParams::default()) else {
        panic!("expected a layout");
    };
    let services: Vec<&str> = laid.lanes.iter().map(|l| l.service.as_str()).collect();
    assert_eq!(services, ["A", "B"]);
    let a = &laid.lanes[0].spans[0];
    let b = &laid.lanes[1].spans[0];
    assert!((a.x1 - laid.axis.start_px()).abs() < 1e-3);
    assert!(b.x1 > a.x1);
    assert!(b.rendered_width < a.rendered_width);

    let total = aggregate(
        &validated.spans,
        GroupBy::ServiceOperation,
        CostMode::Total,
        &root_label("T1"),
    );
    assert_eq!(total.name, "A:op1");
    assert_eq!(total.value, 100);
    assert_eq!(total.children, vec![FlameNode::leaf("B:op2", 30)]);

    let exclusive = aggregate(
        &validated.spans,
        GroupBy::ServiceOperation,
        CostMode::SelfTime,
        &root_label("T1"),
    );
    assert_eq!(exclusive.value, 70);
    assert_eq!(exclusive.children[0].value, 30);
}

#[test]
fn an_empty_trace_has_nothing_to_show() {
    let validated = validate(&[]);
    assert!(validated.is_empty());
    assert_eq!(layout(&validated.spans, TimelineParams::default()), Timeline::NoData);

    let tree = aggregate(&validated.spans, GroupBy::Service, CostMode::Total, &root_label("T1"));
    assert_eq!(tree, FlameNode::leaf("trace:t1", 0));
}

#[test]
fn malformed_records_are_dropped_and_the_rest_survive() {
    let mut records = two_span_trace();
    records.push(json!({"spanId": "c", "name": "op3", "service": "C"}));
    records.push(json!("not a span"));
    records.push(json!({
        "spanId": "a",
        "name": "again",
        "service": "A",
        "startUnixNanos": 0,
        "endUnixNanos": 1,
    }));
    records.push(json!({
        "spanId": "d",
        "parentSpanId": "missing",
        "name": "late",
        "service": "D",
        "startUnixNanos": 1200,
        "endUnixNanos": 1150,
    }));

    let validated = validate(&records);
    assert_eq!(validated.rejected.len(), 2);
    assert_eq!(validated.rejected[0].index, 2);
    assert_eq!(validated.rejected[1].index, 3);
    assert_eq!(validated.duplicates, 1);
    assert_eq!(validated.suspect, 1);

    let ids: Vec<&str> = validated.spans.iter().map(|s| s.span_id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "d"]);
    assert_eq!(validated.spans[0].name, "op1");
    assert_eq!(validated.spans[2].duration_ns(), 0);

    // The dangling parent makes `d` a second root.
    let tree = aggregate(&validated.spans, GroupBy::Service, CostMode::Total, &root_label("T1"));
    assert_eq!(tree.name, "trace:t1");
    assert_eq!(tree.value, 100);
    let roots: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(roots, ["A", "D"]);
}

/// Serves canned answers and counts the trace fetches it receives. The
/// first `outages` trace fetches fail with a 503.
#[derive(Default)]
struct CannedService {
    trace_fetches: AtomicUsize,
    outages: usize,
}

impl TraceService for CannedService {
    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, FetchFailure> {
        let items = request
            .filters
            .service
            .iter()
            .map(|service| TraceSummary {
                trace_id: format!("{service}-trace"),
                root_service: service.clone(),
                ..Default::default()
            })
            .collect();
        Ok(SearchResponse { items })
    }

    fn trace(&self, trace_id: &str) -> Result<TraceDetail, FetchFailure> {
        let seen = self.trace_fetches.fetch_add(1, Ordering::SeqCst);
        if seen < self.outages {
            Err(FetchFailure::Status {
                status: 503,
                body: "backend warming up".into(),
            })
        } else if trace_id == "t1" {
            Ok(TraceDetail {
                trace_id: trace_id.to_owned(),
                spans: two_span_trace(),
            })
        } else {
            Err(FetchFailure::Status {
                status: 404,
                body: "trace not found".into(),
            })
        }
    }

    fn flame(
        &self,
        trace_id: &str,
        _group_by: GroupBy,
        _mode: CostMode,
    ) -> Result<FlameNode, FetchFailure> {
        Ok(FlameNode::leaf(root_label(trace_id), 0))
    }

    fn suggest_services(&self, _query: &str) -> Result<Vec<Suggestion>, FetchFailure> {
        Ok(Vec::new())
    }

    fn suggest_operations(&self, _query: &str) -> Result<Vec<Suggestion>, FetchFailure> {
        Ok(Vec::new())
    }
}

fn poll_until_settled<K, T>(request: &mut Request<K, T>) -> Delivery
where
    K: Clone + PartialEq + std::fmt::Debug,
    T: Send + 'static,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match request.poll() {
            Delivery::Pending | Delivery::Stale | Delivery::Idle if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(1));
            }
            other => return other,
        }
    }
}

#[test]
fn opening_a_trace_fetches_it_once() {
    let service = Arc::new(CannedService::default());
    let mut state = ExplorerState::default().apply(Event::OpenTrace("  T1 ".into()));
    let mut detail: Request<TraceKey, Result<TraceDetail, FetchFailure>> = Request::new();

    for _ in 0..3 {
        let key = state.trace_key().expect("trace opened");
        let svc = service.clone();
        let id = key.trace_id.clone();
        detail.ensure(key, move || svc.trace(&id));
    }
    assert_eq!(poll_until_settled(&mut detail), Delivery::Fresh);
    assert_eq!(service.trace_fetches.load(Ordering::SeqCst), 1);

    let key = state.trace_key().expect("trace opened");
    assert_eq!(key.trace_id, "t1");
    let body = detail
        .ready_for(&key)
        .expect("delivered")
        .as_ref()
        .expect("trace found");
    assert_eq!(validate(&body.spans).spans.len(), 2);

    state = state.apply(Event::OpenTrace("missing".into()));
    let key = state.trace_key().expect("trace opened");
    let svc = service.clone();
    assert!(detail.ensure(key.clone(), move || svc.trace("missing")));
    assert!(detail.ready_for(&key).is_none());
    assert_eq!(poll_until_settled(&mut detail), Delivery::Fresh);
    match detail.ready() {
        Some(Err(FetchFailure::Status { status, .. })) => assert_eq!(*status, 404),
        other => panic!("expected a 404, got {other:?}"),
    }
    assert_eq!(state.open_trace.as_deref(), Some("missing"));
}

#[test]
fn a_failed_trace_can_be_fetched_again() {
    let service = Arc::new(CannedService {
        outages: 1,
        ..Default::default()
    });
    let mut detail: Request<TraceKey, Result<TraceDetail, FetchFailure>> = Request::new();
    let fetch = |detail: &mut Request<TraceKey, Result<TraceDetail, FetchFailure>>,
                 state: &ExplorerState| {
        let key = state.trace_key().expect("trace opened");
        let svc = service.clone();
        detail.ensure(key, move || svc.trace("t1"))
    };

    let state = ExplorerState::default().apply(Event::OpenTrace("t1".into()));
    assert!(fetch(&mut detail, &state));
    assert_eq!(poll_until_settled(&mut detail), Delivery::Fresh);
    assert!(matches!(
        detail.ready(),
        Some(Err(FetchFailure::Status { status: 503, .. }))
    ));
    assert!(!fetch(&mut detail, &state));

    // Clicking the same trace again retries it.
    let state = state.apply(Event::OpenTrace("t1".into()));
    assert!(fetch(&mut detail, &state));
    assert_eq!(poll_until_settled(&mut detail), Delivery::Fresh);
    let key = state.trace_key().expect("trace opened");
    assert!(matches!(detail.ready_for(&key), Some(Ok(body)) if body.spans.len() == 2));

    // So does the explicit reload.
    let state = state.apply(Event::Reload);
    assert!(fetch(&mut detail, &state));
    assert_eq!(poll_until_settled(&mut detail), Delivery::Fresh);
    assert_eq!(service.trace_fetches.load(Ordering::SeqCst), 3);
}

#[test]
fn searching_follows_the_filters() {
    let service = Arc::new(CannedService::default());
    let mut state = ExplorerState::default()
        .apply(Event::EditFilter(FilterField::Service, "api, db".into()))
        .apply(Event::Search);
    let mut search: Request<u64, Result<SearchResponse, FetchFailure>> = Request::new();

    let request = state.search_request(10_000);
    assert_eq!(request.to, 10_000);
    assert_eq!(request.from, 10_000 - 3600);
    let svc = service.clone();
    assert!(search.ensure(state.search_nonce, move || svc.search(&request)));
    assert_eq!(poll_until_settled(&mut search), Delivery::Fresh);

    let found: Vec<&str> = search
        .ready()
        .and_then(|r| r.as_ref().ok())
        .map(|r| r.items.iter().map(|t| t.trace_id.as_str()).collect())
        .unwrap_or_default();
    assert_eq!(found, ["api-trace", "db-trace"]);

    // Editing a filter alone does not search again.
    state = state.apply(Event::EditFilter(FilterField::Service, "cache".into()));
    let request = state.search_request(10_000);
    let svc = service.clone();
    assert!(!search.ensure(state.search_nonce, move || svc.search(&request)));
}
