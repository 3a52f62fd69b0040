//! Timeline layout: one lane per service, a shared time axis, and a
//! rectangle for every span.
//!
//! The layout is a pure function of the span slice and the viewport
//! parameters. It is recomputed whenever either changes.

use std::collections::HashMap;

use crate::span::Span;

/// Space reserved right of the axis for the end label.
pub const RIGHT_MARGIN: f32 = 20.0;
/// Zero-length spans still get a visible, clickable sliver.
pub const MIN_SPAN_WIDTH: f32 = 2.0;
pub const BOTTOM_MARGIN: f32 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimelineParams {
    pub width: f32,
    pub lane_height: f32,
    /// Left padding; also holds the lane labels.
    pub pad: f32,
}

impl Default for TimelineParams {
    fn default() -> Self {
        Self {
            width: 1000.0,
            lane_height: 28.0,
            pad: 80.0,
        }
    }
}

impl TimelineParams {
    pub fn with_width(mut self, width: f32) -> Self {
        self.width = width;
        self
    }

    /// Vertical space above the first lane.
    pub fn header(&self) -> f32 {
        self.pad / 2.0
    }
}

/// Maps nanosecond timestamps onto the horizontal pixel range of the
/// timeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeAxis {
    pub min_ns: i64,
    pub max_ns: i64,
    origin_px: f32,
    extent_px: f32,
}

impl TimeAxis {
    fn new(min_ns: i64, max_ns: i64, params: &TimelineParams) -> Self {
        Self {
            min_ns,
            max_ns,
            origin_px: params.pad,
            extent_px: (params.width - params.pad - RIGHT_MARGIN).max(0.0),
        }
    }

    /// Denominator of the mapping; at least one nanosecond.
    pub fn total_ns(&self) -> u64 {
        (self.max_ns as i128 - self.min_ns as i128).max(1) as u64
    }

    pub fn x(&self, t_ns: i64) -> f32 {
        let offset = (t_ns as i128 - self.min_ns as i128) as f64;
        self.origin_px + (offset / self.total_ns() as f64 * self.extent_px as f64) as f32
    }

    pub fn start_px(&self) -> f32 {
        self.origin_px
    }

    pub fn end_px(&self) -> f32 {
        self.origin_px + self.extent_px
    }

    /// Tick marks roughly `target_px` apart, at 1/2/5 × 10ⁿ nanosecond
    /// offsets from the start of the trace.
    pub fn ticks(&self, target_px: f32) -> Vec<Tick> {
        if self.extent_px <= 0.0 || target_px <= 0.0 {
            return Vec::new();
        }

        let total_ns = self.total_ns();
        let px_per_ns = self.extent_px as f64 / total_ns as f64;
        let target_ns = (target_px as f64 / px_per_ns).ceil().max(1.0) as u64;
        let step_ns = nice_time_step_ns(target_ns);

        let mut ticks = Vec::new();
        let mut offset = 0u64;
        while offset <= total_ns {
            ticks.push(Tick {
                offset_ns: offset,
                x: self.origin_px + (offset as f64 * px_per_ns) as f32,
                label: fmt_duration_ns(offset),
            });
            let next = offset.saturating_add(step_ns);
            if next == offset {
                break;
            }
            offset = next;
        }
        ticks
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tick {
    pub offset_ns: u64,
    pub x: f32,
    pub label: String,
}

/// A span placed on the timeline. `index` points into the span slice the
/// layout was computed from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LaneSpan {
    pub index: usize,
    pub x1: f32,
    pub rendered_width: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Lane {
    pub service: String,
    /// Top edge of the lane.
    pub y: f32,
    pub spans: Vec<LaneSpan>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TimelineLayout {
    pub lanes: Vec<Lane>,
    pub width: f32,
    pub height: f32,
    pub axis: TimeAxis,
    pub params: TimelineParams,
}

impl TimelineLayout {
    /// The span drawn at `(x, y)`, if any. Later spans in a lane are painted
    /// on top, so they win.
    pub fn hit(&self, x: f32, y: f32) -> Option<usize> {
        let lane_height = self.params.lane_height;
        let lane = self
            .lanes
            .iter()
            .find(|lane| y >= lane.y && y < lane.y + lane_height)?;
        lane.spans
            .iter()
            .rev()
            .find(|s| x >= s.x1 && x <= s.x1 + s.rendered_width)
            .map(|s| s.index)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Timeline {
    /// The trace was loaded and holds no spans.
    NoData,
    Laid(TimelineLayout),
}

impl Timeline {
    pub fn layout(&self) -> Option<&TimelineLayout> {
        match self {
            Timeline::NoData => None,
            Timeline::Laid(layout) => Some(layout),
        }
    }
}

pub fn layout(spans: &[Span], params: TimelineParams) -> Timeline {
    let _span = tracing::info_span!("timeline_layout", spans = spans.len()).entered();

    if spans.is_empty() {
        return Timeline::NoData;
    }

    let min_ns = spans
        .iter()
        .map(|s| s.start_unix_nanos)
        .min()
        .unwrap_or(0);
    let max_ns = spans.iter().map(|s| s.end_unix_nanos).max().unwrap_or(0);
    let axis = TimeAxis::new(min_ns, max_ns, &params);

    // Lanes in order of each service's first appearance.
    let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
    let mut by_service: HashMap<&str, usize> = HashMap::new();
    for (idx, span) in spans.iter().enumerate() {
        let slot = *by_service.entry(span.service.as_str()).or_insert_with(|| {
            groups.push((span.service.as_str(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(idx);
    }

    let header = params.header();
    let lanes: Vec<Lane> = groups
        .into_iter()
        .enumerate()
        .map(|(lane_idx, (service, mut members))| {
            // `sort_by_key` is stable: ties keep input order.
            members.sort_by_key(|&idx| spans[idx].start_unix_nanos);
            let placed = members
                .into_iter()
                .map(|idx| {
                    let span = &spans[idx];
                    let x1 = axis.x(span.start_unix_nanos);
                    let x2 = axis.x(span.end_unix_nanos);
                    LaneSpan {
                        index: idx,
                        x1,
                        rendered_width: (x2 - x1).max(MIN_SPAN_WIDTH),
                    }
                })
                .collect();
            Lane {
                service: service.to_owned(),
                y: header + lane_idx as f32 * params.lane_height,
                spans: placed,
            }
        })
        .collect();

    let height = header + lanes.len() as f32 * params.lane_height + BOTTOM_MARGIN;
    Timeline::Laid(TimelineLayout {
        lanes,
        width: params.width,
        height,
        axis,
        params,
    })
}

pub fn fmt_duration_ns(ns: u64) -> String {
    const US: u64 = 1_000;
    const MS: u64 = 1_000_000;
    const S: u64 = 1_000_000_000;

    if ns < US {
        format!("{ns}ns")
    } else if ns < MS {
        format!("{:.1}us", ns as f64 / US as f64)
    } else if ns < S {
        format!("{:.3}ms", ns as f64 / MS as f64)
    } else {
        format!("{:.3}s", ns as f64 / S as f64)
    }
}

pub fn nice_time_step_ns(target_ns: u64) -> u64 {
    let target = target_ns.max(1) as f64;
    let exp = target.log10().floor();
    let base = 10f64.powf(exp);
    let mant = target / base;
    let nice = if mant <= 1.0 {
        1.0
    } else if mant <= 2.0 {
        2.0
    } else if mant <= 5.0 {
        5.0
    } else {
        10.0
    };
    (nice * base).round().max(1.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(id: &str, service: &str, start: i64, end: i64) -> Span {
        Span::new(id, service, format!("op-{id}"), start, end)
    }

    fn laid(spans: &[Span]) -> TimelineLayout {
        match layout(spans, TimelineParams::default()) {
            Timeline::Laid(layout) => layout,
            Timeline::NoData => panic!("expected a layout"),
        }
    }

    #[test]
    fn empty_input_is_no_data() {
        assert_eq!(layout(&[], TimelineParams::default()), Timeline::NoData);
    }

    #[test]
    fn lanes_follow_first_occurrence_and_sort_by_start() {
        let spans = vec![
            span("1", "web", 50, 60),
            span("2", "db", 10, 20),
            span("3", "web", 0, 100),
            span("4", "cache", 30, 35),
            span("5", "db", 5, 8),
        ];
        let layout = laid(&spans);

        let services: Vec<&str> = layout.lanes.iter().map(|l| l.service.as_str()).collect();
        assert_eq!(services, ["web", "db", "cache"]);

        let web: Vec<usize> = layout.lanes[0].spans.iter().map(|s| s.index).collect();
        assert_eq!(web, [2, 0]);
        let db: Vec<usize> = layout.lanes[1].spans.iter().map(|s| s.index).collect();
        assert_eq!(db, [4, 1]);
    }

    #[test]
    fn equal_starts_keep_input_order() {
        let spans = vec![
            span("a", "svc", 10, 20),
            span("b", "svc", 10, 30),
            span("c", "svc", 10, 15),
        ];
        let layout = laid(&spans);
        let order: Vec<usize> = layout.lanes[0].spans.iter().map(|s| s.index).collect();
        assert_eq!(order, [0, 1, 2]);
    }

    #[test]
    fn maps_time_onto_padded_width() {
        let spans = vec![span("a", "svc", 0, 100), span("b", "svc", 50, 100)];
        let layout = laid(&spans);

        // pad 80, usable width 1000 - 80 - 20 = 900.
        let full = layout.lanes[0].spans[0];
        assert_eq!(full.x1, 80.0);
        assert!((full.rendered_width - 900.0).abs() < 1e-3);

        let half = layout.lanes[0].spans[1];
        assert!((half.x1 - 530.0).abs() < 1e-3);
        assert!((half.rendered_width - 450.0).abs() < 1e-3);
    }

    #[test]
    fn height_counts_header_lanes_and_margin() {
        let spans = vec![span("a", "x", 0, 1), span("b", "y", 0, 1)];
        let layout = laid(&spans);
        assert_eq!(layout.height, 40.0 + 2.0 * 28.0 + 20.0);
        assert_eq!(layout.lanes[1].y, 40.0 + 28.0);
        assert_eq!(layout.width, 1000.0);
    }

    #[test]
    fn degenerate_trace_stays_finite_and_visible() {
        let spans = vec![span("a", "svc", 500, 500), span("b", "other", 500, 500)];
        let layout = laid(&spans);
        assert_eq!(layout.axis.total_ns(), 1);
        for lane in &layout.lanes {
            for s in &lane.spans {
                assert!(s.x1.is_finite());
                assert_eq!(s.x1, 80.0);
                assert_eq!(s.rendered_width, MIN_SPAN_WIDTH);
            }
        }
    }

    #[test]
    fn narrow_viewport_never_moves_spans_left_of_pad() {
        let spans = vec![span("a", "svc", 0, 10), span("b", "svc", 5, 10)];
        let layout = match layout(&spans, TimelineParams::default().with_width(50.0)) {
            Timeline::Laid(layout) => layout,
            Timeline::NoData => unreachable!(),
        };
        for s in &layout.lanes[0].spans {
            assert!(s.x1 >= 80.0);
            assert!(s.rendered_width >= MIN_SPAN_WIDTH);
        }
    }

    #[test]
    fn hit_prefers_the_topmost_span() {
        let spans = vec![span("a", "svc", 0, 100), span("b", "svc", 40, 60)];
        let layout = laid(&spans);
        let y = layout.lanes[0].y + 5.0;
        assert_eq!(layout.hit(layout.axis.x(50), y), Some(1));
        assert_eq!(layout.hit(layout.axis.x(10), y), Some(0));
        assert_eq!(layout.hit(layout.axis.x(10), 0.0), None);
    }

    #[test]
    fn ticks_start_at_zero_and_use_nice_steps() {
        let spans = vec![span("a", "svc", 0, 10_000_000)];
        let layout = laid(&spans);
        let ticks = layout.axis.ticks(110.0);
        assert_eq!(ticks[0].offset_ns, 0);
        assert_eq!(ticks[0].x, 80.0);
        let step = ticks[1].offset_ns;
        assert_eq!(step, nice_time_step_ns(step));
        assert!(ticks.last().is_some_and(|t| t.offset_ns <= 10_000_000));
    }

    #[test]
    fn formats_durations_by_magnitude() {
        assert_eq!(fmt_duration_ns(999), "999ns");
        assert_eq!(fmt_duration_ns(1_500), "1.5us");
        assert_eq!(fmt_duration_ns(2_000_000), "2.000ms");
        assert_eq!(fmt_duration_ns(3_000_000_000), "3.000s");
    }

    #[test]
    fn nice_steps_round_up_to_one_two_five() {
        assert_eq!(nice_time_step_ns(0), 1);
        assert_eq!(nice_time_step_ns(3), 5);
        assert_eq!(nice_time_step_ns(120), 200);
        assert_eq!(nice_time_step_ns(700), 1000);
    }
}
