//! Flame graph aggregation.
//!
//! Spans are folded into a tree keyed by a grouping label along each
//! root-to-leaf path. Sibling spans with the same label under the same tree
//! node merge, and so do the subtrees below them.
//!
//! Every span contributes its self time: its duration minus the durations of
//! its direct children, floored at zero. In [`CostMode::SelfTime`] a node's
//! value is the sum of the self times merged into it. In [`CostMode::Total`]
//! it is that sum plus the values of its children, which equals the inclusive
//! duration whenever children fit inside their parent and never lets a child
//! outgrow its parent when they do not.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::span::Span;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GroupBy {
    Service,
    Operation,
    #[default]
    ServiceOperation,
}

impl GroupBy {
    pub const ALL: [GroupBy; 3] = [
        GroupBy::ServiceOperation,
        GroupBy::Service,
        GroupBy::Operation,
    ];

    /// Query parameter value.
    pub fn as_str(self) -> &'static str {
        match self {
            GroupBy::Service => "service",
            GroupBy::Operation => "operation",
            GroupBy::ServiceOperation => "service_operation",
        }
    }

    /// Lenient parse: `name` is an alias for `operation`, anything unknown
    /// groups by service and operation.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "service" => GroupBy::Service,
            "operation" | "name" => GroupBy::Operation,
            _ => GroupBy::ServiceOperation,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            GroupBy::Service => "Service",
            GroupBy::Operation => "Operation",
            GroupBy::ServiceOperation => "Service + operation",
        }
    }

    pub fn label(self, span: &Span) -> String {
        match self {
            GroupBy::Service => span.service.clone(),
            GroupBy::Operation => span.name.clone(),
            GroupBy::ServiceOperation if span.service.is_empty() => span.name.clone(),
            GroupBy::ServiceOperation => format!("{}:{}", span.service, span.name),
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CostMode {
    SelfTime,
    #[default]
    Total,
}

impl CostMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CostMode::SelfTime => "self",
            CostMode::Total => "total",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("self") {
            CostMode::SelfTime
        } else {
            CostMode::Total
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            CostMode::SelfTime => "Self",
            CostMode::Total => "Total",
        }
    }
}

impl fmt::Display for CostMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the tree handed to a flame chart renderer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireFlameNode")]
pub struct FlameNode {
    pub name: String,
    pub value: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FlameNode>,
}

impl FlameNode {
    pub fn leaf(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value,
            children: Vec::new(),
        }
    }

    pub fn children_value(&self) -> u64 {
        self.children
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.value))
    }

    /// Number of levels, counting this node.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.children.iter().map(|child| (child, depth + 1)));
        }
        deepest
    }

    /// Follows child indices from this node.
    pub fn at_path(&self, path: &[usize]) -> Option<&FlameNode> {
        path.iter()
            .try_fold(self, |node, &idx| node.children.get(idx))
    }

    fn sort_children(&mut self) {
        self.children.sort_by(|a, b| {
            b.value
                .cmp(&a.value)
                .then_with(|| a.name.cmp(&b.name))
        });
    }
}

// Chains as deep as the trace would otherwise be dropped recursively.
impl Drop for FlameNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Trees coming from the flame service: any JSON number as value, children
/// optional or null.
#[derive(Deserialize)]
struct WireFlameNode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: f64,
    #[serde(default)]
    children: Option<Vec<WireFlameNode>>,
}

impl From<WireFlameNode> for FlameNode {
    fn from(wire: WireFlameNode) -> Self {
        let value = if wire.value.is_finite() && wire.value > 0.0 {
            wire.value.round().min(u64::MAX as f64) as u64
        } else {
            0
        };
        let mut node = FlameNode {
            name: wire.name,
            value,
            children: wire
                .children
                .unwrap_or_default()
                .into_iter()
                .map(FlameNode::from)
                .collect(),
        };
        node.sort_children();
        node
    }
}

pub fn root_label(trace_id: &str) -> String {
    format!("trace:{}", trace_id.trim().to_ascii_lowercase())
}

/// Parent/child relation resolved by span id.
struct Forest {
    roots: Vec<usize>,
    children: Vec<Vec<usize>>,
}

impl Forest {
    fn build(spans: &[Span]) -> Self {
        let mut id_to_idx: HashMap<&str, usize> = HashMap::with_capacity(spans.len());
        for (idx, span) in spans.iter().enumerate() {
            id_to_idx.entry(span.span_id.as_str()).or_insert(idx);
        }

        let mut roots = Vec::new();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); spans.len()];
        for (idx, span) in spans.iter().enumerate() {
            let parent = span
                .parent_span_id
                .as_deref()
                .and_then(|id| id_to_idx.get(id).copied())
                .filter(|&parent| parent != idx);
            match parent {
                Some(parent) => children[parent].push(idx),
                None => roots.push(idx),
            }
        }

        Self { roots, children }
    }
}

/// Tree under construction, kept flat so that deep traces never recurse.
/// Node 0 is the root; a child always comes after its parent.
struct Arena {
    nodes: Vec<ArenaNode>,
}

struct ArenaNode {
    label: String,
    self_ns: u64,
    children: Vec<usize>,
    index: HashMap<String, usize>,
}

impl ArenaNode {
    fn new(label: String) -> Self {
        Self {
            label,
            self_ns: 0,
            children: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl Arena {
    fn new(root_label: &str) -> Self {
        Self {
            nodes: vec![ArenaNode::new(root_label.to_owned())],
        }
    }

    fn child(&mut self, parent: usize, label: &str) -> usize {
        if let Some(&idx) = self.nodes[parent].index.get(label) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(ArenaNode::new(label.to_owned()));
        let parent = &mut self.nodes[parent];
        parent.children.push(idx);
        parent.index.insert(label.to_owned(), idx);
        idx
    }

    /// Folds the span `top` and every span below it into the node `parent`.
    fn fold(&mut self, parent: usize, top: usize, spans: &SpanFacts<'_>, visited: &mut HashSet<usize>) {
        let mut stack = vec![(parent, top)];
        while let Some((parent, idx)) = stack.pop() {
            let node = self.child(parent, &spans.labels[idx]);
            let slot = &mut self.nodes[node].self_ns;
            *slot = slot.saturating_add(spans.self_ns[idx]);
            for &child in spans.forest.children[idx].iter().rev() {
                if visited.insert(child) {
                    stack.push((node, child));
                }
            }
        }
    }

    /// Converts bottom-up: every child index is larger than its parent's.
    fn finish(self, mode: CostMode) -> FlameNode {
        let mut built: Vec<Option<FlameNode>> = Vec::with_capacity(self.nodes.len());
        built.resize_with(self.nodes.len(), || None);

        for (idx, node) in self.nodes.into_iter().enumerate().rev() {
            let mut out = FlameNode {
                name: node.label,
                value: 0,
                children: node
                    .children
                    .iter()
                    .filter_map(|&child| built[child].take())
                    .collect(),
            };
            out.sort_children();
            out.value = match mode {
                CostMode::SelfTime => node.self_ns,
                CostMode::Total => node.self_ns.saturating_add(out.children_value()),
            };
            built[idx] = Some(out);
        }

        built.into_iter().next().flatten().unwrap_or_default()
    }
}

struct SpanFacts<'a> {
    forest: &'a Forest,
    labels: &'a [String],
    self_ns: &'a [u64],
}

/// Builds the flame tree for `spans`.
///
/// The result always has a single root: the root span's node when the trace
/// has exactly one root span, otherwise a node named `root_label` whose value
/// is the sum of its children. An empty slice yields a zero-valued
/// `root_label` leaf.
pub fn aggregate(spans: &[Span], group_by: GroupBy, mode: CostMode, root_label: &str) -> FlameNode {
    let _span = tracing::info_span!(
        "flame_aggregate",
        spans = spans.len(),
        group_by = group_by.as_str(),
        mode = mode.as_str()
    )
    .entered();

    if spans.is_empty() {
        return FlameNode::leaf(root_label, 0);
    }

    let forest = Forest::build(spans);

    let self_ns: Vec<u64> = spans
        .iter()
        .enumerate()
        .map(|(idx, span)| {
            let covered = forest.children[idx]
                .iter()
                .fold(0u64, |acc, &child| acc.saturating_add(spans[child].duration_ns()));
            span.duration_ns().saturating_sub(covered)
        })
        .collect();
    let labels: Vec<String> = spans.iter().map(|span| group_by.label(span)).collect();

    let facts = SpanFacts {
        forest: &forest,
        labels: &labels,
        self_ns: &self_ns,
    };
    let mut arena = Arena::new(root_label);
    let mut visited: HashSet<usize> = HashSet::with_capacity(spans.len());
    let mut root_spans = 0usize;

    for &idx in &forest.roots {
        visited.insert(idx);
        arena.fold(0, idx, &facts, &mut visited);
        root_spans += 1;
    }

    // Only a parent cycle leaves spans unreachable; promote them to roots.
    for idx in 0..spans.len() {
        if visited.insert(idx) {
            log::debug!("span {} is part of a parent cycle", spans[idx].span_id);
            arena.fold(0, idx, &facts, &mut visited);
            root_spans += 1;
        }
    }

    let mut tree = arena.finish(mode);
    if root_spans == 1 && tree.children.len() == 1 {
        return tree.children.remove(0);
    }
    tree.value = tree.children_value();
    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(id: &str, parent: Option<&str>, service: &str, name: &str, start: i64, end: i64) -> Span {
        let span = Span::new(id, service, name, start, end);
        match parent {
            Some(parent) => span.with_parent(parent),
            None => span,
        }
    }

    fn two_span_trace() -> Vec<Span> {
        vec![
            span("1", None, "A", "op1", 0, 100),
            span("2", Some("1"), "B", "op2", 10, 40),
        ]
    }

    #[test]
    fn total_mode_matches_inclusive_durations() {
        let tree = aggregate(&two_span_trace(), GroupBy::ServiceOperation, CostMode::Total, "trace:t");
        assert_eq!(
            tree,
            FlameNode {
                name: "A:op1".into(),
                value: 100,
                children: vec![FlameNode::leaf("B:op2", 30)],
            }
        );
    }

    #[test]
    fn self_mode_subtracts_direct_children() {
        let tree = aggregate(&two_span_trace(), GroupBy::ServiceOperation, CostMode::SelfTime, "trace:t");
        assert_eq!(
            tree,
            FlameNode {
                name: "A:op1".into(),
                value: 70,
                children: vec![FlameNode::leaf("B:op2", 30)],
            }
        );
    }

    /// Span `i` covers `i..2n-i` under span `i - 1`.
    fn nested_chain(n: usize) -> Vec<Span> {
        let end = 2 * n as i64;
        (0..n)
            .map(|i| {
                let parent = i.checked_sub(1).map(|p| p.to_string());
                span(&i.to_string(), parent.as_deref(), "svc", "op", i as i64, end - i as i64)
            })
            .collect()
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let n = 20_000;
        let spans = nested_chain(n);

        let total = aggregate(&spans, GroupBy::ServiceOperation, CostMode::Total, "trace:deep");
        assert_eq!(total.name, "svc:op");
        assert_eq!(total.value, 2 * n as u64);
        assert_eq!(total.depth(), n);

        let exclusive = aggregate(&spans, GroupBy::ServiceOperation, CostMode::SelfTime, "trace:deep");
        let mut node = &exclusive;
        let mut levels = 1;
        while let Some(child) = node.children.first() {
            assert_eq!(node.value, 2);
            node = child;
            levels += 1;
        }
        assert_eq!(levels, n);
        assert_eq!(node.value, 2);
    }

    #[test]
    fn empty_input_is_a_zero_root() {
        let tree = aggregate(&[], GroupBy::ServiceOperation, CostMode::Total, "trace:abc");
        assert_eq!(tree, FlameNode::leaf("trace:abc", 0));
    }

    #[test]
    fn multiple_roots_get_a_synthetic_root() {
        let spans = vec![
            span("r1", None, "s1", "r1", 0, 100),
            span("r2", None, "s2", "r2", 0, 300),
        ];
        let tree = aggregate(&spans, GroupBy::ServiceOperation, CostMode::Total, "trace:zz");
        assert_eq!(tree.name, "trace:zz");
        assert_eq!(tree.value, 400);
        assert_eq!(tree.children[0].name, "s2:r2");
        assert_eq!(tree.children[1].name, "s1:r1");
    }

    #[test]
    fn dangling_parent_becomes_an_extra_root() {
        let spans = vec![
            span("1", None, "A", "op1", 0, 100),
            span("2", Some("missing"), "B", "op2", 0, 50),
        ];
        let tree = aggregate(&spans, GroupBy::ServiceOperation, CostMode::Total, "trace:t");
        assert_eq!(tree.name, "trace:t");
        assert_eq!(tree.value, 150);
        let names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["A:op1", "B:op2"]);
    }

    #[test]
    fn siblings_with_the_same_key_merge() {
        let spans = vec![
            span("root", None, "web", "GET", 0, 1000),
            span("a", Some("root"), "db", "query", 0, 100),
            span("b", Some("root"), "db", "query", 200, 400),
            span("c", Some("root"), "cache", "get", 500, 550),
            span("a1", Some("a"), "disk", "read", 10, 20),
            span("b1", Some("b"), "disk", "read", 210, 240),
        ];

        let total = aggregate(&spans, GroupBy::ServiceOperation, CostMode::Total, "trace:t");
        assert_eq!(total.value, 1000);
        assert_eq!(total.children.len(), 2);
        let db = &total.children[0];
        assert_eq!(db.name, "db:query");
        assert_eq!(db.value, 300);
        assert_eq!(db.children, vec![FlameNode::leaf("disk:read", 40)]);
        assert_eq!(total.children[1], FlameNode::leaf("cache:get", 50));

        let self_time = aggregate(&spans, GroupBy::ServiceOperation, CostMode::SelfTime, "trace:t");
        assert_eq!(self_time.value, 650);
        assert_eq!(self_time.children[0].value, 260);
        assert_eq!(self_time.children[0].children[0].value, 40);
    }

    #[test]
    fn self_time_is_floored_when_children_overrun() {
        let spans = vec![
            span("p", None, "svc", "parent", 0, 100),
            span("c1", Some("p"), "svc", "left", 0, 80),
            span("c2", Some("p"), "svc", "right", 20, 100),
        ];
        let self_time = aggregate(&spans, GroupBy::ServiceOperation, CostMode::SelfTime, "trace:t");
        assert_eq!(self_time.value, 0);

        let total = aggregate(&spans, GroupBy::ServiceOperation, CostMode::Total, "trace:t");
        assert!(total.value >= total.children_value());
    }

    #[test]
    fn children_sort_by_value_then_label() {
        let spans = vec![
            span("root", None, "s", "root", 0, 100),
            span("b", Some("root"), "s", "b", 0, 10),
            span("a", Some("root"), "s", "a", 10, 20),
            span("c", Some("root"), "s", "c", 20, 50),
        ];
        let tree = aggregate(&spans, GroupBy::Operation, CostMode::Total, "trace:t");
        let names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }

    #[test]
    fn group_by_labels() {
        let s = span("x", None, "api", "GET /foo", 0, 200);
        assert_eq!(GroupBy::ServiceOperation.label(&s), "api:GET /foo");
        assert_eq!(GroupBy::Service.label(&s), "api");
        assert_eq!(GroupBy::Operation.label(&s), "GET /foo");

        let anonymous = span("y", None, "", "tick", 0, 1);
        assert_eq!(GroupBy::ServiceOperation.label(&anonymous), "tick");

        assert_eq!(GroupBy::parse("name"), GroupBy::Operation);
        assert_eq!(GroupBy::parse("SERVICE"), GroupBy::Service);
        assert_eq!(GroupBy::parse("whatever"), GroupBy::ServiceOperation);
        assert_eq!(CostMode::parse("self"), CostMode::SelfTime);
        assert_eq!(CostMode::parse(""), CostMode::Total);
    }

    #[test]
    fn parent_cycles_do_not_loop_or_drop_spans() {
        let spans = vec![
            span("a", Some("b"), "s", "a", 0, 10),
            span("b", Some("a"), "s", "b", 0, 10),
            span("c", Some("c"), "s", "c", 0, 5),
        ];
        let tree = aggregate(&spans, GroupBy::Operation, CostMode::SelfTime, "trace:t");
        assert_eq!(tree.name, "trace:t");
        let mut names = Vec::new();
        fn walk<'a>(node: &'a FlameNode, out: &mut Vec<&'a str>) {
            out.push(node.name.as_str());
            for child in &node.children {
                walk(child, out);
            }
        }
        walk(&tree, &mut names);
        for expected in ["a", "b", "c"] {
            assert!(names.contains(&expected), "{expected} missing from {names:?}");
        }
    }

    #[test]
    fn aggregation_is_idempotent() {
        let spans = two_span_trace();
        let first = aggregate(&spans, GroupBy::Service, CostMode::SelfTime, "trace:t");
        let second = aggregate(&spans, GroupBy::Service, CostMode::SelfTime, "trace:t");
        assert_eq!(first, second);
    }

    #[test]
    fn server_trees_are_normalised_on_decode() {
        let tree: FlameNode = serde_json::from_str(
            r#"{"name":"trace:x","value":12.6,"children":[
                {"name":"b","value":-3},
                {"name":"a","value":5,"children":null}
            ]}"#,
        )
        .expect("decode");
        assert_eq!(tree.value, 13);
        assert_eq!(tree.children[0], FlameNode::leaf("a", 5));
        assert_eq!(tree.children[1], FlameNode::leaf("b", 0));
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.at_path(&[1]).map(|n| n.name.as_str()), Some("b"));

        let json = serde_json::to_value(FlameNode::leaf("x", 1)).expect("encode");
        assert!(json.get("children").is_none());
    }

    #[test]
    fn root_label_lowercases_the_trace_id() {
        assert_eq!(root_label(" ABC123 "), "trace:abc123");
    }
}
