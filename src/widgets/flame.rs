//! Flame chart rendering.
//!
//! The explorer only talks to [`FlameRenderer`]; [`IcicleRenderer`] draws the
//! root on top with children below, each frame as wide as its share of the
//! parent (see [`frames`] for how self-time trees are weighted).

use std::collections::HashMap;

use eframe::egui::{self, pos2, vec2, Align2, FontId, Rect, Sense, Ui, Vec2};

use crate::flame::{CostMode, FlameNode};
use crate::themes::{self, colorhash};

/// What happened in the flame chart this frame. Paths are child indices
/// from the root of the tree passed to [`FlameRenderer::show`].
pub struct FlameResponse {
    pub response: egui::Response,
    pub hovered: Option<Vec<usize>>,
    pub clicked: Option<Vec<usize>>,
}

pub trait FlameRenderer {
    fn show(&mut self, ui: &mut Ui, root: &FlameNode, size: Vec2) -> FlameResponse;
}

/// Rows laid out below the focused frame; deeper ones are reached by zooming.
pub const MAX_FRAME_DEPTH: usize = 512;

/// A laid out frame, `x` and `width` relative to the chart's left edge.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame<'a> {
    pub path: Vec<usize>,
    pub x: f32,
    pub width: f32,
    /// What the width stands for: the node's value, plus its descendants'
    /// in self mode.
    pub extent: u64,
    pub node: &'a FlameNode,
}

impl Frame<'_> {
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// Lays out `root` across `width`. Frames narrower than `min_width` are
/// dropped together with their subtrees.
///
/// Self-time values exclude the children, so in [`CostMode::SelfTime`] a
/// frame spans its own value plus everything below it. A wrapper with no
/// time of its own stays as wide as its callees.
pub fn frames(root: &FlameNode, width: f32, min_width: f32, mode: CostMode) -> Vec<Frame<'_>> {
    let rolled = match mode {
        CostMode::SelfTime => rolled_up(root),
        CostMode::Total => HashMap::new(),
    };
    let extent = |node: &FlameNode| {
        rolled
            .get(&(node as *const FlameNode))
            .copied()
            .unwrap_or(node.value)
    };

    let mut out = Vec::new();
    let mut stack = vec![(root, Vec::new(), 0.0f32, width)];
    while let Some((node, path, x, w)) = stack.pop() {
        if w < min_width {
            continue;
        }
        let own = extent(node);
        if path.len() + 1 < MAX_FRAME_DEPTH {
            // Trees from elsewhere may hold children that outgrow their parent.
            let children = node
                .children
                .iter()
                .fold(0u64, |acc, child| acc.saturating_add(extent(child)));
            let scale = own.max(children);
            if scale > 0 {
                let mut cx = x;
                for (idx, child) in node.children.iter().enumerate() {
                    let cw = w * (extent(child) as f64 / scale as f64) as f32;
                    let mut child_path = path.clone();
                    child_path.push(idx);
                    stack.push((child, child_path, cx, cw));
                    cx += cw;
                }
            }
        }
        out.push(Frame {
            path,
            x,
            width: w,
            extent: own,
            node,
        });
    }
    out
}

/// Value of every node plus all of its descendants, keyed by address.
fn rolled_up(root: &FlameNode) -> HashMap<*const FlameNode, u64> {
    // Breadth-first, so children always follow their parent.
    let mut order: Vec<(&FlameNode, Option<usize>)> = vec![(root, None)];
    let mut next = 0;
    while next < order.len() {
        let node = order[next].0;
        order.extend(node.children.iter().map(|child| (child, Some(next))));
        next += 1;
    }

    let mut below = vec![0u64; order.len()];
    let mut out = HashMap::with_capacity(order.len());
    for (idx, &(node, parent)) in order.iter().enumerate().rev() {
        let total = node.value.saturating_add(below[idx]);
        if let Some(parent) = parent {
            below[parent] = below[parent].saturating_add(total);
        }
        out.insert(node as *const FlameNode, total);
    }
    out
}

pub struct IcicleRenderer {
    pub row_height: f32,
    /// How values relate to children; decides frame widths.
    pub mode: CostMode,
    format_value: fn(u64) -> String,
    focus: Vec<usize>,
}

impl IcicleRenderer {
    pub fn new(format_value: fn(u64) -> String) -> Self {
        Self {
            row_height: 20.0,
            mode: CostMode::Total,
            format_value,
            focus: Vec::new(),
        }
    }

    /// Path of the zoomed-in frame; empty when showing the whole tree.
    pub fn focus(&self) -> &[usize] {
        &self.focus
    }

    pub fn reset(&mut self) {
        self.focus.clear();
    }
}

impl FlameRenderer for IcicleRenderer {
    fn show(&mut self, ui: &mut Ui, root: &FlameNode, size: Vec2) -> FlameResponse {
        if root.at_path(&self.focus).is_none() {
            self.focus.clear();
        }
        let focused = root.at_path(&self.focus).unwrap_or(root);

        let width = size.x.max(1.0);
        let rows = focused.depth().min(MAX_FRAME_DEPTH);
        let height = (rows as f32 * self.row_height).max(size.y.min(self.row_height));
        let (rect, response) = ui.allocate_exact_size(vec2(width, height), Sense::click());

        let laid = frames(focused, width, 0.5, self.mode);
        let pointer = response.hover_pos();
        let mut hovered: Option<&Frame<'_>> = None;

        let painter = ui.painter_at(rect);
        let total = laid.first().map_or(1, |frame| frame.extent.max(1));
        for frame in &laid {
            let frame_rect = Rect::from_min_size(
                pos2(rect.min.x + frame.x, rect.min.y + frame.depth() as f32 * self.row_height),
                vec2(frame.width, self.row_height - 1.0),
            );
            let fill = colorhash::frame_color(&frame.node.name);
            painter.rect_filled(frame_rect, 1.0, fill);
            if pointer.is_some_and(|p| frame_rect.contains(p)) {
                hovered = Some(frame);
                painter.rect_stroke(
                    frame_rect,
                    1.0,
                    colorhash::highlight_stroke(fill),
                    egui::StrokeKind::Inside,
                );
            }
            if frame.width > 36.0 {
                painter.with_clip_rect(frame_rect.shrink(2.0)).text(
                    pos2(frame_rect.min.x + 4.0, frame_rect.center().y),
                    Align2::LEFT_CENTER,
                    &frame.node.name,
                    FontId::monospace(10.0),
                    colorhash::text_color_on(fill),
                );
            }
        }

        let absolute = |frame: &Frame<'_>| -> Vec<usize> {
            self.focus.iter().chain(frame.path.iter()).copied().collect()
        };
        let hovered_path = hovered.map(absolute);
        let clicked_path = if response.clicked() {
            hovered.map(absolute)
        } else {
            None
        };

        let response = match hovered {
            Some(frame) => {
                let format = self.format_value;
                let share = frame.extent as f64 / total as f64 * 100.0;
                let node = frame.node;
                let extent = frame.extent;
                response.on_hover_ui(|ui| {
                    ui.label(egui::RichText::new(&node.name).strong());
                    ui.label(format!("{}  ({share:.1}%)", format(node.value)));
                    if extent != node.value {
                        ui.label(format!("{} with callees", format(extent)));
                    }
                    if !node.children.is_empty() {
                        ui.label(
                            egui::RichText::new(format!("{} children", node.children.len())).small(),
                        );
                    }
                })
            }
            None => response,
        };

        // Clicking the focused frame zooms out one level; any other frame zooms in.
        if let Some(path) = &clicked_path {
            if *path == self.focus {
                self.focus.pop();
            } else {
                self.focus = path.clone();
            }
            log::debug!("flame focus {:?}", self.focus);
        }

        if !self.focus.is_empty() {
            let hint = themes::blend(ui.visuals().window_fill, ui.visuals().text_color(), 0.6);
            ui.label(
                egui::RichText::new("click the top frame to zoom out")
                    .small()
                    .color(hint),
            );
        }

        FlameResponse {
            response,
            hovered: hovered_path,
            clicked: clicked_path,
        }
    }
}
