use eframe::egui::{self, pos2, vec2, Align2, FontId, Rect, Sense, Stroke, Ui};

use crate::span::Span;
use crate::themes::{self, colorhash};
use crate::timeline::{fmt_duration_ns, TimelineLayout};

/// Inset of span bars within their lane.
const BAR_INSET: f32 = 4.0;
const TICK_SPACING_PX: f32 = 110.0;

/// Paints a laid out timeline. Returns the id of a clicked span.
pub fn show_timeline(
    ui: &mut Ui,
    layout: &TimelineLayout,
    spans: &[Span],
    selected: Option<&str>,
) -> Option<String> {
    let (rect, response) =
        ui.allocate_exact_size(vec2(layout.width, layout.height), Sense::click());
    if !ui.is_rect_visible(rect) {
        return None;
    }

    let painter = ui.painter_at(rect);
    let origin = rect.min.to_vec2();
    let ink = ui.visuals().text_color();
    let grid = themes::blend(ui.visuals().window_fill, ink, 0.12);
    let label_color = themes::blend(ui.visuals().window_fill, ink, 0.7);
    let label_font = FontId::monospace(10.0);
    let lane_h = layout.params.lane_height;
    let header = layout.params.header();
    let bottom = header + layout.lanes.len() as f32 * lane_h;

    for tick in layout.axis.ticks(TICK_SPACING_PX) {
        painter.line_segment(
            [pos2(tick.x, header), pos2(tick.x, bottom)].map(|p| p + origin),
            Stroke::new(1.0, grid),
        );
        painter.text(
            pos2(tick.x, header - 14.0) + origin,
            Align2::CENTER_TOP,
            tick.label,
            label_font.clone(),
            label_color,
        );
    }
    painter.text(
        pos2(layout.axis.start_px(), header - 28.0) + origin,
        Align2::LEFT_TOP,
        "Start",
        label_font.clone(),
        label_color,
    );
    painter.text(
        pos2(layout.axis.end_px(), header - 28.0) + origin,
        Align2::RIGHT_TOP,
        "End",
        label_font.clone(),
        label_color,
    );

    for lane in &layout.lanes {
        painter.line_segment(
            [pos2(0.0, lane.y + lane_h), pos2(layout.width, lane.y + lane_h)].map(|p| p + origin),
            Stroke::new(1.0, grid),
        );
        painter
            .with_clip_rect(Rect::from_min_size(
                pos2(0.0, lane.y) + origin,
                vec2(layout.params.pad - 4.0, lane_h),
            ))
            .text(
                pos2(6.0, lane.y + lane_h / 2.0) + origin,
                Align2::LEFT_CENTER,
                &lane.service,
                FontId::monospace(11.0),
                ink,
            );

        let fill = colorhash::service_color(&lane.service);
        for placed in &lane.spans {
            let span = &spans[placed.index];
            let bar = Rect::from_min_size(
                pos2(placed.x1, lane.y + BAR_INSET) + origin,
                vec2(placed.rendered_width, lane_h - 2.0 * BAR_INSET),
            );
            let fill = if span.is_error() { themes::error_color() } else { fill };
            painter.rect_filled(bar, 2.0, fill);
            if span.suspect {
                painter.rect_stroke(
                    bar,
                    2.0,
                    Stroke::new(1.5, themes::warning_color()),
                    egui::StrokeKind::Outside,
                );
            }
            if selected == Some(span.span_id.as_str()) {
                painter.rect_stroke(
                    bar,
                    2.0,
                    colorhash::highlight_stroke(fill),
                    egui::StrokeKind::Inside,
                );
            }
            if bar.width() > 40.0 {
                painter.with_clip_rect(bar.shrink(2.0)).text(
                    pos2(bar.min.x + 4.0, bar.center().y),
                    Align2::LEFT_CENTER,
                    &span.name,
                    FontId::monospace(10.0),
                    colorhash::text_color_on(fill),
                );
            }
        }
    }

    let hovered = response
        .hover_pos()
        .and_then(|pos| layout.hit(pos.x - rect.min.x, pos.y - rect.min.y));
    let clicked = response.clicked();
    if let Some(index) = hovered {
        let span = &spans[index];
        response.on_hover_ui(|ui| span_tooltip(ui, span));
    }

    if clicked {
        hovered.map(|index| spans[index].span_id.clone())
    } else {
        None
    }
}

fn span_tooltip(ui: &mut Ui, span: &Span) {
    ui.label(egui::RichText::new(&span.name).strong());
    ui.label(format!("{}  {}", span.service, fmt_duration_ns(span.duration_ns())));
    if let Some(kind) = &span.kind {
        ui.label(egui::RichText::new(kind).small());
    }
    if span.suspect {
        ui.label(
            egui::RichText::new("end preceded start; clamped")
                .small()
                .color(themes::warning_color()),
        );
    }
}

/// Attributes and status of the selected span.
pub fn span_details(ui: &mut Ui, span: &Span) {
    ui.horizontal_wrapped(|ui| {
        ui.strong(&span.name);
        ui.monospace(&span.span_id);
        ui.label(fmt_duration_ns(span.duration_ns()));
        if let Some(code) = &span.status_code {
            let text = egui::RichText::new(code).monospace();
            ui.label(if span.is_error() { text.color(themes::error_color()) } else { text });
        }
    });
    if let Some(message) = &span.status_message {
        ui.label(egui::RichText::new(message).small());
    }
    if span.attributes.is_empty() {
        return;
    }
    egui::Grid::new(("span_attributes", &span.span_id))
        .striped(true)
        .num_columns(2)
        .show(ui, |ui| {
            for (key, value) in &span.attributes {
                ui.monospace(key);
                ui.monospace(value);
                ui.end_row();
            }
        });
}
