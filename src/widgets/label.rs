use eframe::egui::{vec2, Align2, Response, RichText, Sense, TextStyle, TextWrapMode, Ui, WidgetText};

use crate::themes;

/// Label sized to the control height, with vertically centered text.
pub fn row_label(ui: &mut Ui, text: impl Into<WidgetText>) -> Response {
    let galley = text.into().into_galley(
        ui,
        Some(TextWrapMode::Extend),
        ui.available_width().max(0.0),
        TextStyle::Monospace,
    );

    let height = ui.spacing().interact_size.y.max(galley.size().y);
    let (rect, response) = ui.allocate_exact_size(vec2(galley.size().x, height), Sense::hover());

    if ui.is_rect_visible(rect) {
        let placement = Align2::LEFT_CENTER.align_size_within_rect(galley.size(), rect);
        let text_color = if ui.visuals().dark_mode {
            themes::ral(6027)
        } else {
            themes::ral(9011)
        };
        ui.painter().with_clip_rect(rect).galley(
            placement.min - galley.rect.min.to_vec2(),
            galley,
            text_color,
        );
    }

    response
}

/// A failed request, shown in place of the content it was meant to fill.
pub fn error_label(ui: &mut Ui, message: impl std::fmt::Display) -> Response {
    ui.label(
        RichText::new(message.to_string())
            .monospace()
            .color(themes::error_color()),
    )
}

pub fn placeholder(ui: &mut Ui, text: &str) -> Response {
    ui.label(RichText::new(text).italics().small())
}
