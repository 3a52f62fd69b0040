use egui::style::{Selection, WidgetVisuals, Widgets};
use egui::{Color32, Stroke, Style, Visuals};

pub mod colorhash;
pub mod ral;
use ral::RAL_COLORS;

/// Mixes `a` toward `b` per channel; `t` is clamped to `0..=1`.
pub fn blend(a: Color32, b: Color32, t: f32) -> Color32 {
    let t = t.clamp(0.0, 1.0);
    let mix = |x: u8, y: u8| (x as f32 * (1.0 - t) + y as f32 * t).round() as u8;
    Color32::from_rgb(mix(a.r(), b.r()), mix(a.g(), b.g()), mix(a.b(), b.b()))
}

pub fn ral(num: u16) -> Color32 {
    RAL_COLORS
        .iter()
        .find(|(code, _, _)| *code == num)
        .map(|(_, _, c)| *c)
        .unwrap_or(Color32::from_rgb(0, 0, 0))
}

/// Failed requests and error spans.
pub fn error_color() -> Color32 {
    ral(3020)
}

/// Frame around suspect (clamped) spans.
pub fn warning_color() -> Color32 {
    ral(2005)
}

/// Build visuals from the RAL palette for a clean, industrial feel.
pub fn industrial(
    foreground: Color32,
    background: Color32,
    surface: Color32,
    accent: Color32,
    mut base_visuals: Visuals,
) -> Visuals {
    let border = blend(foreground, background, 0.4);
    let weak_text = blend(foreground, background, 0.55);
    let control_fill_hover = blend(background, foreground, 0.05);
    let control_fill_active = blend(control_fill_hover, ral(9011), 0.12);

    base_visuals.window_fill = background;
    base_visuals.panel_fill = background;
    base_visuals.weak_text_color = Some(weak_text);
    base_visuals.faint_bg_color = blend(surface, background, 0.2);
    base_visuals.extreme_bg_color = control_fill_hover;
    base_visuals.selection = Selection {
        bg_fill: blend(background, foreground, 0.12),
        stroke: Stroke::new(1.5, accent),
    };
    base_visuals.hyperlink_color = ral(5005);
    base_visuals.window_stroke = Stroke::new(1.0, border);

    let widget = |fill: Color32, stroke: Stroke, radius: f32| WidgetVisuals {
        bg_fill: fill,
        weak_bg_fill: fill,
        bg_stroke: stroke,
        fg_stroke: Stroke::new(1.0, foreground),
        corner_radius: radius.into(),
        expansion: 0.0,
    };
    base_visuals.widgets = Widgets {
        noninteractive: widget(surface, Stroke::new(1.0, border), 0.0),
        inactive: widget(background, Stroke::new(1.0, border), 2.0),
        hovered: widget(control_fill_hover, Stroke::new(1.4, border), 2.0),
        active: widget(control_fill_active, Stroke::new(1.4, accent), 2.0),
        open: widget(control_fill_hover, Stroke::new(1.4, accent), 2.0),
    };
    base_visuals.window_shadow = egui::epaint::Shadow::NONE;

    base_visuals
}

fn industrial_style(visuals: Visuals) -> Style {
    let mut style = Style {
        visuals,
        ..Default::default()
    };
    style.spacing.item_spacing = egui::vec2(10.0, 8.0);
    style.spacing.button_padding = egui::vec2(10.0, 4.0);
    style.animation_time = 0.12;
    style
}

pub fn industrial_light() -> Style {
    industrial_style(industrial(
        ral(9011),
        ral(7047),
        ral(9003),
        ral(2009),
        Visuals::light(),
    ))
}

pub fn industrial_dark() -> Style {
    industrial_style(industrial(
        ral(9003),
        ral(9004),
        ral(9011),
        ral(2009),
        Visuals::dark(),
    ))
}

/// Follows the desktop's light/dark setting, dark when unknown.
pub fn system_theme() -> egui::ThemePreference {
    match dark_light::detect() {
        Ok(dark_light::Mode::Light) => egui::ThemePreference::Light,
        Ok(dark_light::Mode::Dark) => egui::ThemePreference::Dark,
        Ok(dark_light::Mode::Unspecified) | Err(_) => egui::ThemePreference::Dark,
    }
}

pub fn install(ctx: &egui::Context) {
    ctx.set_style_of(egui::Theme::Light, industrial_light());
    ctx.set_style_of(egui::Theme::Dark, industrial_dark());
    ctx.set_theme(system_theme());
}
