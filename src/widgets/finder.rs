//! Trace search: filter bar, completion hints and the result table.

use eframe::egui::{self, Align, Layout, RichText, Ui};

use crate::api::{SearchResponse, SortKey, SortOrder, Suggestion};
use crate::error::FetchFailure;
use crate::state::{Event, ExplorerState, FilterField, StatusFilter};
use crate::themes;
use crate::timeline::fmt_duration_ns;
use crate::widgets::{error_label, placeholder, row_label};

const MAX_HINTS: usize = 6;

/// What the finder shows for one request slot.
pub enum Slot<'a, T> {
    Empty,
    Pending(Option<&'a T>),
    Ready(&'a T),
    Failed(&'a FetchFailure),
}

pub struct Finder<'a> {
    pub state: &'a ExplorerState,
    pub results: Slot<'a, SearchResponse>,
    pub service_hints: Option<&'a [Suggestion]>,
    pub operation_hints: Option<&'a [Suggestion]>,
}

impl Finder<'_> {
    pub fn show(self, ui: &mut Ui, events: &mut Vec<Event>) {
        self.filter_bar(ui, events);
        self.hints(ui, events);
        ui.separator();

        match self.results {
            Slot::Empty => {
                placeholder(ui, "Press Search to list recent traces.");
            }
            Slot::Failed(err) => {
                error_label(ui, err);
            }
            Slot::Pending(previous) => {
                ui.add(egui::Spinner::new());
                if let Some(previous) = previous {
                    results_table(ui, self.state, previous, events);
                }
            }
            Slot::Ready(response) if response.items.is_empty() => {
                placeholder(ui, "No traces match.");
            }
            Slot::Ready(response) => results_table(ui, self.state, response, events),
        }
    }

    fn filter_bar(&self, ui: &mut Ui, events: &mut Vec<Event>) {
        let state = self.state;
        ui.horizontal_wrapped(|ui| {
            text_filter(ui, state, FilterField::Service, "Service", 140.0, events);
            text_filter(ui, state, FilterField::Operation, "Operation", 180.0, events);

            let mut status = state.status;
            egui::ComboBox::from_id_salt("finder_status")
                .selected_text(status.title())
                .show_ui(ui, |ui| {
                    for option in StatusFilter::ALL {
                        ui.selectable_value(&mut status, option, option.title());
                    }
                });
            if status != state.status {
                events.push(Event::SetStatus(status));
            }

            row_label(ui, "ms");
            text_filter(ui, state, FilterField::MinDurationMs, "min", 60.0, events);
            text_filter(ui, state, FilterField::MaxDurationMs, "max", 60.0, events);

            if ui.button("Search").clicked() {
                events.push(Event::Search);
            }
        });

        let invalid = state.invalid_filters();
        if !invalid.is_empty() {
            ui.label(
                RichText::new("Duration bounds must be non-negative numbers; invalid ones are ignored.")
                    .small()
                    .color(themes::warning_color()),
            );
        }
    }

    fn hints(&self, ui: &mut Ui, events: &mut Vec<Event>) {
        let rows = [
            (FilterField::Service, self.service_hints),
            (FilterField::Operation, self.operation_hints),
        ];
        for (field, hints) in rows {
            let Some(hints) = hints.filter(|h| !h.is_empty()) else {
                continue;
            };
            // No hints once the field already holds a suggestion verbatim.
            let typed = self.state.filters.get(field).trim();
            if hints.iter().any(|h| h.value == typed) {
                continue;
            }
            ui.horizontal_wrapped(|ui| {
                for hint in hints.iter().take(MAX_HINTS) {
                    let label = format!("{} ({})", hint.value, hint.count);
                    if ui.small_button(label).clicked() {
                        events.push(Event::EditFilter(field, hint.value.clone()));
                    }
                }
            });
        }
    }
}

fn text_filter(
    ui: &mut Ui,
    state: &ExplorerState,
    field: FilterField,
    hint: &str,
    width: f32,
    events: &mut Vec<Event>,
) {
    let mut text = state.filters.get(field).to_owned();
    let response = ui.add(
        egui::TextEdit::singleline(&mut text)
            .hint_text(hint)
            .desired_width(width),
    );
    if response.changed() {
        events.push(Event::EditFilter(field, text));
    }
    if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
        events.push(Event::Search);
    }
}

fn sort_header(ui: &mut Ui, state: &ExplorerState, key: SortKey, events: &mut Vec<Event>) {
    let marker = match (state.sort.by == key, state.sort.order) {
        (false, _) => "",
        (true, SortOrder::Asc) => " ^",
        (true, SortOrder::Desc) => " v",
    };
    if ui
        .add(egui::Button::new(RichText::new(format!("{}{marker}", key.title())).strong()).frame(false))
        .clicked()
    {
        events.push(Event::SetSort(key));
    }
}

fn results_table(ui: &mut Ui, state: &ExplorerState, response: &SearchResponse, events: &mut Vec<Event>) {
    egui::ScrollArea::vertical()
        .id_salt("finder_results")
        .max_height(260.0)
        .auto_shrink([false, true])
        .show(ui, |ui| {
            egui::Grid::new("finder_table")
                .striped(true)
                .num_columns(7)
                .spacing([16.0, 4.0])
                .show(ui, |ui| {
                    sort_header(ui, state, SortKey::Start, events);
                    ui.strong("Service");
                    ui.strong("Operation");
                    ui.strong("Status");
                    sort_header(ui, state, SortKey::Duration, events);
                    sort_header(ui, state, SortKey::SpanCount, events);
                    ui.label("");
                    ui.end_row();

                    for item in &response.items {
                        let open = state.open_trace.as_deref()
                            == Some(crate::api::normalize_trace_id(&item.trace_id).as_str());
                        ui.monospace(&item.start_ts);
                        ui.label(RichText::new(&item.root_service).color(themes::colorhash::service_color(&item.root_service)));
                        ui.label(&item.root_operation);
                        if item.status.is_error() {
                            ui.label(RichText::new(item.status.as_str()).color(themes::error_color()));
                        } else {
                            ui.label(item.status.as_str());
                        }
                        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                            ui.monospace(fmt_duration_ns((item.duration_ms.max(0.0) * 1e6) as u64))
                                .on_hover_text(format!("{:.2} ms", item.duration_ms));
                        });
                        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                            ui.monospace(item.span_count.to_string());
                        });
                        if ui.selectable_label(open, "Open").clicked() {
                            events.push(Event::OpenTrace(item.trace_id.clone()));
                        }
                        ui.end_row();
                    }
                });
        });
}
