use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use eframe::egui;
use parking_lot::RwLock;

use spanscope::api::{normalize_trace_id, SearchResponse, Suggestion, TraceDetail};
use spanscope::client::{HttpTraceService, TraceService};
use spanscope::config::{Config, FlameSource};
use spanscope::dataflow::{Delivery, Request};
use spanscope::error::FetchFailure;
use spanscope::flame::{self, CostMode, FlameNode, GroupBy};
use spanscope::span::{self, ValidatedSpans};
use spanscope::state::{Event, ExplorerState, FlameQuery, Tab, TraceKey};
use spanscope::timeline::{self, fmt_duration_ns, Timeline, TimelineParams};
use spanscope::widgets::{self, FlameRenderer, IcicleRenderer, Slot};
use spanscope::{telemetry, themes};

/// Swapped when the user connects to another backend; workers clone the
/// inner `Arc` and never hold the lock while fetching.
type SharedService = Arc<RwLock<Arc<dyn TraceService>>>;

type Fetch<K, T> = Request<K, Result<T, FetchFailure>>;

struct LoadedTrace {
    id: String,
    spans: ValidatedSpans,
}

struct Explorer {
    config: Config,
    service: SharedService,
    api_url: String,
    connect_error: Option<String>,
    crash: Option<String>,

    state: ExplorerState,

    search: Fetch<u64, SearchResponse>,
    detail: Fetch<TraceKey, TraceDetail>,
    remote_flame: Fetch<FlameQuery, FlameNode>,
    service_hints: Fetch<String, Vec<Suggestion>>,
    operation_hints: Fetch<String, Vec<Suggestion>>,

    trace: Option<LoadedTrace>,
    timeline: Option<(usize, TimelineParams, Timeline)>,
    local_flame: Option<((usize, GroupBy, CostMode), FlameNode)>,
    renderer: IcicleRenderer,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn hints<'a>(slot: &'a Fetch<String, Vec<Suggestion>>, typed: &str) -> Option<&'a [Suggestion]> {
    slot.ready_for(&typed.trim().to_owned())
        .and_then(|r| r.as_ref().ok())
        .map(Vec::as_slice)
}

fn fmt_micros(us: u64) -> String {
    fmt_duration_ns(us.saturating_mul(1_000))
}

impl Explorer {
    fn new(cc: &eframe::CreationContext<'_>, config: Config, service: Arc<dyn TraceService>) -> Self {
        themes::install(&cc.egui_ctx);

        let ctx = cc.egui_ctx.clone();
        if let Err(err) = ctrlc::set_handler(move || ctx.send_viewport_cmd(egui::ViewportCommand::Close)) {
            log::warn!("failed to set exit signal handler: {err}");
        }

        // Server-side trees count microseconds.
        let format: fn(u64) -> String = match config.flame_source {
            FlameSource::Client => fmt_duration_ns,
            FlameSource::Server => fmt_micros,
        };
        let renderer = IcicleRenderer::new(format);

        Self {
            api_url: config.api_url.clone(),
            state: ExplorerState::new(config.page_size, config.lookback_secs),
            config,
            service: Arc::new(RwLock::new(service)),
            connect_error: None,
            crash: None,
            search: Request::new(),
            detail: Request::new(),
            remote_flame: Request::new(),
            service_hints: Request::new(),
            operation_hints: Request::new(),
            trace: None,
            timeline: None,
            local_flame: None,
            renderer,
        }
    }

    fn poll(&mut self) {
        let deliveries = [
            ("search", self.search.poll()),
            ("trace", self.detail.poll()),
            ("flame", self.remote_flame.poll()),
            ("service hints", self.service_hints.poll()),
            ("operation hints", self.operation_hints.poll()),
        ];
        for (what, delivery) in &deliveries {
            if let Delivery::Failed(message) = delivery {
                self.crash = Some(format!("{what}: {message}"));
            }
        }

        if deliveries[1].1 == Delivery::Fresh {
            self.trace = match (self.detail.wanted(), self.detail.ready()) {
                (Some(key), Some(Ok(detail))) => {
                    let spans = span::validate(&detail.spans);
                    log::info!("trace {}: {} spans", key.trace_id, spans.spans.len());
                    Some(LoadedTrace {
                        id: key.trace_id.clone(),
                        spans,
                    })
                }
                (_, Some(Err(err))) => {
                    log::warn!("trace fetch failed: {err}");
                    None
                }
                _ => None,
            };
            self.timeline = None;
            self.local_flame = None;
            self.renderer.reset();
        }
        if deliveries[2].1 == Delivery::Fresh {
            self.renderer.reset();
        }
        for (slot, delivery) in [
            (&self.service_hints, &deliveries[3].1),
            (&self.operation_hints, &deliveries[4].1),
        ] {
            if let (Delivery::Fresh, Some(Err(err))) = (delivery, slot.ready()) {
                log::debug!("suggestions unavailable: {err}");
            }
        }
    }

    /// Points every request slot at what the current state wants.
    fn fetch(&mut self) {
        let service = self.service.read().clone();

        let request = self.state.search_request(now_secs());
        let svc = service.clone();
        self.search
            .ensure(self.state.search_nonce, move || svc.search(&request));

        match self.state.trace_key() {
            Some(key) => {
                let svc = service.clone();
                let id = key.trace_id.clone();
                self.detail.ensure(key, move || svc.trace(&id));
            }
            None if self.detail.wanted().is_some() => {
                self.detail.clear();
                self.remote_flame.clear();
                self.trace = None;
                self.timeline = None;
                self.local_flame = None;
            }
            None => {}
        }

        if self.config.flame_source == FlameSource::Server && self.state.tab == Tab::Flame {
            if let Some(query) = self.state.flame_query() {
                let svc = service.clone();
                let key = query.clone();
                self.remote_flame
                    .ensure(key, move || svc.flame(&query.trace_id, query.group_by, query.mode));
            }
        }

        let typed = self.state.filters.service.trim().to_owned();
        if typed.is_empty() {
            self.service_hints.clear();
        } else {
            let svc = service.clone();
            let query = typed.clone();
            self.service_hints
                .ensure(typed, move || svc.suggest_services(&query));
        }

        let typed = self.state.filters.operation.trim().to_owned();
        if typed.is_empty() {
            self.operation_hints.clear();
        } else {
            let query = typed.clone();
            self.operation_hints
                .ensure(typed, move || service.suggest_operations(&query));
        }
    }

    fn busy(&self) -> bool {
        self.search.is_pending()
            || self.detail.is_pending()
            || self.remote_flame.is_pending()
            || self.service_hints.is_pending()
            || self.operation_hints.is_pending()
    }

    fn connect(&mut self) {
        match HttpTraceService::new(&self.api_url, self.config.timeout) {
            Ok(service) => {
                log::info!("connected to {}", service.endpoints().base());
                *self.service.write() = Arc::new(service);
                self.connect_error = None;
                self.search.clear();
                self.detail.clear();
                self.remote_flame.clear();
                self.trace = None;
                self.timeline = None;
                self.local_flame = None;
            }
            Err(err) => self.connect_error = Some(err.to_string()),
        }
    }

    fn connection_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            widgets::row_label(ui, "API");
            let response = ui.add(egui::TextEdit::singleline(&mut self.api_url).desired_width(320.0));
            let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if ui.button("Connect").clicked() || submitted {
                self.connect();
            }
            if self.busy() {
                ui.add(egui::Spinner::new());
            }
        });
        if let Some(err) = &self.connect_error {
            widgets::error_label(ui, err);
        }
        if let Some(crash) = &self.crash {
            widgets::error_label(ui, crash);
        }
    }

    fn finder(&self, ui: &mut egui::Ui, events: &mut Vec<Event>) {
        let results = match (self.search.is_pending(), self.search.ready()) {
            (true, previous) => Slot::Pending(previous.and_then(|r| r.as_ref().ok())),
            (false, Some(Ok(response))) => Slot::Ready(response),
            (false, Some(Err(err))) => Slot::Failed(err),
            (false, None) => Slot::Empty,
        };
        widgets::Finder {
            state: &self.state,
            results,
            service_hints: hints(&self.service_hints, &self.state.filters.service),
            operation_hints: hints(&self.operation_hints, &self.state.filters.operation),
        }
        .show(ui, events);
    }

    fn trace_view(&mut self, ui: &mut egui::Ui, events: &mut Vec<Event>) {
        let Some(trace_id) = self.state.open_trace.clone() else {
            widgets::placeholder(ui, "Open a trace from the list above.");
            return;
        };

        ui.horizontal(|ui| {
            ui.strong("Trace:");
            ui.monospace(&trace_id);
            ui.separator();
            for tab in Tab::ALL {
                if ui.selectable_label(self.state.tab == tab, tab.title()).clicked() {
                    events.push(Event::SelectTab(tab));
                }
            }
            ui.separator();
            if ui.button("Close").clicked() {
                events.push(Event::CloseTrace);
            }
        });

        let Some(key) = self.state.trace_key() else {
            return;
        };
        match self.detail.ready_for(&key) {
            None => {
                ui.add(egui::Spinner::new());
                return;
            }
            Some(Err(err)) => {
                ui.horizontal(|ui| {
                    widgets::error_label(ui, err);
                    if ui.button("Retry").clicked() {
                        events.push(Event::Reload);
                    }
                });
                return;
            }
            Some(Ok(_)) => {}
        }
        let Some(trace) = self.trace.as_ref().filter(|t| t.id == normalize_trace_id(&trace_id)) else {
            return;
        };

        let validated = &trace.spans;
        if validated.dropped() > 0 || validated.suspect > 0 {
            ui.label(
                egui::RichText::new(format!(
                    "{} malformed records and {} duplicate ids dropped, {} spans clamped",
                    validated.rejected.len(),
                    validated.duplicates,
                    validated.suspect
                ))
                .small()
                .color(themes::warning_color()),
            )
            .on_hover_ui(|ui| {
                for rejected in validated.rejected.iter().take(20) {
                    ui.monospace(rejected.to_string());
                }
            });
        }

        match self.state.tab {
            Tab::Timeline => self.timeline_tab(ui, events),
            Tab::Flame => self.flame_tab(ui, events),
        }

        self.selection(ui, events);
    }

    fn timeline_tab(&mut self, ui: &mut egui::Ui, events: &mut Vec<Event>) {
        let Some(trace) = &self.trace else {
            return;
        };
        let params = TimelineParams::default().with_width(ui.available_width().max(240.0).floor());
        let generation = self.detail.generation();
        if self
            .timeline
            .as_ref()
            .is_none_or(|(g, p, _)| *g != generation || *p != params)
        {
            let laid = timeline::layout(&trace.spans.spans, params);
            self.timeline = Some((generation, params, laid));
        }
        let Some((_, _, laid)) = &self.timeline else {
            return;
        };

        match laid {
            Timeline::NoData => {
                widgets::placeholder(ui, "This trace has no spans.");
            }
            Timeline::Laid(layout) => {
                let selected = self.state.selected_span.as_deref();
                egui::ScrollArea::vertical()
                    .id_salt("timeline")
                    .max_height(ui.available_height() * 0.7)
                    .show(ui, |ui| {
                        if let Some(id) = widgets::show_timeline(ui, layout, &trace.spans.spans, selected) {
                            events.push(Event::SelectSpan(Some(id)));
                        }
                    });
            }
        }
    }

    fn flame_tab(&mut self, ui: &mut egui::Ui, events: &mut Vec<Event>) {
        ui.horizontal(|ui| {
            let mut group_by = self.state.group_by;
            egui::ComboBox::from_id_salt("flame_group_by")
                .selected_text(group_by.title())
                .show_ui(ui, |ui| {
                    for option in GroupBy::ALL {
                        ui.selectable_value(&mut group_by, option, option.title());
                    }
                });
            if group_by != self.state.group_by {
                events.push(Event::SetGroupBy(group_by));
            }
            for mode in [CostMode::SelfTime, CostMode::Total] {
                if ui.radio(self.state.mode == mode, mode.title()).clicked() {
                    events.push(Event::SetMode(mode));
                }
            }
        });

        let tree: Option<Result<&FlameNode, &FetchFailure>> = match self.config.flame_source {
            FlameSource::Client => {
                let Some(trace) = &self.trace else {
                    return;
                };
                let key = (self.detail.generation(), self.state.group_by, self.state.mode);
                if self.local_flame.as_ref().map(|(k, _)| *k) != Some(key) {
                    let root = flame::aggregate(
                        &trace.spans.spans,
                        key.1,
                        key.2,
                        &flame::root_label(&trace.id),
                    );
                    self.local_flame = Some((key, root));
                    self.renderer.reset();
                }
                self.local_flame.as_ref().map(|(_, root)| Ok(root))
            }
            FlameSource::Server => self
                .state
                .flame_query()
                .and_then(|query| self.remote_flame.ready_for(&query))
                .map(|r| r.as_ref()),
        };

        match tree {
            None => {
                ui.add(egui::Spinner::new());
            }
            Some(Err(err)) => {
                ui.horizontal(|ui| {
                    widgets::error_label(ui, err);
                    if ui.button("Retry").clicked() {
                        events.push(Event::Reload);
                    }
                });
            }
            Some(Ok(root)) if root.value == 0 && root.children.is_empty() => {
                widgets::placeholder(ui, "Nothing to aggregate.");
            }
            Some(Ok(root)) => {
                let renderer = &mut self.renderer;
                renderer.mode = self.state.mode;
                let hovered = egui::ScrollArea::vertical()
                    .id_salt("flame")
                    .max_height(ui.available_height() * 0.7)
                    .show(ui, |ui| {
                        let size = egui::vec2(ui.available_width(), 0.0);
                        renderer.show(ui, root, size).hovered
                    })
                    .inner;
                if let Some(path) = hovered {
                    let names: Vec<&str> = (0..=path.len())
                        .filter_map(|depth| root.at_path(&path[..depth]))
                        .map(|node| node.name.as_str())
                        .collect();
                    ui.monospace(names.join(" > "));
                }
            }
        }
    }

    fn selection(&self, ui: &mut egui::Ui, events: &mut Vec<Event>) {
        let Some(selected) = self.state.selected_span.as_deref() else {
            return;
        };
        let Some(span) = self
            .trace
            .as_ref()
            .and_then(|t| t.spans.spans.iter().find(|s| s.span_id == selected))
        else {
            return;
        };
        ui.separator();
        widgets::span_details(ui, span);
        if ui.small_button("Clear selection").clicked() {
            events.push(Event::SelectSpan(None));
        }
    }
}

impl eframe::App for Explorer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll();

        let mut events = Vec::new();
        egui::TopBottomPanel::top("connection").show(ctx, |ui| self.connection_bar(ui));
        egui::TopBottomPanel::top("finder")
            .resizable(true)
            .show(ctx, |ui| self.finder(ui, &mut events));
        egui::CentralPanel::default().show(ctx, |ui| self.trace_view(ui, &mut events));

        for event in events {
            log::trace!("{event:?}");
            self.state = std::mem::take(&mut self.state).apply(event);
        }
        self.fetch();

        if self.busy() {
            ctx.request_repaint_after(self.config.poll_interval);
        }
    }
}

fn main() {
    if let Err(err) = telemetry::init_logging() {
        eprintln!("{err}");
    }

    let config = match Config::from_env_and_args() {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err}");
            std::process::exit(2);
        }
    };
    let service = match HttpTraceService::new(&config.api_url, config.timeout) {
        Ok(service) => service,
        Err(err) => {
            log::error!("{err}");
            std::process::exit(2);
        }
    };
    log::info!("spanscope against {}", service.endpoints().base());

    let mut native_options = eframe::NativeOptions::default();
    native_options.persist_window = true;

    if let Err(err) = eframe::run_native(
        "spanscope",
        native_options,
        Box::new(move |cc| Ok(Box::new(Explorer::new(cc, config, Arc::new(service))))),
    ) {
        log::error!("{err}");
        std::process::exit(1);
    }
}
