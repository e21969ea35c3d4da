//! TUI application state and event loop.
//!
//! Design: the collector runs on the tokio runtime and publishes into the
//! shared store; this loop only reads. Each frame captures one `StoreView`
//! so every panel and the chart render the same instant.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;

use tunnelwatch_core::{
    EndpointId, MetricId, Reading, Snapshot, StoreView, TelemetryStore, ThresholdTable,
    classify_snapshot,
};

use crate::commands::{format_bytes, to_mbps};

// ---------------------------------------------------------------------------
// ChartMode
// ---------------------------------------------------------------------------

/// What the chart Y axis shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartMode {
    #[default]
    Throughput,
    Resources,
    Latency,
    Connections,
}

impl ChartMode {
    pub fn next(self) -> Self {
        match self {
            Self::Throughput => Self::Resources,
            Self::Resources => Self::Latency,
            Self::Latency => Self::Connections,
            Self::Connections => Self::Throughput,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Throughput => "Throughput",
            Self::Resources => "CPU / memory",
            Self::Latency => "Latency",
            Self::Connections => "Connections",
        }
    }

    pub fn y_label(self) -> &'static str {
        match self {
            Self::Throughput => "Mbps",
            Self::Resources => "%",
            Self::Latency => "ms",
            Self::Connections => "count",
        }
    }

    /// Metrics plotted in this mode, one dataset each.
    pub fn metrics(self) -> &'static [MetricId] {
        match self {
            Self::Throughput => &[MetricId::BytesIn, MetricId::BytesOut],
            Self::Resources => &[MetricId::CpuPercent, MetricId::MemoryPercent],
            Self::Latency => &[MetricId::LatencyMs],
            Self::Connections => &[MetricId::ActiveConnections],
        }
    }

    /// Plotted value of `metric` in `snapshot`; counters plot their rate in Mbps.
    pub fn value_from(self, snapshot: &Snapshot, metric: MetricId) -> Option<f64> {
        if snapshot.is_stale(metric) {
            return None;
        }
        if metric.is_counter() {
            snapshot.rate(metric).map(to_mbps)
        } else {
            snapshot.value(metric)
        }
    }

    /// Y bounds with a little headroom; percentages pin to 0..100.
    pub fn y_bounds(self, max_val: f64) -> (f64, f64) {
        match self {
            Self::Resources => (0.0, 100.0),
            _ => (0.0, (max_val * 1.2).max(1.0)),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Chart series for `endpoint`: one `(seconds since first point, value)`
/// vector per metric of `mode`. Stale points are left out.
pub fn chart_series(view: &StoreView, endpoint: &EndpointId, mode: ChartMode) -> Vec<Vec<(f64, f64)>> {
    let history: Vec<&Arc<Snapshot>> = view.history_for(endpoint).collect();
    let t0 = history.first().map(|s| s.timestamp()).unwrap_or(0.0);
    mode.metrics()
        .iter()
        .map(|&metric| {
            history
                .iter()
                .filter_map(|s| mode.value_from(s, metric).map(|v| (s.timestamp() - t0, v)))
                .collect()
        })
        .collect()
}

/// Human-readable value for one metric of a snapshot.
pub fn format_reading(snapshot: &Snapshot, metric: MetricId) -> String {
    if snapshot.is_stale(metric) {
        return "stale".to_string();
    }
    let Some(value) = snapshot.value(metric) else {
        return "n/a".to_string();
    };
    match metric {
        MetricId::BytesIn | MetricId::BytesOut => {
            let rate = snapshot.rate(metric).unwrap_or(0.0);
            format!(
                "{}  {}/s  {:.2} Mbps",
                format_bytes(value),
                format_bytes(rate),
                to_mbps(rate)
            )
        }
        MetricId::ActiveConnections => format!("{value:.0}"),
        MetricId::CpuPercent | MetricId::MemoryPercent => format!("{value:.1}%"),
        MetricId::LatencyMs => format!("{value:.1} ms"),
    }
}

/// `HH:MM:SS` for a duration.
pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct App {
    store: Arc<TelemetryStore>,
    endpoints: Vec<EndpointId>,
    metrics: Vec<MetricId>,
    thresholds: ThresholdTable,
    started: Instant,
    running: bool,
    /// View held on screen while paused.
    frozen: Option<StoreView>,
    chart_endpoint: usize,
    chart_mode: ChartMode,
    /// Shown in the title bar when the HTTP exporter runs alongside.
    server_url: Option<String>,
}

impl App {
    pub fn new(
        store: Arc<TelemetryStore>,
        endpoints: Vec<EndpointId>,
        metrics: Vec<MetricId>,
        thresholds: ThresholdTable,
    ) -> Self {
        Self {
            store,
            endpoints,
            metrics,
            thresholds,
            started: Instant::now(),
            running: true,
            frozen: None,
            chart_endpoint: 0,
            chart_mode: ChartMode::default(),
            server_url: None,
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Install panic hook that restores terminal before printing the panic.
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
            original_hook(info);
        }));

        let result = self.run_loop(&mut terminal);

        // Always restore terminal, even if the loop returned an error.
        let _ = std::panic::take_hook();
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            crossterm::cursor::Show
        )?;

        result
    }

    fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        while self.running {
            let view = self.snapshot();
            terminal.draw(|f| super::ui::draw(f, self, &view))?;

            if event::poll(Duration::from_millis(50))?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                self.handle_key(key.code);
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Char('p') | KeyCode::Char(' ') => {
                self.frozen = match self.frozen.take() {
                    Some(_) => None,
                    None => Some(self.store.view()),
                };
            }
            KeyCode::Tab | KeyCode::Right => {
                if !self.endpoints.is_empty() {
                    self.chart_endpoint = (self.chart_endpoint + 1) % self.endpoints.len();
                }
            }
            KeyCode::BackTab | KeyCode::Left => {
                if !self.endpoints.is_empty() {
                    self.chart_endpoint =
                        (self.chart_endpoint + self.endpoints.len() - 1) % self.endpoints.len();
                }
            }
            KeyCode::Char('c') => self.chart_mode = self.chart_mode.next(),
            _ => {}
        }
    }

    /// Store contents for one frame, or the frozen view while paused.
    pub fn snapshot(&self) -> StoreView {
        match &self.frozen {
            Some(view) => view.clone(),
            None => self.store.view(),
        }
    }

    // --- Public accessors ---

    pub fn endpoints(&self) -> &[EndpointId] {
        &self.endpoints
    }

    pub fn metrics(&self) -> &[MetricId] {
        &self.metrics
    }

    pub fn is_paused(&self) -> bool {
        self.frozen.is_some()
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn chart_mode(&self) -> ChartMode {
        self.chart_mode
    }

    pub fn chart_endpoint(&self) -> Option<&EndpointId> {
        self.endpoints.get(self.chart_endpoint)
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    pub fn history_capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn reading(&self, snapshot: &Snapshot, metric: MetricId) -> Reading {
        classify_snapshot(snapshot, metric, &self.thresholds)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
