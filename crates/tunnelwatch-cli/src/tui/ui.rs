//! TUI rendering: one panel per endpoint above a shared history chart.
//!
//! ┌──────────────────────────────────────────────┐
//! │  tunnelwatch   cycle #42   up 00:00:42       │
//! ├──────────────────────┬───────────────────────┤
//! │  server              │  client               │
//! │  Bytes in    1.2GiB  │  Bytes in    640MiB   │
//! │  Bytes out   880MiB  │  Bytes out   1.1GiB   │
//! │  CPU         41.0%   │  CPU         stale    │
//! │  ...                 │  ...                  │
//! ├──────────────────────┴───────────────────────┤
//! │  Throughput · server              (Mbps)     │
//! │  ⣀⣠⣤⣶⣿⣶⣤⣀                                     │
//! ├──────────────────────────────────────────────┤
//! │  q quit  p pause  tab endpoint  c chart      │
//! └──────────────────────────────────────────────┘

use super::app::{App, format_elapsed, format_reading};
use ratatui::{prelude::*, widgets::*};
use tunnelwatch_core::{EndpointId, Reading, Severity, StoreView, unix_secs_now};

pub fn draw(f: &mut Frame, app: &App, view: &StoreView) {
    let panel_height = app.metrics().len() as u16 + 2;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),            // title
            Constraint::Length(panel_height), // endpoints
            Constraint::Min(8),               // chart
            Constraint::Length(1),            // keys
        ])
        .split(f.area());

    draw_title(f, rows[0], app, view);
    draw_endpoints(f, rows[1], app, view);
    draw_chart(f, rows[2], app, view);
    draw_keys(f, rows[3]);
}

fn severity_style(reading: Reading) -> Style {
    match reading {
        Reading::Stale | Reading::Missing => Style::default().fg(Color::DarkGray),
        Reading::Value { severity, .. } => match severity {
            Some(Severity::Critical) => Style::default().fg(Color::Red).bold(),
            Some(Severity::Warning) => Style::default().fg(Color::Yellow),
            Some(Severity::Normal) => Style::default().fg(Color::Green),
            None => Style::default().fg(Color::White),
        },
    }
}

fn draw_title(f: &mut Frame, area: Rect, app: &App, view: &StoreView) {
    let last = view
        .current
        .values()
        .map(|s| s.timestamp())
        .fold(None, |acc: Option<f64>, ts| Some(acc.map_or(ts, |a| a.max(ts))));
    let last_update = match last {
        Some(ts) => format!("last update {:.1}s ago", (unix_secs_now() - ts).max(0.0)),
        None => "waiting for first cycle".to_string(),
    };

    let mut spans = vec![
        Span::styled(" tunnelwatch ", Style::default().bold().fg(Color::Cyan)),
        Span::styled(
            format!(
                "  cycle #{}  up {}  {last_update} ",
                view.cycles,
                format_elapsed(app.uptime())
            ),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if let Some(url) = app.server_url() {
        spans.push(Span::styled(format!(" {url} "), Style::default().fg(Color::Blue)));
    }
    if app.is_paused() {
        spans.push(Span::styled(" PAUSED ", Style::default().bold().fg(Color::Yellow)));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Line::from(spans));
    f.render_widget(block, area);
}

fn draw_endpoints(f: &mut Frame, area: Rect, app: &App, view: &StoreView) {
    let endpoints = app.endpoints();
    if endpoints.is_empty() {
        return;
    }
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(vec![
            Constraint::Ratio(1, endpoints.len() as u32);
            endpoints.len()
        ])
        .split(area);

    for (endpoint, col) in endpoints.iter().zip(cols.iter()) {
        draw_endpoint(f, *col, app, view, endpoint);
    }
}

fn draw_endpoint(f: &mut Frame, area: Rect, app: &App, view: &StoreView, endpoint: &EndpointId) {
    let selected = app.chart_endpoint() == Some(endpoint);
    let mut block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {endpoint} "));
    if selected {
        block = block.border_style(Style::default().fg(Color::Yellow));
    }

    let Some(snapshot) = view.current.get(endpoint) else {
        let p = Paragraph::new("no data yet")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(p, area);
        return;
    };

    let rows: Vec<Row> = app
        .metrics()
        .iter()
        .map(|&metric| {
            let reading = app.reading(snapshot, metric);
            Row::new(vec![
                Cell::from(metric.label()),
                Cell::from(format_reading(snapshot, metric)).style(severity_style(reading)),
            ])
        })
        .collect();

    let table = Table::new(rows, [Constraint::Length(12), Constraint::Min(10)]).block(block);
    f.render_widget(table, area);
}

const SERIES_COLORS: [Color; 2] = [Color::Cyan, Color::Magenta];

fn draw_chart(f: &mut Frame, area: Rect, app: &App, view: &StoreView) {
    let mode = app.chart_mode();
    let Some(endpoint) = app.chart_endpoint() else {
        return;
    };

    let series = super::app::chart_series(view, endpoint, mode);
    let title = format!(
        " {} · {endpoint}  ({})  {} of {} points, ring shared by {} endpoints ",
        mode.label(),
        mode.y_label(),
        view.history_for(endpoint).count(),
        app.history_capacity(),
        app.endpoints().len()
    );

    if series.iter().all(|s| s.is_empty()) {
        let p = Paragraph::new("no history yet")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title(title));
        f.render_widget(p, area);
        return;
    }

    let x_max = series
        .iter()
        .flatten()
        .map(|&(x, _)| x)
        .fold(0.0, f64::max)
        .max(10.0);
    let max_val = series.iter().flatten().map(|&(_, y)| y).fold(0.0, f64::max);
    let (y_min, y_max) = mode.y_bounds(max_val);

    let datasets: Vec<Dataset> = series
        .iter()
        .zip(mode.metrics())
        .zip(SERIES_COLORS.iter().cycle())
        .map(|((data, metric), color)| {
            let latest = data.last().map(|&(_, y)| y).unwrap_or(0.0);
            Dataset::default()
                .name(format!("{} {latest:.2}", metric.label()))
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(*color))
                .data(data)
        })
        .collect();

    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(title))
        .x_axis(Axis::default().bounds([0.0, x_max]).labels(vec![
            Line::from("0s"),
            Line::from(format!("{x_max:.0}s")),
        ]))
        .y_axis(Axis::default().bounds([y_min, y_max]).labels(vec![
            Line::from(format!("{y_min:.1}")),
            Line::from(format!("{y_max:.1}")),
        ]));

    f.render_widget(chart, area);
}

fn draw_keys(f: &mut Frame, area: Rect) {
    let bar = Paragraph::new(" q quit   p pause   tab/←→ chart endpoint   c chart mode")
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(bar, area);
}
