use crate::{api::ApiClient, config::Settings, tasks::Adapters, RunError};
use chrono::Local;
use cold_storage_core::{
    changed::Changed,
    reconcile::Summary,
    state::{DashboardState, LiveStatus, Mode, PolledStatus},
    thresholds::Severity,
};
use cold_storage_protocol::SensorGroup;
use crossterm::event::{self, Event, KeyCode};
use log::Level;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, List, ListItem, Paragraph, Row, Table},
    Frame,
};
use std::time::Duration;

pub(crate) async fn run(settings: &Settings) -> Result<(), RunError> {
    let client = ApiClient::new(&settings.api_url, settings.request_timeout())?;

    let (tx, mut rx) = tokio::sync::mpsc::channel(64);

    let mut state = DashboardState::new(settings.layout, settings.limits(), settings.mode);
    let mut adapters = Adapters::new(settings, client, tx);
    adapters.set_mode(settings.mode);

    let mut terminal = ratatui::init();

    let result = loop {
        if let Err(e) = terminal.draw(|f| draw(f, &state)) {
            break Err(e);
        }

        // Handle keyboard input
        match poll_key() {
            Ok(Some(KeyCode::Char('q') | KeyCode::Esc)) => break Ok(()),
            Ok(Some(KeyCode::Char(c))) => {
                if let Some(mode) = mode_for_key(c) {
                    if state.set_mode(mode) == Changed::Yes {
                        adapters.set_mode(mode);
                    }
                }
            }
            Ok(_) => {}
            Err(e) => break Err(e),
        }

        // Handle adapter events
        while let Ok(event) = rx.try_recv() {
            state.apply(event);
        }
    };

    adapters.stop();
    ratatui::restore();

    Ok(result?)
}

fn poll_key() -> std::io::Result<Option<KeyCode>> {
    if event::poll(Duration::from_millis(100))? {
        if let Event::Key(key) = event::read()? {
            return Ok(Some(key.code));
        }
    }
    Ok(None)
}

fn mode_for_key(c: char) -> Option<Mode> {
    match c {
        'l' => Some(Mode::Live),
        'p' => Some(Mode::Polled),
        'b' => Some(Mode::Both),
        _ => None,
    }
}

pub(crate) fn draw(f: &mut Frame, state: &DashboardState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(7),
            Constraint::Length(4),
            Constraint::Min(10),
            Constraint::Length(10),
        ])
        .split(f.area());

    f.render_widget(header(state), chunks[0]);

    let groups = state.layout.groups();

    for (group, area) in groups.iter().zip(columns(chunks[1], groups.len()).iter()) {
        f.render_widget(group_panel(state, *group), *area);
    }

    f.render_widget(counters(state), chunks[2]);

    for (group, area) in groups.iter().zip(columns(chunks[3], groups.len()).iter()) {
        draw_chart(f, state, *group, *area);
    }

    f.render_widget(message_log(state), chunks[4]);
}

fn columns(area: Rect, n: usize) -> std::rc::Rc<[Rect]> {
    let n = n.max(1) as u32;
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints((0..n).map(|_| Constraint::Ratio(1, n)))
        .split(area)
}

fn header(state: &DashboardState) -> Paragraph<'static> {
    let live_style = match state.live_status {
        LiveStatus::Connected => Style::default().fg(Color::Green),
        LiveStatus::Failed | LiveStatus::Lost => Style::default().fg(Color::Red),
        LiveStatus::Connecting => Style::default().fg(Color::Yellow),
        LiveStatus::Disabled => Style::default().fg(Color::DarkGray),
    };
    let polled_style = match state.polled_status {
        PolledStatus::Synced => Style::default().fg(Color::Green),
        PolledStatus::Degraded => Style::default().fg(Color::Red),
        PolledStatus::Idle => Style::default().fg(Color::Yellow),
        PolledStatus::Disabled => Style::default().fg(Color::DarkGray),
    };

    Paragraph::new(Line::from(vec![
        Span::styled(
            "Cold storage monitor",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("  mode: {}  live: ", state.mode)),
        Span::styled(state.live_status.to_string(), live_style),
        Span::raw("  polled: "),
        Span::styled(state.polled_status.to_string(), polled_style),
        Span::styled(
            "  [l] live  [p] polled  [b] both  [q] quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]))
}

fn value_style(alerting: bool) -> Style {
    if alerting {
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    }
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Critical => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        Severity::Warning => Style::default().fg(Color::Yellow),
    }
}

fn group_panel(state: &DashboardState, group: SensorGroup) -> Paragraph<'static> {
    let slot = state.alert_slot(group);

    let mut lines = match state.latest.get(&group) {
        Some(reading) => vec![
            Line::from(vec![
                Span::raw("Temperature: "),
                Span::styled(
                    format!("{:.1} °C", reading.temperature),
                    value_style(slot.temperature.is_some()),
                ),
            ]),
            Line::from(vec![
                Span::raw("Humidity:    "),
                Span::styled(
                    format!("{:.1} %", reading.humidity),
                    value_style(slot.humidity.is_some()),
                ),
            ]),
            Line::from(format!(
                "{} at {}",
                reading.source,
                reading.observed_at.with_timezone(&Local).format("%H:%M:%S")
            )),
        ],
        None => vec![Line::from("Waiting for data")],
    };

    if slot.is_empty() {
        lines.push(Line::styled("No alerts", Style::default().fg(Color::Green)));
    } else {
        for alert in slot.iter() {
            lines.push(Line::styled(
                format!("! {alert}"),
                severity_style(alert.kind.severity()),
            ));
        }
    }

    Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(group.unit_name()),
    )
}

fn counters(state: &DashboardState) -> Table<'static> {
    let header = Row::new(vec!["Live messages", "Polled fetches", "Alerts", "Data points"])
        .style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    let stats = state.stats;
    let row = Row::new(vec![
        stats.live_messages.to_string(),
        stats.polled_fetches.to_string(),
        stats.alerts.to_string(),
        stats.data_points.to_string(),
    ]);

    Table::new(vec![row], [Constraint::Percentage(25); 4])
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Counters"))
}

/// Y axis bounds covering every plotted value, never zero height.
fn bounds<'a>(data: impl IntoIterator<Item = &'a (f64, f64)>) -> (f64, f64) {
    let (min, max) = data
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), (_, y)| {
            (min.min(*y), max.max(*y))
        });

    if !min.is_finite() || !max.is_finite() {
        (0.0, 1.0)
    } else if min == max {
        (min - 1.0, max + 1.0)
    } else {
        (min.floor(), max.ceil())
    }
}

fn summary_line(summary: &Summary) -> String {
    let range = |r: Option<_>, unit: &str| match r {
        Some(cold_storage_core::reconcile::Range { min, max }) => {
            format!("{min:.1}{unit} to {max:.1}{unit}")
        }
        None => "n/a".to_string(),
    };

    format!(
        "temperature {}, humidity {}",
        range(summary.temperature, "°C"),
        range(summary.humidity, "%")
    )
}

fn draw_chart(f: &mut Frame, state: &DashboardState, group: SensorGroup, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("{} history", group.unit_name()));

    let Some(series) = state.charts.as_ref().and_then(|c| c.series(group)) else {
        let text = if state.mode.polled_enabled() {
            "Loading history"
        } else {
            "History is loaded while polling is enabled"
        };
        f.render_widget(Paragraph::new(text).block(block), area);
        return;
    };

    let temperature: Vec<(f64, f64)> = series
        .points
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.temperature.map(|t| (i as f64, t)))
        .collect();
    let humidity: Vec<(f64, f64)> = series
        .points
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.humidity.map(|h| (i as f64, h)))
        .collect();

    if temperature.is_empty() && humidity.is_empty() {
        f.render_widget(Paragraph::new("No history yet").block(block), area);
        return;
    }

    let (y_min, y_max) = bounds(temperature.iter().chain(humidity.iter()));
    let x_max = series.points.len().saturating_sub(1).max(1) as f64;
    let first = series
        .points
        .first()
        .map(|p| p.time_label.clone())
        .unwrap_or_default();
    let last = series
        .points
        .last()
        .map(|p| p.time_label.clone())
        .unwrap_or_default();

    let datasets = vec![
        Dataset::default()
            .name("°C")
            .marker(Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Red))
            .data(&temperature),
        Dataset::default()
            .name("%")
            .marker(Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&humidity),
    ];

    let chart = Chart::new(datasets)
        .block(block.title_bottom(summary_line(&state.summary(group))))
        .x_axis(Axis::default().bounds([0.0, x_max]).labels([first, last]))
        .y_axis(
            Axis::default()
                .bounds([y_min, y_max])
                .labels([format!("{y_min:.0}"), format!("{y_max:.0}")]),
        );

    f.render_widget(chart, area);
}

fn message_log(state: &DashboardState) -> List<'static> {
    let items: Vec<ListItem> = state
        .log
        .iter()
        .map(|entry| {
            let style = match entry.level {
                Level::Error => Style::default().fg(Color::Red),
                Level::Warn => Style::default().fg(Color::Yellow),
                Level::Info => Style::default(),
                Level::Debug | Level::Trace => Style::default().fg(Color::DarkGray),
            };

            ListItem::new(Line::from(vec![
                Span::styled(
                    entry.at.with_timezone(&Local).format("%H:%M:%S ").to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(entry.message.clone(), style),
            ]))
        })
        .collect();

    List::new(items).block(Block::default().borders(Borders::ALL).title("Messages"))
}
