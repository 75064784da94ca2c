use crate::{api::ApiClient, config::Settings, RunError};
use chrono::Utc;
use cold_storage_core::{
    reading::{normalize, Source},
    reconcile::{select_source, Reconciler, SelectedRows, Series, SourceKind, Summary},
    thresholds::{evaluate_all, Evaluation},
};
use log::{info, warn};

/// Prints the latest stored reading of every group and the alerts it raises.
pub(crate) async fn status(settings: &Settings) -> Result<(), RunError> {
    let client = ApiClient::new(&settings.api_url, settings.request_timeout())?;

    let Some(payload) = client.current_status().await?.into_iter().next() else {
        info!("No stored readings yet");
        return Ok(());
    };

    let normalized = normalize(&payload, settings.layout, Source::Polled, Utc::now());
    for group in normalized.dropped {
        warn!("No complete {} reading stored", group.unit_name());
    }

    let evaluations = evaluate_all(&normalized.readings, &settings.limits());
    for (reading, evaluation) in normalized.readings.iter().zip(evaluations.iter()) {
        println!(
            "{:<12}{:>7.1} °C{:>7.1} %",
            reading.group.unit_name(),
            reading.temperature,
            reading.humidity
        );
        print!("{}", format_alerts(evaluation));
    }

    Ok(())
}

/// Prints the stored history as one table per group.
///
/// With `hours` only the hourly window ending now is fetched, otherwise the same source
/// selection as the dashboard charts applies.
pub(crate) async fn history(settings: &Settings, hours: Option<u32>) -> Result<(), RunError> {
    let client = ApiClient::new(&settings.api_url, settings.request_timeout())?;

    let selected = match hours {
        Some(hours) => SelectedRows {
            kind: SourceKind::Aggregated,
            rows: client.history(hours).await?,
        },
        None => select_source(&client).await?,
    };

    if selected.rows.is_empty() {
        info!("No history stored yet");
        return Ok(());
    }

    let mut reconciler = Reconciler::new(settings.layout);
    let reconciled = reconciler.reconcile(selected);

    println!("{} rows of {}", reconciled.row_count, reconciled.source);
    for series in &reconciled.series {
        print!("{}", format_series(series, &reconciler.summary(series.group)));
    }

    Ok(())
}

fn format_alerts(evaluation: &Evaluation) -> String {
    evaluation
        .alerts
        .iter()
        .map(|alert| format!("  [{}] {alert}\n", alert.kind.severity()))
        .collect()
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}"),
        None => "-".to_string(),
    }
}

fn format_series(series: &Series, summary: &Summary) -> String {
    let mut lines = vec![series.group.unit_name().to_string()];

    if series.points.is_empty() {
        lines.push("  no data".to_string());
    } else {
        lines.push(format!("  {:<16}{:>8}{:>8}", "time", "°C", "%"));
        lines.extend(series.points.iter().map(|point| {
            format!(
                "  {:<16}{:>8}{:>8}",
                point.time_label,
                format_value(point.temperature),
                format_value(point.humidity)
            )
        }));

        if let Some(range) = summary.temperature {
            lines.push(format!(
                "  temperature {:.1} to {:.1} °C",
                range.min, range.max
            ));
        }
        if let Some(range) = summary.humidity {
            lines.push(format!("  humidity {:.1} to {:.1} %", range.min, range.max));
        }
    }

    lines.iter().map(|line| format!("{line}\n")).collect()
}
