use crate::{
    error::GatewayError,
    store::{NewReading, Store},
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use cold_storage_core::reading::resolve_group_exact;
use cold_storage_protocol::{
    api::{
        AggregatedRow, CurrentStatus, DataReceived, IngestResponse, RawRow, ReceivedValues,
        Status, WindowRow,
    },
    Layout, Record, API_PREFIX, DEFAULT_DEVICE_ID,
};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Window used by `/history/{hours}` when the path does not hold a positive number of hours.
pub const DEFAULT_WINDOW_HOURS: u32 = 24;

pub fn router(store: Store) -> Router {
    let api = Router::new()
        .route("/sensor-data", post(ingest))
        .route("/current-status", get(current_status))
        .route("/raw-data", get(raw_data))
        .route("/history-all", get(history_all))
        .route("/history/{hours}", get(history))
        .with_state(store);

    Router::new()
        .nest(API_PREFIX, api)
        .layer(CorsLayer::permissive())
}

async fn ingest(
    State(store): State<Store>,
    body: Bytes,
) -> Result<Json<IngestResponse>, GatewayError> {
    let payload = Record::from_slice(&body)?;
    let layout = Layout::detect(&payload);
    let device_id = payload
        .text("device_id")
        .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string());

    let mut received = DataReceived::default();
    let mut readings = Vec::new();

    for group in layout.groups() {
        match resolve_group_exact(&payload, *group) {
            Some((temperature, humidity)) => {
                received.set(
                    *group,
                    ReceivedValues {
                        temp: temperature,
                        hum: humidity,
                    },
                );
                readings.push(NewReading {
                    group: *group,
                    temperature,
                    humidity,
                });
            }
            None => warn!("Ignoring incomplete {group} reading from {device_id}"),
        }
    }

    if readings.is_empty() {
        return Err(GatewayError::NoReadings);
    }

    let count = readings.len();
    store.insert(device_id.clone(), readings, Utc::now()).await?;
    info!("Stored {count} {layout} reading(s) from {device_id}");

    Ok(Json(IngestResponse {
        status: Status::Success,
        data_received: received,
    }))
}

async fn current_status(State(store): State<Store>) -> Result<Json<Vec<CurrentStatus>>, GatewayError> {
    let latest = store.latest().await?;
    debug!("Current status: {latest:?}");
    Ok(Json(latest.into_iter().collect()))
}

async fn raw_data(State(store): State<Store>) -> Result<Json<Vec<RawRow>>, GatewayError> {
    let rows = store.raw().await?;
    info!("Returning {} raw readings", rows.len());
    Ok(Json(rows))
}

async fn history_all(State(store): State<Store>) -> Result<Json<Vec<AggregatedRow>>, GatewayError> {
    let rows = store.aggregated().await?;
    info!("Returning {} hourly rows", rows.len());
    Ok(Json(rows))
}

async fn history(
    State(store): State<Store>,
    Path(hours): Path<String>,
) -> Result<Json<Vec<WindowRow>>, GatewayError> {
    let hours = parse_hours(&hours);
    let rows = store.window(hours, Utc::now()).await?;
    info!("Returning {} hourly rows for the last {hours} hours", rows.len());
    Ok(Json(rows))
}

fn parse_hours(s: &str) -> u32 {
    s.trim()
        .parse::<u32>()
        .ok()
        .filter(|h| *h > 0)
        .unwrap_or(DEFAULT_WINDOW_HOURS)
}
