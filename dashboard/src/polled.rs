use crate::api::ApiClient;
use chrono::Utc;
use cold_storage_core::{
    reading::Source,
    reconcile::select_source,
    state::{Event, LogEntry, Mode, PolledStatus},
};
use log::{debug, Level};
use std::time::Duration;
use tokio::{
    sync::{
        mpsc::{error::SendError, Sender},
        watch,
    },
    time::MissedTickBehavior,
};

/// Fetches the latest stored reading once.
///
/// Failures mark polling degraded, the next tick is the retry.
pub(crate) async fn poll_once(
    client: &ApiClient,
    mode: &watch::Receiver<Mode>,
    tx: &Sender<Event>,
) -> Result<(), SendError<Event>> {
    let enabled = mode.borrow().polled_enabled();
    if !enabled {
        debug!("Skipping poll, polling disabled");
        return Ok(());
    }

    match client.current_status().await {
        Ok(rows) => {
            match rows.into_iter().next() {
                Some(payload) => {
                    tx.send(Event::Payload {
                        source: Source::Polled,
                        payload,
                        received_at: Utc::now(),
                    })
                    .await?
                }
                None => {
                    tx.send(Event::Log(LogEntry::new(
                        Level::Info,
                        "No stored readings yet",
                    )))
                    .await?
                }
            }
            tx.send(Event::PolledStatus(PolledStatus::Synced)).await?;
        }
        Err(e) => {
            tx.send(Event::PolledStatus(PolledStatus::Degraded)).await?;
            tx.send(Event::Log(LogEntry::new(
                Level::Warn,
                format!("Failed to fetch current status: {e}"),
            )))
            .await?;
        }
    }

    Ok(())
}

/// Reloads chart history once, aggregated rows preferred over raw rows.
pub(crate) async fn load_charts(
    client: &ApiClient,
    mode: &watch::Receiver<Mode>,
    tx: &Sender<Event>,
) -> Result<(), SendError<Event>> {
    let enabled = mode.borrow().polled_enabled();
    if !enabled {
        debug!("Skipping chart reload, polling disabled");
        return Ok(());
    }

    let result = select_source(client).await.map_err(|e| e.to_string());
    tx.send(Event::History(result)).await
}

pub(crate) async fn run(
    client: ApiClient,
    period: Duration,
    mode: watch::Receiver<Mode>,
    tx: Sender<Event>,
) -> Result<(), SendError<Event>> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        poll_once(&client, &mode, &tx).await?;
    }
}

pub(crate) async fn run_charts(
    client: ApiClient,
    period: Duration,
    mode: watch::Receiver<Mode>,
    tx: Sender<Event>,
) -> Result<(), SendError<Event>> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        load_charts(&client, &mode, &tx).await?;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::test::{serve, store_with};
    use cold_storage_core::{
        reconcile::SourceKind,
        state::DashboardState,
        thresholds::{AlertKind, Limits},
    };
    use cold_storage_gateway::store::NewReading;
    use cold_storage_protocol::{Layout, SensorGroup};
    use tokio::sync::mpsc;

    async fn client_for(readings: Vec<NewReading>) -> ApiClient {
        let url = serve(store_with(readings).await).await;
        ApiClient::new(&url, Duration::from_secs(5)).unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn empty_store_is_not_an_error() {
        let client = client_for(Vec::new()).await;
        let (tx, mut rx) = mpsc::channel(16);
        let (_mode_tx, mode) = watch::channel(Mode::Both);

        poll_once(&client, &mode, &tx).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Event::Log(e) if e.level == Level::Info));
        assert!(matches!(
            events[1],
            Event::PolledStatus(PolledStatus::Synced)
        ));
    }

    #[tokio::test]
    async fn polled_reading_raises_alerts() {
        let client = client_for(vec![
            NewReading {
                group: SensorGroup::Milk,
                temperature: 21.5,
                humidity: 95.0,
            },
            NewReading {
                group: SensorGroup::Vegetables,
                temperature: 8.0,
                humidity: 70.0,
            },
        ])
        .await;
        let (tx, mut rx) = mpsc::channel(16);
        let (_mode_tx, mode) = watch::channel(Mode::Both);

        poll_once(&client, &mode, &tx).await.unwrap();

        let mut state = DashboardState::new(Layout::Dual, Limits::default(), Mode::Both);
        for event in drain(&mut rx) {
            state.apply(event);
        }

        assert_eq!(state.stats.polled_fetches, 1);
        assert_eq!(state.stats.data_points, 2);
        assert_eq!(state.polled_status, PolledStatus::Synced);

        let milk = state.alert_slot(SensorGroup::Milk);
        assert_eq!(milk.temperature.unwrap().kind, AlertKind::TempHigh);
        assert_eq!(milk.humidity.unwrap().kind, AlertKind::HumidityHigh);
        assert!(state.alert_slot(SensorGroup::Vegetables).is_empty());
    }

    #[tokio::test]
    async fn unreachable_gateway_degrades() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            ApiClient::new(&format!("http://{addr}/api"), Duration::from_secs(1)).unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let (_mode_tx, mode) = watch::channel(Mode::Polled);

        poll_once(&client, &mode, &tx).await.unwrap();

        let events = drain(&mut rx);
        assert!(matches!(
            events[0],
            Event::PolledStatus(PolledStatus::Degraded)
        ));
        assert!(matches!(&events[1], Event::Log(e) if e.level == Level::Warn));
    }

    #[tokio::test]
    async fn disabled_mode_is_a_no_op() {
        let client = client_for(Vec::new()).await;
        let (tx, mut rx) = mpsc::channel(16);
        let (_mode_tx, mode) = watch::channel(Mode::Live);

        poll_once(&client, &mode, &tx).await.unwrap();
        load_charts(&client, &mode, &tx).await.unwrap();

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn charts_from_stored_history() {
        let client = client_for(vec![NewReading {
            group: SensorGroup::Milk,
            temperature: 4.0,
            humidity: 80.0,
        }])
        .await;
        let (tx, mut rx) = mpsc::channel(16);
        let (_mode_tx, mode) = watch::channel(Mode::Both);

        load_charts(&client, &mode, &tx).await.unwrap();

        match rx.try_recv() {
            Ok(Event::History(Ok(selected))) => {
                assert_eq!(selected.kind, SourceKind::Aggregated);
                assert_eq!(selected.rows.len(), 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
