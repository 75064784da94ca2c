use chrono::Utc;
use cold_storage_core::{
    reading::Source,
    state::{Event, LiveStatus, LogEntry, Mode},
};
use cold_storage_protocol::Record;
use log::{debug, Level};
use rumqttc::{AsyncClient, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::{
    mpsc::{error::SendError, Sender},
    watch,
};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub(crate) struct LiveConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub connect_timeout: Duration,
}

/// Keeps one subscription to the broker open, forwarding every message as an event.
///
/// Returns only once the event receiver is gone. Connection failures are reported as status
/// changes and retried with a fresh subscription, messages missed in the meantime are not
/// replayed.
pub(crate) async fn run(
    config: LiveConfig,
    mode: watch::Receiver<Mode>,
    tx: Sender<Event>,
) -> Result<(), SendError<Event>> {
    let client_id = format!("cold-storage-dashboard-{}", uuid::Uuid::new_v4());

    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(30));
    options.set_clean_session(true);

    let (client, mut event_loop) = AsyncClient::new(options, 10);
    let mut connected = false;

    tx.send(Event::LiveStatus(LiveStatus::Connecting)).await?;

    loop {
        let event = if connected {
            event_loop.poll().await
        } else {
            match tokio::time::timeout(config.connect_timeout, event_loop.poll()).await {
                Ok(event) => event,
                Err(_) => {
                    tx.send(Event::LiveStatus(LiveStatus::Failed)).await?;
                    tx.send(log(
                        Level::Warn,
                        format!(
                            "No answer from broker {}:{} within {:?}",
                            config.host, config.port, config.connect_timeout
                        ),
                    ))
                    .await?;
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            }
        };

        match event {
            Ok(rumqttc::Event::Incoming(Packet::ConnAck(_))) => {
                connected = true;

                if let Err(e) = client.subscribe(&config.topic, QoS::AtMostOnce).await {
                    tx.send(log(Level::Warn, format!("Failed to subscribe: {e}")))
                        .await?;
                    continue;
                }

                tx.send(Event::LiveStatus(LiveStatus::Connected)).await?;
                tx.send(log(
                    Level::Info,
                    format!("Subscribed to {}", config.topic),
                ))
                .await?;
            }
            Ok(rumqttc::Event::Incoming(Packet::Publish(publish))) => {
                let enabled = mode.borrow().live_enabled();
                if !enabled {
                    debug!("Ignoring message on {}, live channel disabled", publish.topic);
                    continue;
                }

                tx.send(decode(&publish.topic, &publish.payload)).await?;
            }
            Ok(_) => {}
            Err(e) => {
                let status = if connected {
                    LiveStatus::Lost
                } else {
                    LiveStatus::Failed
                };
                connected = false;

                tx.send(Event::LiveStatus(status)).await?;
                tx.send(log(Level::Warn, format!("Broker connection error: {e}")))
                    .await?;
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Turns a received message into a payload event, or a log entry if it is not a JSON object.
pub(crate) fn decode(topic: &str, payload: &[u8]) -> Event {
    match Record::from_slice(payload) {
        Ok(payload) => Event::Payload {
            source: Source::Live,
            payload,
            received_at: Utc::now(),
        },
        Err(e) => log(
            Level::Warn,
            format!("Dropped malformed message on {topic}: {e}"),
        ),
    }
}

fn log(level: Level, message: String) -> Event {
    Event::Log(LogEntry::new(level, message))
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn decode_valid_message() {
        let event = decode(
            "esp32/data",
            br#"{"milk": {"temperature": 4, "humidity": 80}}"#,
        );

        match event {
            Event::Payload {
                source, payload, ..
            } => {
                assert_eq!(source, Source::Live);
                assert!(payload.nested("milk").is_some());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn decode_malformed_message() {
        for bad in [&b"not json"[..], b"[1, 2, 3]", b""] {
            match decode("esp32/data", bad) {
                Event::Log(entry) => {
                    assert_eq!(entry.level, Level::Warn);
                    assert!(entry.message.contains("esp32/data"));
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn refused_connection_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::channel(16);
        let (_mode_tx, mode_rx) = watch::channel(Mode::Both);

        let handle = tokio::spawn(run(
            LiveConfig {
                host: "127.0.0.1".to_string(),
                port,
                topic: "esp32/data".to_string(),
                connect_timeout: Duration::from_secs(2),
            },
            mode_rx,
            tx,
        ));

        assert!(matches!(
            rx.recv().await,
            Some(Event::LiveStatus(LiveStatus::Connecting))
        ));
        assert!(matches!(
            rx.recv().await,
            Some(Event::LiveStatus(LiveStatus::Failed))
        ));

        handle.abort();
    }

    #[tokio::test]
    async fn silent_broker_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Accepts the connection but never answers the CONNECT packet.
        let broker = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let (tx, mut rx) = mpsc::channel(16);
        let (_mode_tx, mode_rx) = watch::channel(Mode::Live);

        let handle = tokio::spawn(run(
            LiveConfig {
                host: "127.0.0.1".to_string(),
                port,
                topic: "esp32/data".to_string(),
                connect_timeout: Duration::from_millis(200),
            },
            mode_rx,
            tx,
        ));

        assert!(matches!(
            rx.recv().await,
            Some(Event::LiveStatus(LiveStatus::Connecting))
        ));
        assert!(matches!(
            rx.recv().await,
            Some(Event::LiveStatus(LiveStatus::Failed))
        ));
        match rx.recv().await {
            Some(Event::Log(entry)) => {
                assert_eq!(entry.level, Level::Warn);
                assert!(entry.message.contains("No answer from broker"));
                assert!(entry.message.contains("200ms"));
            }
            other => panic!("unexpected event {other:?}"),
        }

        handle.abort();
        broker.abort();
    }
}
