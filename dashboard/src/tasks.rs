use crate::{api::ApiClient, config::Settings, live, polled};
use cold_storage_core::state::{Event, Mode};
use log::debug;
use std::future::Future;
use tokio::{
    sync::{mpsc::Sender, watch},
    task::JoinHandle,
};

/// A spawned background task that can be stopped any number of times.
pub(crate) struct Task {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl Task {
    pub(crate) fn new(name: &'static str) -> Self {
        Self { name, handle: None }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Starts `fut`, replacing (and stopping) whatever was running before.
    pub(crate) fn start<F>(&mut self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.stop();
        debug!("Starting {}", self.name);
        self.handle = Some(tokio::spawn(fut));
    }

    pub(crate) fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Stopping {}", self.name);
            handle.abort();
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The transport adapters feeding one sink, started and stopped by mode.
pub(crate) struct Adapters {
    settings: Settings,
    client: ApiClient,
    tx: Sender<Event>,
    mode: watch::Sender<Mode>,
    live: Task,
    poll: Task,
    charts: Task,
}

impl Adapters {
    pub(crate) fn new(settings: &Settings, client: ApiClient, tx: Sender<Event>) -> Self {
        Self {
            settings: settings.clone(),
            client,
            tx,
            mode: watch::Sender::new(settings.mode),
            live: Task::new("live adapter"),
            poll: Task::new("polled adapter"),
            charts: Task::new("chart refresh"),
        }
    }

    /// Brings the running adapters in line with `mode`.
    pub(crate) fn set_mode(&mut self, mode: Mode) {
        self.mode.send_replace(mode);

        if mode.live_enabled() {
            if !self.live.is_running() {
                let config = live::LiveConfig {
                    host: self.settings.broker_host.clone(),
                    port: self.settings.broker_port,
                    topic: self.settings.topic.clone(),
                    connect_timeout: self.settings.connect_timeout(),
                };
                let fut = live::run(config, self.mode.subscribe(), self.tx.clone());
                self.live.start(async move {
                    if fut.await.is_err() {
                        debug!("Event receiver gone, live adapter exiting");
                    }
                });
            }
        } else {
            self.live.stop();
        }

        if mode.polled_enabled() {
            if !self.poll.is_running() {
                let fut = polled::run(
                    self.client.clone(),
                    self.settings.poll_interval(),
                    self.mode.subscribe(),
                    self.tx.clone(),
                );
                self.poll.start(async move {
                    if fut.await.is_err() {
                        debug!("Event receiver gone, polled adapter exiting");
                    }
                });
            }

            if !self.charts.is_running() {
                let fut = polled::run_charts(
                    self.client.clone(),
                    self.settings.chart_interval(),
                    self.mode.subscribe(),
                    self.tx.clone(),
                );
                self.charts.start(async move {
                    if fut.await.is_err() {
                        debug!("Event receiver gone, chart refresh exiting");
                    }
                });
            }
        } else {
            self.poll.stop();
            self.charts.stop();
        }
    }

    pub(crate) fn stop(&mut self) {
        self.live.stop();
        self.poll.stop();
        self.charts.stop();
    }

    #[cfg(test)]
    fn running(&self) -> (bool, bool, bool) {
        (
            self.live.is_running(),
            self.poll.is_running(),
            self.charts.is_running(),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn stop_is_idempotent() {
        let mut task = Task::new("test");
        assert!(!task.is_running());
        task.stop();

        task.start(std::future::pending());
        assert!(task.is_running());

        task.stop();
        task.stop();
        assert!(!task.is_running());
    }

    #[tokio::test]
    async fn finished_task_is_not_running() {
        let mut task = Task::new("test");
        task.start(async {});

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_running());
    }

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        settings: Settings,
    }

    #[tokio::test]
    async fn mode_switches_start_and_stop_adapters() {
        let settings = Cli::parse_from([
            "test",
            "--broker-host",
            "127.0.0.1",
            "--api-url",
            "http://127.0.0.1:9/api",
        ])
        .settings;
        let client = ApiClient::new(&settings.api_url, Duration::from_secs(1)).unwrap();
        let (tx, _rx) = mpsc::channel(64);

        let mut adapters = Adapters::new(&settings, client, tx);

        adapters.set_mode(Mode::Both);
        assert_eq!(adapters.running(), (true, true, true));

        adapters.set_mode(Mode::Live);
        assert_eq!(adapters.running(), (true, false, false));

        adapters.set_mode(Mode::Polled);
        assert_eq!(adapters.running(), (false, true, true));
        assert_eq!(*adapters.mode.borrow(), Mode::Polled);

        adapters.stop();
        adapters.stop();
        assert_eq!(adapters.running(), (false, false, false));
    }
}
