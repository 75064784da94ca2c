use crate::{api::ApiClient, config::Settings, tasks::Adapters, RunError};
use cold_storage_core::state::{DashboardState, Event};
use log::{debug, info};
use std::{future::Future, io};
use tokio::sync::mpsc::Receiver;

/// Runs the adapters without a terminal UI until interrupted.
///
/// Readings, alerts and status changes reach the log through the dashboard state.
pub(crate) async fn run(settings: &Settings) -> Result<(), RunError> {
    let client = ApiClient::new(&settings.api_url, settings.request_timeout())?;

    let (tx, rx) = tokio::sync::mpsc::channel(64);

    let mut state = DashboardState::new(settings.layout, settings.limits(), settings.mode);
    let mut adapters = Adapters::new(settings, client, tx);
    adapters.set_mode(settings.mode);

    info!("Streaming events, mode: {}", settings.mode);

    let result = stream(&mut state, rx, tokio::signal::ctrl_c()).await;

    adapters.stop();
    info!("Adapters stopped");

    Ok(result?)
}

/// Applies events until `shutdown` completes or every sender is gone.
async fn stream(
    state: &mut DashboardState,
    mut rx: Receiver<Event>,
    shutdown: impl Future<Output = io::Result<()>>,
) -> io::Result<()> {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    debug!("{event:?}");
                    state.apply(event);
                }
                None => return Ok(()),
            },
            result = &mut shutdown => {
                info!("Interrupted, shutting down");
                return result;
            }
        }
    }
}
