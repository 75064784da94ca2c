use cold_storage_core::reconcile::HistorySource;
use cold_storage_protocol::Record;
use log::debug;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub(crate) enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Client of the gateway's query endpoints.
///
/// Responses are read as loose records, fields are resolved later through field chains.
#[derive(Debug, Clone)]
pub(crate) struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    pub(crate) fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn rows(&self, path: &str) -> Result<Vec<Record>, ApiError> {
        let url = format!("{}{path}", self.base);
        debug!("GET {url}");

        let rows = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Record>>()
            .await?;

        debug!("{url} returned {} rows", rows.len());
        Ok(rows)
    }

    pub(crate) async fn current_status(&self) -> Result<Vec<Record>, ApiError> {
        self.rows("/current-status").await
    }

    pub(crate) async fn raw_data(&self) -> Result<Vec<Record>, ApiError> {
        self.rows("/raw-data").await
    }

    pub(crate) async fn history_all(&self) -> Result<Vec<Record>, ApiError> {
        self.rows("/history-all").await
    }

    pub(crate) async fn history(&self, hours: u32) -> Result<Vec<Record>, ApiError> {
        self.rows(&format!("/history/{hours}")).await
    }
}

impl HistorySource for ApiClient {
    type Error = ApiError;

    async fn aggregated(&self) -> Result<Vec<Record>, ApiError> {
        self.history_all().await
    }

    async fn raw(&self) -> Result<Vec<Record>, ApiError> {
        self.raw_data().await
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use chrono::Utc;
    use cold_storage_core::reconcile::{select_source, SourceKind};
    use cold_storage_gateway::store::{NewReading, Store};
    use cold_storage_protocol::{FieldChain, SensorGroup};

    /// Serves a gateway over `store` on an ephemeral port, returning its API base URL.
    pub(crate) async fn serve(store: Store) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(cold_storage_gateway::serve(listener, store));
        format!("http://{addr}/api/")
    }

    pub(crate) async fn store_with(readings: Vec<NewReading>) -> Store {
        let store = Store::in_memory().unwrap();
        if !readings.is_empty() {
            store
                .insert("ESP32".to_string(), readings, Utc::now())
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn fetches_rows() {
        let store = store_with(vec![NewReading {
            group: SensorGroup::Milk,
            temperature: 4.0,
            humidity: 80.0,
        }])
        .await;
        let client = ApiClient::new(&serve(store).await, Duration::from_secs(5)).unwrap();

        let status = client.current_status().await.unwrap();
        assert_eq!(status.len(), 1);
        assert!(status[0].nested("milk").is_some());

        let raw = client.raw_data().await.unwrap();
        assert_eq!(raw[0].number(&FieldChain::TEMPERATURE), Some(4.0));

        let selected = select_source(&client).await.unwrap();
        assert_eq!(selected.kind, SourceKind::Aggregated);

        assert_eq!(client.history(24).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_gateway() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            ApiClient::new(&format!("http://{addr}/api"), Duration::from_secs(1)).unwrap();
        assert!(matches!(
            client.current_status().await,
            Err(ApiError::Http(_))
        ));
    }
}
