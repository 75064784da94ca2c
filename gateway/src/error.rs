use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cold_storage_protocol::{api::ErrorResponse, RecordError};
use tracing::{error, warn};

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("invalid payload: {0}")]
    Payload(#[from] RecordError),

    #[error("payload did not contain a complete temperature and humidity reading")]
    NoReadings,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Payload(_) | Self::NoReadings => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("Request failed: {self}");
        } else {
            warn!("Rejected request: {self}");
        }

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
