//! HTTP gateway persisting sensor readings and answering the dashboard's history queries.

// Used by the binary only.
use clap as _;
use git_version as _;
use tracing_subscriber as _;

pub mod error;
pub mod routes;
pub mod store;

pub use routes::router;
pub use store::Store;

/// Serves the API on an already bound listener until the server fails.
pub async fn serve(listener: tokio::net::TcpListener, store: Store) -> std::io::Result<()> {
    axum::serve(listener, router(store)).await
}
