//! Reading pipeline of the cold-storage monitor.
//!
//! Payloads arriving from either transport are turned into [`reading::CanonicalReading`]s by the
//! normaliser, checked against [`thresholds::Limits`], and folded into a single
//! [`state::DashboardState`] owned by whichever sink is presenting them. Historical rows go through
//! the [`reconcile::Reconciler`] to become one chartable series per sensor group.

pub mod changed;
pub mod reading;
pub mod reconcile;
pub mod state;
pub mod thresholds;

pub use cold_storage_protocol as protocol;
