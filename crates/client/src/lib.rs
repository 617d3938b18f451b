//! Data pipeline for the satellite-tracking dashboard: typed endpoint
//! schemas, epoch-guarded data stores, and the visibility reconciliation
//! feed. Rendering, auth, and the computing backend live elsewhere; this
//! crate only turns backend records into orderly client state.

pub mod api;
pub mod stores;
pub mod transport;
pub mod view;
pub mod visibility;
