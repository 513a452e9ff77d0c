//! Klaatu Ping Server
//!
//! Collects telemetry pings posted by browsers under test and hands them back
//! to test drivers.
//!
//! # Routes
//!
//! ```text
//! POST   /submit/{suffix...}   append body as one ping
//! POST   /pings                append body as one ping
//! GET    /pings                all pings, arrival order
//! DELETE /pings                reset the store
//! POST   /experiment           register {"experiment_url": ...}
//! GET    /experiment           registered URLs
//! DELETE /experiment           forget registered URLs
//! GET    /                     health
//! ```

pub mod experiments;
pub mod server;
pub mod store;

pub use experiments::ExperimentRegistry;
pub use server::{AppState, PingServer, PingServerHandle};
pub use store::PingStore;
