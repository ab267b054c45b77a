//! HTTP status API
//!
//! Read-only views over the ledger and the market data cache.

pub mod handlers;
pub mod server;
pub mod types;

pub use server::ApiServer;
