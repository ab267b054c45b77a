//! Scheduler module
//!
//! Handles scheduled tasks:
//! - Daily market data cache refresh at a configured local time

mod refresh;

pub use refresh::RefreshScheduler;
