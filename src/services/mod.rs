//! Services Layer
//!
//! Business logic shared between the CLI processes and the status API.
//!
//! # Architecture
//!
//! ```text
//! produce ──> ProducerService ──> ledger + job queue
//! work ─────> ReportService ──┬─> MarketDataService ──> cache / provider
//!                             ├─> AnalyticsService
//!                             └─> renderer + object store
//! reconcile > ReconcilerService ──> ledger
//! ```
//!
//! # Services
//!
//! - `ProducerService` - Create and enqueue a batch of jobs
//! - `ReportService` - Report state machine, worker entry point
//! - `MarketDataService` - Cache-then-live price history
//! - `AnalyticsService` - Valuation and risk metrics
//! - `ReconcilerService` - Dead-letter finalisation

pub mod analytics_service;
pub mod market_data_service;
pub mod producer_service;
pub mod reconciler_service;
pub mod report_service;

// Re-export commonly used types and services
pub use analytics_service::{AnalyticsService, PortfolioReport, PositionMetrics, RiskMetrics};
pub use market_data_service::{DataSource, MarketDataService, RefreshSummary};
pub use producer_service::{BatchSubmission, ProducerService};
pub use reconciler_service::{JobKey, ReconcilerService};
pub use report_service::{BatchOutcome, ReportService};
