//! Report document rendering

mod pdf;

use crate::error::Result;
use crate::services::analytics_service::PortfolioReport;

pub use pdf::PdfDashboardRenderer;

/// Turns a computed report into document bytes
pub trait ReportRenderer: Send + Sync {
    /// MIME type of the rendered document
    fn content_type(&self) -> &'static str;

    fn render(&self, report: &PortfolioReport) -> Result<Vec<u8>>;
}
