//! Status API endpoint handlers

use crate::api::types::*;
use crate::error::{AppError, ErrorResponse};
use crate::state::AppState;
use axum::{
    extract::{Json, Path, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

/// Error returned by handlers, rendered as `ErrorResponse` JSON
pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::NotFound(_) | AppError::TickerNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            other => {
                error!("API request failed: {}", other);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Health Check
// ============================================================================

/// Health check endpoint - GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::success_with_message("Portfolio reports API is running"))
}

// ============================================================================
// Ledger
// ============================================================================

/// List a batch - GET /api/v1/batches/:batch_no/reports
pub async fn get_batch(
    AxumState(state): AxumState<Arc<AppState>>,
    Path(batch_no): Path<i64>,
) -> ApiResult<BatchView> {
    let reports = state.ledger.list_by_batch(batch_no)?;

    let mut counts = BTreeMap::new();
    for report in &reports {
        *counts.entry(report.status.to_string()).or_insert(0) += 1;
    }

    Ok(Json(ApiResponse::success(BatchView {
        batch_no,
        total: reports.len(),
        counts,
        reports,
    })))
}

/// One report and its status history - GET /api/v1/reports/:batch_no/:report_id
pub async fn get_report(
    AxumState(state): AxumState<Arc<AppState>>,
    Path((batch_no, report_id)): Path<(i64, i64)>,
) -> ApiResult<ReportView> {
    let report = state.ledger.get(report_id, batch_no)?.ok_or_else(|| {
        AppError::NotFound(format!("Report {} in batch {}", report_id, batch_no))
    })?;
    let history = state.ledger.history(report_id, batch_no)?;

    Ok(Json(ApiResponse::success(ReportView { report, history })))
}

// ============================================================================
// Market Data
// ============================================================================

/// Cache header of a ticker - GET /api/v1/market/:ticker
pub async fn get_market(
    AxumState(state): AxumState<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> ApiResult<TickerView> {
    let ticker = ticker.to_uppercase();
    let entry = state
        .cache
        .get(&ticker)?
        .ok_or_else(|| AppError::NotFound(format!("Ticker {} is not cached", ticker)))?;

    Ok(Json(ApiResponse::success(TickerView::from(entry))))
}
