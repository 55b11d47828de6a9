use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::export_response,
    services::{
        export::{self, FormatQuery},
        reports::{ReportFilter, ReportScope},
    },
    AppState,
};
use axum::{
    extract::{Query, State},
    response::Response,
    Extension,
};
use tracing::info;

/// All matching reports as CSV or XLSX
#[utoipa::path(
    get,
    path = "/api/export",
    params(ReportFilter, FormatQuery),
    responses(
        (status = 200, description = "Spreadsheet download", content(
            (String = "text/csv"),
            (Vec<u8> = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        )),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "exports"
)]
pub async fn export_reports(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(filter): Query<ReportFilter>,
    Query(format): Query<FormatQuery>,
) -> Result<Response, ServiceError> {
    user.require_admin()?;
    let format = format.format();
    let reports = state
        .services
        .reports
        .list_all(&filter, ReportScope::Everyone)
        .await?;
    info!(rows = reports.len(), ?format, "reports exported");
    let body = export::render(format, &[export::reports_sheet(&reports)])?;
    Ok(export_response("reports", format, body))
}

/// The caller's own reports, this month unless dates are given
#[utoipa::path(
    get,
    path = "/api/export/mine",
    params(ReportFilter, FormatQuery),
    responses(
        (status = 200, description = "Spreadsheet download", content(
            (String = "text/csv"),
            (Vec<u8> = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        )),
    ),
    security(("bearer_auth" = [])),
    tag = "exports"
)]
pub async fn export_my_reports(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(filter): Query<ReportFilter>,
    Query(format): Query<FormatQuery>,
) -> Result<Response, ServiceError> {
    let format = format.format();
    let filter = filter.default_to_current_month();
    let reports = state
        .services
        .reports
        .list_all(&filter, ReportScope::Owner(user.id))
        .await?;
    let body = export::render(format, &[export::reports_sheet(&reports)])?;
    Ok(export_response("my_reports", format, body))
}
