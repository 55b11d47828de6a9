use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{
        created_response, no_content_response, success_response, AppJson, PaginatedResponse,
        PaginationParams,
    },
    services::{
        report_input::{NumberOrText, ProductLineInput, ReportSubmission},
        reports::{ReportAttachments, ReportDetail, ReportFilter, ReportStats},
        uploads::IncomingFile,
    },
    AppState,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension,
};
use serde_json::Value;

fn multipart_error(err: MultipartError) -> ServiceError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge("Upload is too large".into())
    } else {
        ServiceError::BadRequest(format!("Malformed form data: {}", err.body_text()))
    }
}

/// Installation types may arrive as one JSON-encoded field or as repeated fields.
fn installation_types_value(mut values: Vec<String>) -> Option<Value> {
    match values.len() {
        0 => None,
        1 if values[0].trim_start().starts_with('[') => values.pop().map(Value::String),
        _ => Some(Value::Array(values.into_iter().map(Value::String).collect())),
    }
}

/// Reads the report form: plain text fields, a JSON `products` field,
/// repeated `images` (or `images[]`) files and a single `delivery_note` file.
pub async fn read_report_form(
    mut multipart: Multipart,
) -> Result<(ReportSubmission, ReportAttachments), ServiceError> {
    let mut submission = ReportSubmission::default();
    let mut attachments = ReportAttachments::default();
    let mut installation_types = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "images" | "images[]" | "delivery_note" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if bytes.is_empty() && file_name.as_deref().map_or(true, str::is_empty) {
                    continue;
                }
                let file = IncomingFile {
                    file_name,
                    bytes: bytes.to_vec(),
                };
                if name == "delivery_note" {
                    attachments.delivery_note = Some(file);
                } else {
                    attachments.images.push(file);
                }
            }
            _ => {
                let text = field.text().await.map_err(multipart_error)?;
                match name.as_str() {
                    "report_type" => submission.report_type = Some(text),
                    "customer_name" => submission.customer_name = Some(text),
                    "company_project" => submission.company_project = Some(text),
                    "address" => submission.address = Some(text),
                    "status" => submission.status = Some(text),
                    "report_datetime" => submission.report_datetime = Some(text),
                    "notes" => submission.notes = Some(text),
                    "installation_type" => submission.installation_type = Some(text),
                    "installation_types" | "installation_types[]" => installation_types.push(text),
                    "protections_count" => {
                        submission.protections_count = Some(NumberOrText::Text(text))
                    }
                    "products" => {
                        let text = text.trim();
                        if !text.is_empty() {
                            submission.products = serde_json::from_str::<Vec<ProductLineInput>>(text)
                                .map_err(|e| ServiceError::BadRequest(format!("Invalid products: {e}")))?;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    submission.installation_types = installation_types_value(installation_types);
    Ok((submission, attachments))
}

/// File a new report with its photos and delivery note
#[utoipa::path(
    post,
    path = "/api/reports",
    request_body(content = String, content_type = "multipart/form-data", description = "Report fields, `products` as JSON, `images[]` and `delivery_note` files"),
    responses(
        (status = 201, description = "Report created", body = ReportDetail),
        (status = 400, description = "Invalid report", body = crate::errors::ErrorResponse),
        (status = 413, description = "Upload too large", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn create_report(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Response, ServiceError> {
    let (submission, attachments) = read_report_form(multipart).await?;
    let report = state
        .services
        .reports
        .create(&user, submission, attachments)
        .await?;
    Ok(created_response(report))
}

/// List reports visible to the caller
#[utoipa::path(
    get,
    path = "/api/reports",
    params(ReportFilter, PaginationParams),
    responses(
        (status = 200, description = "Page of reports", body = PaginatedResponse<ReportDetail>),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn list_reports(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(filter): Query<ReportFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let pagination = pagination.normalized();
    let page = state
        .services
        .reports
        .list(&user, &filter, pagination.page, pagination.per_page)
        .await?;
    Ok(success_response(PaginatedResponse::from_page(page, pagination)))
}

/// Fetch one report
#[utoipa::path(
    get,
    path = "/api/reports/{id}",
    params(("id" = i32, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report", body = ReportDetail),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn get_report(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = state.services.reports.get(id, &user).await?;
    Ok(success_response(report))
}

/// Replace a report's fields and product lines
#[utoipa::path(
    put,
    path = "/api/reports/{id}",
    params(("id" = i32, Path, description = "Report id")),
    request_body = ReportSubmission,
    responses(
        (status = 200, description = "Report updated", body = ReportDetail),
        (status = 400, description = "Invalid report", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn update_report(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
    AppJson(submission): AppJson<ReportSubmission>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = state.services.reports.update(id, &user, submission).await?;
    Ok(success_response(report))
}

/// Delete a report and restore its stock
#[utoipa::path(
    delete,
    path = "/api/reports/{id}",
    params(("id" = i32, Path, description = "Report id")),
    responses(
        (status = 204, description = "Report deleted"),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn delete_report(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    state.services.reports.delete(id, &user).await?;
    Ok(no_content_response())
}

/// Report counts for the caller, or for everyone when called by an admin
#[utoipa::path(
    get,
    path = "/api/reports/stats",
    responses((status = 200, description = "Report counts", body = ReportStats)),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn report_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let stats = state.services.reports.stats(&user).await?;
    Ok(success_response(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installation_types_accept_json_or_repeated_fields() {
        assert_eq!(installation_types_value(vec![]), None);
        assert_eq!(
            installation_types_value(vec![r#"["Floor","Walls"]"#.into()]),
            Some(Value::String(r#"["Floor","Walls"]"#.into()))
        );
        assert_eq!(
            installation_types_value(vec!["Floor".into()]),
            Some(Value::Array(vec![Value::String("Floor".into())]))
        );
    }
}
