use crate::{
    auth::AuthUser,
    entities::{inventory_item, inventory_transaction},
    errors::ServiceError,
    handlers::common::{
        export_response, success_response, AppJson, PaginatedResponse, PaginationParams,
    },
    repositories::transaction_log::TransactionFilter,
    services::{
        export::{self, ExportFormat, FormatQuery},
        ledger::{AdjustmentOutcome, AdjustmentTarget},
    },
    AppState,
};
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Extension,
};
use serde::Deserialize;
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustInventoryRequest {
    #[serde(default)]
    pub items: Vec<AdjustmentTarget>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionQuery {
    pub product_name: Option<String>,
    pub report_id: Option<i32>,
}

impl From<TransactionQuery> for TransactionFilter {
    fn from(query: TransactionQuery) -> Self {
        TransactionFilter {
            product_name: query
                .product_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
            report_id: query.report_id,
        }
    }
}

/// Current stock, catalog products first
#[utoipa::path(
    get,
    path = "/api/inventory",
    responses(
        (status = 200, description = "Inventory items", body = [inventory_item::Model]),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn list_inventory(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;
    Ok(success_response(state.services.ledger.list_items().await?))
}

/// Set absolute stock levels; the differences are logged as adjustments
#[utoipa::path(
    post,
    path = "/api/inventory/adjust",
    request_body = AdjustInventoryRequest,
    responses(
        (status = 200, description = "Items after adjustment", body = AdjustmentOutcome),
        (status = 400, description = "Invalid target", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn adjust_inventory(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(payload): AppJson<AdjustInventoryRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;
    let outcome = state.services.ledger.adjust(payload.items, user.id).await?;
    Ok(success_response(outcome))
}

/// Ledger history, newest first
#[utoipa::path(
    get,
    path = "/api/inventory/transactions",
    params(TransactionQuery, PaginationParams),
    responses(
        (status = 200, description = "Page of transactions", body = PaginatedResponse<inventory_transaction::Model>),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TransactionQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;
    let pagination = pagination.normalized();
    let page = state
        .services
        .ledger
        .transactions(&query.into(), pagination.page, pagination.per_page)
        .await?;
    Ok(success_response(PaginatedResponse::from_page(page, pagination)))
}

async fn user_names(state: &AppState) -> Result<HashMap<i32, String>, ServiceError> {
    Ok(state
        .services
        .users
        .list()
        .await?
        .into_iter()
        .map(|u| (u.id, u.full_name))
        .collect())
}

/// Stock levels ordered by product name. The XLSX workbook adds a second
/// sheet with the full ledger history.
#[utoipa::path(
    get,
    path = "/api/inventory/export",
    params(FormatQuery),
    responses(
        (status = 200, description = "Spreadsheet download", content(
            (String = "text/csv"),
            (Vec<u8> = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        )),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn export_inventory(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(format): Query<FormatQuery>,
) -> Result<Response, ServiceError> {
    user.require_admin()?;
    let format = format.format();
    let items = state.services.ledger.items_by_name().await?;
    let mut sheets = vec![export::inventory_sheet(&items)];
    if format == ExportFormat::Xlsx {
        let transactions = state
            .services
            .ledger
            .all_transactions(&TransactionFilter::default())
            .await?;
        sheets.push(export::transactions_sheet(&transactions, &user_names(&state).await?));
    }
    let body = export::render(format, &sheets)?;
    Ok(export_response("inventory", format, body))
}

/// Full ledger history, newest first
#[utoipa::path(
    get,
    path = "/api/inventory/transactions/export",
    params(TransactionQuery, FormatQuery),
    responses(
        (status = 200, description = "Spreadsheet download", content(
            (String = "text/csv"),
            (Vec<u8> = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        )),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn export_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TransactionQuery>,
    Query(format): Query<FormatQuery>,
) -> Result<Response, ServiceError> {
    user.require_admin()?;
    let format = format.format();
    let transactions = state.services.ledger.all_transactions(&query.into()).await?;
    let sheet = export::transactions_sheet(&transactions, &user_names(&state).await?);
    let body = export::render(format, &[sheet])?;
    Ok(export_response("inventory_transactions", format, body))
}
