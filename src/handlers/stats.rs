use crate::{
    auth::AuthUser, errors::ServiceError, handlers::common::success_response,
    services::stats::AdminStats, AppState,
};
use axum::{extract::State, response::IntoResponse, Extension};

/// Company-wide report counts
#[utoipa::path(
    get,
    path = "/api/stats",
    responses(
        (status = 200, description = "Dashboard counts", body = AdminStats),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "stats"
)]
pub async fn admin_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;
    Ok(success_response(state.services.stats.admin_stats().await?))
}
