use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{success_response, AppJson},
    services::sync::{self, SyncRequest, SyncResponse},
    AppState,
};
use axum::{extract::State, response::IntoResponse, Extension};

/// Replay reports queued while offline
#[utoipa::path(
    post,
    path = "/api/sync",
    request_body = SyncRequest,
    responses((status = 200, description = "Per-entry outcome", body = SyncResponse)),
    security(("bearer_auth" = [])),
    tag = "sync"
)]
pub async fn sync_reports(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(payload): AppJson<SyncRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = sync::replay(&state.services.reports, &user, payload).await?;
    Ok(success_response(outcome))
}
