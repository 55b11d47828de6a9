use crate::{
    auth::{bearer_token, AuthError, AuthUser},
    errors::ServiceError,
    handlers::common::{no_content_response, success_response, AppJson},
    services::users::{ChangePasswordRequest, UserProfile},
    AppState,
};
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserProfile,
}

/// Exchange credentials for an access token
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid username or password"),
        (status = 403, description = "Account is disabled"),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let user = state
        .auth
        .authenticate(&payload.username, &payload.password)
        .await?;
    let token = state.auth.generate_token(&user)?;
    info!(user_id = user.id, "user logged in");

    Ok(Json(LoginResponse {
        access_token: token.access_token,
        token_type: token.token_type,
        expires_in: token.expires_in,
        user: user.into(),
    }))
}

/// Revoke the presented token
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 204, description = "Token revoked")),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
) -> Result<Response, AuthError> {
    let token = bearer_token(&headers).ok_or(AuthError::MissingToken)?;
    let claims = state.auth.validate_token(token)?;
    state.auth.revoke(&claims.jti, claims.exp);
    info!(user_id = user.id, "user logged out");
    Ok(no_content_response())
}

/// Current user profile
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses((status = 200, description = "Current user", body = UserProfile)),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let profile = state.services.users.get(user.id).await?;
    Ok(success_response(profile))
}

/// Change the caller's own password
#[utoipa::path(
    post,
    path = "/api/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Wrong current password or weak new password", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> Result<Response, ServiceError> {
    state.services.users.change_password(&user, payload).await?;
    Ok(no_content_response())
}
