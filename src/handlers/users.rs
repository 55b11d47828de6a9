use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{created_response, no_content_response, success_response, AppJson},
    services::users::{CreateUserRequest, UpdateUserRequest, UserProfile},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Extension,
};

/// List all users
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "Users in creation order", body = [UserProfile]),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;
    Ok(success_response(state.services.users.list().await?))
}

/// Create a user
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserProfile),
        (status = 400, description = "Invalid user", body = crate::errors::ErrorResponse),
        (status = 409, description = "Username taken", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> Result<Response, ServiceError> {
    user.require_admin()?;
    let created = state.services.users.create(payload).await?;
    Ok(created_response(created))
}

/// Update a user's name, role, status or password
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserProfile),
        (status = 400, description = "Invalid change", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;
    let updated = state.services.users.update(id, &user, payload).await?;
    Ok(success_response(updated))
}

/// Delete a user without reports
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Cannot delete yourself", body = crate::errors::ErrorResponse),
        (status = 409, description = "User still owns reports", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    user.require_admin()?;
    state.services.users.delete(id, &user).await?;
    Ok(no_content_response())
}
