use crate::{
    auth::AuthUser,
    entities::company_project,
    errors::ServiceError,
    handlers::common::{created_response, no_content_response, success_response, AppJson},
    services::projects::CreateProjectRequest,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Extension,
};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProjectListParams {
    /// Admin only
    #[serde(default)]
    pub include_inactive: bool,
}

/// List project names for the report form
#[utoipa::path(
    get,
    path = "/api/projects",
    params(ProjectListParams),
    responses((status = 200, description = "Projects by name", body = [company_project::Model])),
    security(("bearer_auth" = [])),
    tag = "projects"
)]
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ProjectListParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let include_inactive = params.include_inactive && user.is_admin();
    Ok(success_response(
        state.services.projects.list(include_inactive).await?,
    ))
}

/// Add or reactivate a project name
#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project available", body = company_project::Model),
        (status = 400, description = "Blank name", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "projects"
)]
pub async fn create_project(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(payload): AppJson<CreateProjectRequest>,
) -> Result<Response, ServiceError> {
    user.require_admin()?;
    let project = state.services.projects.create(payload).await?;
    Ok(created_response(project))
}

/// Remove a project name
#[utoipa::path(
    delete,
    path = "/api/projects/{id}",
    params(("id" = i32, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "projects"
)]
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    user.require_admin()?;
    state.services.projects.delete(id).await?;
    Ok(no_content_response())
}
