use axum::{response::IntoResponse, routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Field Reports API",
        version = "1.0.0",
        description = r#"
# Field Reports API

Delivery and installation reports filed from the field, with the inventory
ledger they consume from.

## Authentication

Log in at `/api/auth/login` and send the token on every call:

```
Authorization: Bearer <your-jwt-token>
```

## Errors

Failures return a JSON body with `error`, `message`, `timestamp` and the
`request_id` echoed from the `x-request-id` header.
        "#
    ),
    tags(
        (name = "auth", description = "Login, logout and password changes"),
        (name = "reports", description = "Delivery and installation reports"),
        (name = "sync", description = "Offline report replay"),
        (name = "inventory", description = "Stock levels and the ledger history"),
        (name = "exports", description = "CSV downloads"),
        (name = "users", description = "User administration"),
        (name = "projects", description = "Company project names"),
        (name = "stats", description = "Dashboard counts"),
        (name = "health", description = "Liveness and readiness")
    ),
    paths(
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::auth::me,
        crate::handlers::auth::change_password,

        crate::handlers::reports::create_report,
        crate::handlers::reports::list_reports,
        crate::handlers::reports::get_report,
        crate::handlers::reports::update_report,
        crate::handlers::reports::delete_report,
        crate::handlers::reports::report_stats,

        crate::handlers::sync::sync_reports,

        crate::handlers::inventory::list_inventory,
        crate::handlers::inventory::adjust_inventory,
        crate::handlers::inventory::list_transactions,
        crate::handlers::inventory::export_inventory,
        crate::handlers::inventory::export_transactions,

        crate::handlers::exports::export_reports,
        crate::handlers::exports::export_my_reports,

        crate::handlers::users::list_users,
        crate::handlers::users::create_user,
        crate::handlers::users::update_user,
        crate::handlers::users::delete_user,

        crate::handlers::projects::list_projects,
        crate::handlers::projects::create_project,
        crate::handlers::projects::delete_project,

        crate::handlers::stats::admin_stats,

        crate::health::health_check,
        crate::health::readiness_check,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::entities::sea_orm_active_enums::ReportType,
            crate::entities::sea_orm_active_enums::ReportStatus,
            crate::entities::sea_orm_active_enums::QuantityUnit,
            crate::entities::sea_orm_active_enums::ChangeType,
            crate::entities::sea_orm_active_enums::ImageType,
            crate::entities::sea_orm_active_enums::UserRole,
            crate::services::export::ExportFormat,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// Serves the generated document at `/api-docs/openapi.json`
pub fn openapi_routes() -> Router {
    Router::new().route("/api-docs/openapi.json", get(openapi_json))
}
