//! Field Reports API
//!
//! Delivery and installation reports filed from the field, and the inventory
//! ledger those reports consume from.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post, put},
    Extension, Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
};

use crate::auth::{AuthConfig, AuthService};
use crate::config::AppConfig;
use crate::handlers::AppServices;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: AppConfig) -> Self {
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config), db.clone()));
        let services = AppServices::new(db.clone(), &config);
        Self {
            db,
            config: Arc::new(config),
            auth,
            services,
        }
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Routes that need a logged-in user. Admin checks happen in the handlers.
fn authenticated_routes(config: &AppConfig) -> Router<AppState> {
    Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/auth/password", post(handlers::auth::change_password))
        .route(
            "/api/reports",
            get(handlers::reports::list_reports)
                .post(handlers::reports::create_report)
                .layer(DefaultBodyLimit::max(config.max_upload_request_bytes)),
        )
        .route("/api/reports/stats", get(handlers::reports::report_stats))
        .route(
            "/api/reports/:id",
            get(handlers::reports::get_report)
                .put(handlers::reports::update_report)
                .delete(handlers::reports::delete_report),
        )
        .route("/api/sync", post(handlers::sync::sync_reports))
        .route("/api/inventory", get(handlers::inventory::list_inventory))
        .route(
            "/api/inventory/adjust",
            post(handlers::inventory::adjust_inventory),
        )
        .route(
            "/api/inventory/transactions",
            get(handlers::inventory::list_transactions),
        )
        .route(
            "/api/inventory/export",
            get(handlers::inventory::export_inventory),
        )
        .route(
            "/api/inventory/transactions/export",
            get(handlers::inventory::export_transactions),
        )
        .route("/api/export", get(handlers::exports::export_reports))
        .route("/api/export/mine", get(handlers::exports::export_my_reports))
        .route(
            "/api/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(
            "/api/users/:id",
            put(handlers::users::update_user).delete(handlers::users::delete_user),
        )
        .route(
            "/api/projects",
            get(handlers::projects::list_projects).post(handlers::projects::create_project),
        )
        .route(
            "/api/projects/:id",
            delete(handlers::projects::delete_project),
        )
        .route("/api/stats", get(handlers::stats::admin_stats))
        .nest_service("/uploads/reports", ServeDir::new(&config.upload_dir))
        .route_layer(middleware::from_fn(auth::auth_middleware))
}

/// Builds the full application router with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();
    let auth_service = state.auth.clone();

    let api = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .merge(authenticated_routes(&config))
        .with_state(state.clone());

    Router::new()
        .route("/", get(|| async { "field-reports-api up" }))
        .nest("/health", health::health_routes(state.db.clone()))
        .merge(openapi::openapi_routes())
        .merge(api)
        .layer(self::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config))
        // auth_middleware looks the service up in the request extensions
        .layer(Extension(auth_service))
        .layer(middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::auth::hash_password;
    use crate::entities::{sea_orm_active_enums::UserRole, user};
    use crate::migrator::Migrator;
    use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
    use sea_orm_migration::MigratorTrait;

    /// In-memory SQLite with every migration applied. One connection keeps
    /// the database alive for the whole test.
    pub async fn memory_db() -> DatabaseConnection {
        let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.expect("sqlite memory db");
        Migrator::up(&db, None).await.expect("migrations");
        db
    }

    pub async fn insert_user(
        db: &DatabaseConnection,
        username: &str,
        password: &str,
        role: UserRole,
    ) -> user::Model {
        user::ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(hash_password(password).expect("hash")),
            role: Set(role),
            full_name: Set(format!("{username} full name")),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("insert user")
    }
}
