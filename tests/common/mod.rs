#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use field_reports_api::{
    auth::hash_password,
    catalog, db,
    config::AppConfig,
    entities::{sea_orm_active_enums::UserRole, user},
    AppState,
};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const PASSWORD: &str = "field-pass-123";
const BOUNDARY: &str = "----field-reports-test-boundary";

/// Application state backed by a throwaway SQLite file and upload directory.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub admin: user::Model,
    pub installer: user::Model,
    admin_token: String,
    installer_token: String,
    _dir: TempDir,
}

/// One part of a multipart form
pub enum Part {
    Text(&'static str, String),
    File(&'static str, &'static str, Vec<u8>),
}

impl Part {
    pub fn text(name: &'static str, value: impl Into<String>) -> Self {
        Part::Text(name, value.into())
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("field_reports_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test_secret_key_for_field_reports_only_32chars".to_string(),
            "test".to_string(),
        );
        cfg.upload_dir = dir.path().join("uploads");
        cfg.max_image_bytes = 64 * 1024;
        cfg.max_document_bytes = 64 * 1024;
        std::fs::create_dir_all(&cfg.upload_dir).expect("upload dir");

        let mut opt = ConnectOptions::new(cfg.database_url.clone());
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let conn = Database::connect(opt).await.expect("connect sqlite");
        db::run_migrations(&conn).await.expect("migrations");
        catalog::ensure_catalog_items(&conn)
            .await
            .expect("catalog items");

        let admin = insert_user(&conn, "admin", "Office Admin", UserRole::Admin).await;
        let installer = insert_user(&conn, "installer", "Field Installer", UserRole::User).await;

        let state = AppState::new(Arc::new(conn), cfg);
        let admin_token = state
            .auth
            .generate_token(&admin)
            .expect("admin token")
            .access_token;
        let installer_token = state
            .auth
            .generate_token(&installer)
            .expect("installer token")
            .access_token;

        let router = field_reports_api::build_router(state.clone());

        Self {
            router,
            state,
            admin,
            installer,
            admin_token,
            installer_token,
            _dir: dir,
        }
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    pub fn installer_token(&self) -> &str {
        &self.installer_token
    }

    pub fn upload_root(&self) -> &std::path::Path {
        &self.state.config.upload_dir
    }

    /// Send a request against the router with an optional JSON body and bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {tok}"));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize json body"))
        } else {
            Body::empty()
        };

        self.send(builder.body(body).expect("build request")).await
    }

    /// Post a multipart form, the way the browser submits a report.
    pub async fn multipart(&self, uri: &str, parts: Vec<Part>, token: &str) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .expect("build multipart request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

async fn insert_user(
    conn: &sea_orm::DatabaseConnection,
    username: &str,
    full_name: &str,
    role: UserRole,
) -> user::Model {
    user::ActiveModel {
        username: Set(username.to_string()),
        password_hash: Set(hash_password(PASSWORD).expect("hash password")),
        full_name: Set(full_name.to_string()),
        role: Set(role),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(conn)
    .await
    .expect("insert user")
}

pub fn multipart_body(parts: Vec<Part>) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                out.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, bytes) => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(&bytes);
            }
        }
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    out
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_text(response: Response) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Form fields of a valid delivery report consuming `quantity` meters of Flex.
pub fn delivery_form(customer: &str, quantity: &str) -> Vec<Part> {
    vec![
        Part::text("report_type", "delivery"),
        Part::text("customer_name", customer),
        Part::text("address", "Herzl 1, Haifa"),
        Part::text("status", "completed"),
        Part::text("report_datetime", "2024-05-01T08:30"),
        Part::text(
            "products",
            format!(r#"[{{"name":"Allprotect - Flex","quantity":"{quantity}","unit":"meter"}}]"#),
        ),
        Part::File("delivery_note", "note.pdf", b"%PDF-1.4 signed".to_vec()),
    ]
}

/// Form fields of a valid installation report consuming `quantity` units of Allprotect Original.
pub fn installation_form(customer: &str, quantity: &str) -> Vec<Part> {
    vec![
        Part::text("report_type", "installation"),
        Part::text("customer_name", customer),
        Part::text("company_project", "Tower B"),
        Part::text("address", "Hanamal 5, Haifa"),
        Part::text("status", "return_required"),
        Part::text("report_datetime", "2024-05-02T10:00"),
        Part::text("installation_types", r#"["Floor", "Walls"]"#),
        Part::text("protections_count", "4"),
        Part::text(
            "products",
            format!(r#"[{{"name":"Allprotect - Original","quantity":{quantity},"unit":"unit"}}]"#),
        ),
        Part::File("images", "site.png", sample_png(64, 48)),
    ]
}

/// A solid-colour PNG photo of the given size.
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    image::RgbImage::from_pixel(width, height, image::Rgb([90, 140, 200]))
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}
