//! Seed data script - populates the database with demo data
//!
//! Run with: cargo run --bin seed-data
//!
//! This creates:
//! - an administrator and three field workers (password `demo1234`)
//! - a handful of company projects
//! - opening stock for every catalog product
//! - delivery and installation reports with their ledger entries

use chrono::{Duration, Utc};
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

use field_reports_api::{
    auth::AuthUser,
    catalog,
    errors::ServiceError,
    migrator::Migrator,
    services::{
        ledger::{AdjustmentTarget, LedgerService},
        projects::{CreateProjectRequest, ProjectService},
        report_input::{NumberOrText, ProductLineInput, ReportSubmission},
        reports::{ReportAttachments, ReportService},
        uploads::{IncomingFile, UploadStore},
        users::{CreateUserRequest, UserProfile, UserService},
    },
};

const DEMO_PASSWORD: &str = "demo1234";

fn as_caller(profile: &UserProfile) -> AuthUser {
    AuthUser {
        id: profile.id,
        username: profile.username.clone(),
        full_name: profile.full_name.clone(),
        role: profile.role,
        token_id: "seed".to_string(),
    }
}

fn line(name: &str, quantity: f64, unit: &str) -> ProductLineInput {
    ProductLineInput {
        name: Some(name.to_string()),
        quantity: Some(NumberOrText::Number(quantity)),
        unit: Some(unit.to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("=== Field Reports Seed Data ===");

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://field_reports.db?mode=rwc".to_string());
    let upload_dir =
        std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads/reports".to_string());

    let mut options = ConnectOptions::new(database_url.clone());
    options
        .max_connections(5)
        .min_connections(1)
        .connect_timeout(StdDuration::from_secs(10))
        .acquire_timeout(StdDuration::from_secs(10))
        .sqlx_logging(false);

    info!("Connecting to database: {}", database_url);
    let db = Arc::new(Database::connect(options).await?);
    Migrator::up(db.as_ref(), None).await?;
    catalog::ensure_catalog_items(db.as_ref()).await?;

    let users = UserService::new(db.clone());
    let projects = ProjectService::new(db.clone());
    let ledger = LedgerService::new(db.clone());
    let reports = ReportService::new(
        db.clone(),
        UploadStore::new(upload_dir, 5 * 1024 * 1024, 10 * 1024 * 1024),
    );

    info!("Creating users...");
    let mut people = Vec::new();
    for (username, full_name, role) in [
        ("admin", "Office Admin", "admin"),
        ("yossi", "Yossi Cohen", "user"),
        ("maya", "Maya Levi", "user"),
        ("omer", "Omer Katz", "user"),
    ] {
        let request = CreateUserRequest {
            username: username.to_string(),
            password: DEMO_PASSWORD.to_string(),
            full_name: full_name.to_string(),
            role: Some(role.to_string()),
        };
        match users.create(request).await {
            Ok(profile) => people.push(profile),
            Err(ServiceError::Conflict(_)) => warn!(username, "user exists, skipping"),
            Err(e) => return Err(e.into()),
        }
    }
    info!("  Created {} users", people.len());

    info!("Creating projects...");
    for name in ["Harbor Towers", "Ramat Aviv Heights", "North Station Offices"] {
        projects
            .create(CreateProjectRequest {
                name: name.to_string(),
            })
            .await?;
    }

    let Some(admin) = people.iter().find(|p| p.username == "admin") else {
        info!("Demo users already present; leaving stock and reports untouched");
        return Ok(());
    };

    info!("Setting opening stock...");
    let targets: Vec<AdjustmentTarget> = catalog::PRODUCTS
        .iter()
        .enumerate()
        .map(|(i, name)| AdjustmentTarget {
            product_name: name.to_string(),
            quantity_unit: 40.0 + (i as f64) * 5.0,
            quantity_meter: 200.0 + (i as f64) * 25.0,
        })
        .collect();
    let outcome = ledger.adjust(targets, admin.id).await?;
    info!("  Recorded {} adjustments", outcome.transactions_recorded);

    info!("Creating reports...");
    let workers: Vec<&UserProfile> = people.iter().filter(|p| p.username != "admin").collect();
    let mut created = 0;
    for (i, worker) in workers.iter().enumerate() {
        let caller = as_caller(worker);
        let when = (Utc::now() - Duration::days(i as i64 * 3)).naive_utc();

        let delivery = ReportSubmission {
            report_type: Some("delivery".to_string()),
            customer_name: Some(format!("Demo Customer {}", i + 1)),
            company_project: Some("Harbor Towers".to_string()),
            address: Some(format!("{} Herzl St, Haifa", 10 + i)),
            status: Some("completed".to_string()),
            report_datetime: Some(when.format("%Y-%m-%dT%H:%M").to_string()),
            products: vec![
                line(catalog::PRODUCTS[0], 2.0, "unit"),
                line(catalog::PRODUCTS[3], 35.5, "meter"),
            ],
            ..Default::default()
        };
        let attachments = ReportAttachments {
            images: Vec::new(),
            delivery_note: Some(IncomingFile {
                file_name: Some("delivery-note.pdf".to_string()),
                bytes: b"%PDF-1.4\n% demo delivery note\n".to_vec(),
            }),
        };
        reports.create(&caller, delivery, attachments).await?;
        created += 1;

        let installation = ReportSubmission {
            report_type: Some("installation".to_string()),
            customer_name: Some(format!("Demo Site {}", i + 1)),
            company_project: Some("Ramat Aviv Heights".to_string()),
            address: Some(format!("{} Weizmann St, Tel Aviv", 3 + i)),
            status: Some(if i % 2 == 0 { "completed" } else { "return_required" }.to_string()),
            report_datetime: Some(when.format("%Y-%m-%dT%H:%M").to_string()),
            installation_types: Some(serde_json::json!(["Floor protection", "Elevator"])),
            protections_count: Some(NumberOrText::Number(4.0 + i as f64)),
            products: vec![line(catalog::PP_BOARD, 6.0, "unit")],
            ..Default::default()
        };
        reports
            .create(&caller, installation, ReportAttachments::default())
            .await?;
        created += 1;
    }
    info!("  Created {} reports", created);

    info!("=== Seed Data Complete ===");
    info!("Log in as admin / {} to explore", DEMO_PASSWORD);
    Ok(())
}
