pub mod auth;
pub mod common;
pub mod exports;
pub mod inventory;
pub mod projects;
pub mod reports;
pub mod stats;
pub mod sync;
pub mod users;

use crate::{
    config::AppConfig,
    db::DbPool,
    services::{
        ledger::LedgerService, projects::ProjectService, reports::ReportService,
        stats::StatsService, uploads::UploadStore, users::UserService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer used by the HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub ledger: Arc<LedgerService>,
    pub reports: Arc<ReportService>,
    pub users: Arc<UserService>,
    pub projects: Arc<ProjectService>,
    pub stats: Arc<StatsService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig) -> Self {
        let uploads = UploadStore::from_config(config);
        Self {
            ledger: Arc::new(LedgerService::new(db_pool.clone())),
            reports: Arc::new(ReportService::new(db_pool.clone(), uploads)),
            users: Arc::new(UserService::new(db_pool.clone())),
            projects: Arc::new(ProjectService::new(db_pool.clone())),
            stats: Arc::new(StatsService::new(db_pool)),
        }
    }
}
