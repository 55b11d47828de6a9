use crate::db::DbPool;
use crate::entities::{
    report::{self, Entity as Report},
    sea_orm_active_enums::{ReportStatus, ReportType},
    user,
};
use crate::errors::ServiceError;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, EntityTrait, JoinType, PaginatorTrait, QueryFilter, QuerySelect, RelationTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UserReportCount {
    pub user_id: i32,
    pub name: String,
    pub count: i64,
}

/// Whole-company report counts for the admin dashboard
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminStats {
    pub total_reports: u64,
    pub completed_reports: u64,
    /// Reports whose status is `return_required`
    pub pending_reports: u64,
    pub delivery_reports: u64,
    pub installation_reports: u64,
    pub reports_per_user: Vec<UserReportCount>,
}

#[derive(Clone)]
pub struct StatsService {
    db_pool: Arc<DbPool>,
}

impl StatsService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn admin_stats(&self) -> Result<AdminStats, ServiceError> {
        let db = self.db_pool.as_ref();

        let rows: Vec<(i32, String, i64)> = Report::find()
            .select_only()
            .column(report::Column::UserId)
            .column(user::Column::FullName)
            .column_as(Expr::col((report::Entity, report::Column::Id)).count(), "count")
            .join(JoinType::InnerJoin, report::Relation::User.def())
            .group_by(report::Column::UserId)
            .group_by(user::Column::FullName)
            .into_tuple()
            .all(db)
            .await?;

        let mut reports_per_user: Vec<UserReportCount> = rows
            .into_iter()
            .map(|(user_id, name, count)| UserReportCount { user_id, name, count })
            .collect();
        reports_per_user.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

        Ok(AdminStats {
            total_reports: Report::find().count(db).await?,
            completed_reports: Report::find()
                .filter(report::Column::Status.eq(ReportStatus::Completed))
                .count(db)
                .await?,
            pending_reports: Report::find()
                .filter(report::Column::Status.eq(ReportStatus::ReturnRequired))
                .count(db)
                .await?,
            delivery_reports: Report::find()
                .filter(report::Column::ReportType.eq(ReportType::Delivery))
                .count(db)
                .await?,
            installation_reports: Report::find()
                .filter(report::Column::ReportType.eq(ReportType::Installation))
                .count(db)
                .await?,
            reports_per_user,
        })
    }
}
