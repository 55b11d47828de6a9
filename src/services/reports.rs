use crate::auth::AuthUser;
use crate::db::DbPool;
use crate::entities::{
    report::{self, Entity as Report},
    report_document::{self, Entity as ReportDocument},
    report_image::{self, Entity as ReportImage},
    report_product::{self, Entity as ReportProduct},
    sea_orm_active_enums::{ChangeType, ImageType, ReportStatus, ReportType},
    user::{self, Entity as User},
};
use crate::errors::ServiceError;
use crate::repositories::Page;
use crate::services::{
    ledger::{self, Direction, LineItem},
    report_input::{parse_report_datetime, ReportOrigin, ReportSubmission, ValidReport},
    uploads::{IncomingFile, StagedUploads, UploadKind, UploadStore},
};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

/// Report with its lines, attachments and author
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReportDetail {
    pub id: i32,
    pub user_id: i32,
    pub user_name: String,
    pub report_type: ReportType,
    pub customer_name: String,
    pub company_project: Option<String>,
    /// Installation labels joined with ", "
    pub installation_type: Option<String>,
    pub installation_types: Vec<String>,
    pub protections_count: Option<i32>,
    pub address: String,
    pub status: ReportStatus,
    pub timestamp: NaiveDateTime,
    pub notes: Option<String>,
    pub synced: bool,
    pub products: Vec<report_product::Model>,
    pub images: Vec<report_image::Model>,
    pub documents: Vec<report_document::Model>,
}

/// Files sent along with a new report
#[derive(Debug, Clone, Default)]
pub struct ReportAttachments {
    pub images: Vec<IncomingFile>,
    pub delivery_note: Option<IncomingFile>,
}

/// Listing and export filters. Dates are inclusive days.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReportFilter {
    #[serde(rename = "type")]
    pub report_type: Option<String>,
    pub status: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    /// Substring of address, customer or project
    pub search: Option<String>,
    /// Admin only
    pub user_id: Option<i32>,
    /// Admin only: substring of the author's full name or username
    pub user_search: Option<String>,
}

/// Which reports a query may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportScope {
    Everyone,
    Owner(i32),
}

impl ReportScope {
    pub fn for_caller(caller: &AuthUser) -> Self {
        if caller.is_admin() {
            ReportScope::Everyone
        } else {
            ReportScope::Owner(caller.id)
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_day_start(raw: &str) -> Result<NaiveDateTime, ServiceError> {
    parse_report_datetime(raw)
        .ok_or_else(|| ServiceError::BadRequest(format!("Invalid date {raw}")))
}

/// First instant after the given day, so the whole day is included.
fn parse_day_end(raw: &str) -> Result<NaiveDateTime, ServiceError> {
    let day = NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d")
        .map_err(|_| ServiceError::BadRequest(format!("Invalid date {raw}")))?;
    day.checked_add_days(Days::new(1))
        .and_then(|next| next.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ServiceError::BadRequest(format!("Invalid date {raw}")))
}

impl ReportFilter {
    pub fn apply(&self, mut query: Select<Report>, scope: ReportScope) -> Result<Select<Report>, ServiceError> {
        match scope {
            ReportScope::Owner(user_id) => {
                query = query.filter(report::Column::UserId.eq(user_id));
            }
            ReportScope::Everyone => {
                if let Some(user_id) = self.user_id {
                    query = query.filter(report::Column::UserId.eq(user_id));
                }
                if let Some(term) = non_empty(&self.user_search) {
                    query = query
                        .join(JoinType::InnerJoin, report::Relation::User.def())
                        .filter(
                            Condition::any()
                                .add(user::Column::FullName.contains(term))
                                .add(user::Column::Username.contains(term)),
                        );
                }
            }
        }

        if let Some(raw) = non_empty(&self.report_type) {
            let report_type = ReportType::from_str(raw)
                .map_err(|_| ServiceError::BadRequest(format!("Unknown report type {raw}")))?;
            query = query.filter(report::Column::ReportType.eq(report_type));
        }
        if let Some(raw) = non_empty(&self.status) {
            let status = ReportStatus::from_str(raw)
                .map_err(|_| ServiceError::BadRequest(format!("Unknown status {raw}")))?;
            query = query.filter(report::Column::Status.eq(status));
        }
        if let Some(raw) = non_empty(&self.date_from) {
            query = query.filter(report::Column::Timestamp.gte(parse_day_start(raw)?));
        }
        if let Some(raw) = non_empty(&self.date_to) {
            query = query.filter(report::Column::Timestamp.lt(parse_day_end(raw)?));
        }
        if let Some(term) = non_empty(&self.search) {
            query = query.filter(
                Condition::any()
                    .add(report::Column::Address.contains(term))
                    .add(report::Column::CustomerName.contains(term))
                    .add(report::Column::CompanyProject.contains(term)),
            );
        }

        Ok(query
            .order_by_desc(report::Column::Timestamp)
            .order_by_desc(report::Column::Id))
    }

    /// Defaults an empty date range to the current month so far.
    pub fn default_to_current_month(mut self) -> Self {
        if non_empty(&self.date_from).is_none() && non_empty(&self.date_to).is_none() {
            let today = Utc::now().date_naive();
            self.date_from = today.with_day(1).map(|d| d.format("%Y-%m-%d").to_string());
            self.date_to = Some(today.format("%Y-%m-%d").to_string());
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReportStats {
    pub total: u64,
    pub delivery: u64,
    pub installation: u64,
    pub this_month: u64,
}

/// Loads lines, attachments and authors for a batch of reports, keeping their order.
pub async fn hydrate<C>(conn: &C, reports: Vec<report::Model>) -> Result<Vec<ReportDetail>, ServiceError>
where
    C: ConnectionTrait,
{
    if reports.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i32> = reports.iter().map(|r| r.id).collect();
    let author_ids: BTreeSet<i32> = reports.iter().map(|r| r.user_id).collect();

    let mut products: HashMap<i32, Vec<report_product::Model>> = HashMap::new();
    for line in ReportProduct::find()
        .filter(report_product::Column::ReportId.is_in(ids.clone()))
        .order_by_asc(report_product::Column::Id)
        .all(conn)
        .await?
    {
        products.entry(line.report_id).or_default().push(line);
    }

    let mut images: HashMap<i32, Vec<report_image::Model>> = HashMap::new();
    for image in ReportImage::find()
        .filter(report_image::Column::ReportId.is_in(ids.clone()))
        .order_by_asc(report_image::Column::Id)
        .all(conn)
        .await?
    {
        images.entry(image.report_id).or_default().push(image);
    }

    let mut documents: HashMap<i32, Vec<report_document::Model>> = HashMap::new();
    for document in ReportDocument::find()
        .filter(report_document::Column::ReportId.is_in(ids))
        .order_by_asc(report_document::Column::Id)
        .all(conn)
        .await?
    {
        documents.entry(document.report_id).or_default().push(document);
    }

    let authors: HashMap<i32, String> = User::find()
        .filter(user::Column::Id.is_in(author_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|u| (u.id, u.full_name))
        .collect();

    Ok(reports
        .into_iter()
        .map(|r| {
            let installation_types = r.installation_labels();
            ReportDetail {
                user_name: authors.get(&r.user_id).cloned().unwrap_or_default(),
                products: products.remove(&r.id).unwrap_or_default(),
                images: images.remove(&r.id).unwrap_or_default(),
                documents: documents.remove(&r.id).unwrap_or_default(),
                installation_types,
                id: r.id,
                user_id: r.user_id,
                report_type: r.report_type,
                customer_name: r.customer_name,
                company_project: r.company_project,
                installation_type: r.installation_type,
                protections_count: r.protections_count,
                address: r.address,
                status: r.status,
                timestamp: r.timestamp,
                notes: r.notes,
                synced: r.synced,
            }
        })
        .collect())
}

async fn insert_lines(
    txn: &DatabaseTransaction,
    report_id: i32,
    lines: &[LineItem],
) -> Result<(), ServiceError> {
    for line in lines {
        report_product::ActiveModel {
            report_id: Set(report_id),
            product_name: Set(line.product_name.clone()),
            quantity: Set(line.quantity),
            quantity_unit: Set(line.unit),
            ..Default::default()
        }
        .insert(txn)
        .await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct ReportService {
    db_pool: Arc<DbPool>,
    uploads: UploadStore,
}

impl ReportService {
    pub fn new(db_pool: Arc<DbPool>, uploads: UploadStore) -> Self {
        Self { db_pool, uploads }
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    /// Files a report from the online form, attachments included.
    #[instrument(skip(self, author, submission, attachments), fields(user_id = author.id))]
    pub async fn create(
        &self,
        author: &AuthUser,
        submission: ReportSubmission,
        attachments: ReportAttachments,
    ) -> Result<ReportDetail, ServiceError> {
        let valid = submission.validate(ReportOrigin::Online)?;

        if valid.report_type == ReportType::Delivery {
            let note = attachments.delivery_note.as_ref().ok_or_else(|| {
                ServiceError::ValidationError("A signed delivery note is required".into())
            })?;
            self.uploads
                .check(UploadKind::DeliveryNote, note)
                .map_err(|rejection| ServiceError::ValidationError(format!("Delivery note rejected: {rejection}")))?;
        }

        let report_id = self
            .store_new_report(author.id, valid, ReportOrigin::Online, attachments)
            .await?;
        info!(report_id, "report created");
        self.get(report_id, author).await
    }

    /// Files a report replayed from the offline queue. No attachments travel with it.
    pub async fn create_synced(
        &self,
        author: &AuthUser,
        submission: ReportSubmission,
    ) -> Result<i32, ServiceError> {
        let valid = submission.validate(ReportOrigin::OfflineSync)?;
        let report_id = self
            .store_new_report(author.id, valid, ReportOrigin::OfflineSync, ReportAttachments::default())
            .await?;
        info!(report_id, user_id = author.id, "offline report synced");
        Ok(report_id)
    }

    /// Inserts the report, its lines, ledger consumption and attachments in one
    /// transaction. Files stay staged until the commit succeeds.
    async fn store_new_report(
        &self,
        user_id: i32,
        valid: ValidReport,
        origin: ReportOrigin,
        attachments: ReportAttachments,
    ) -> Result<i32, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let mut staged = self.uploads.stage();

        let outcome = self
            .write_new_report(&txn, user_id, &valid, origin, &attachments, &mut staged)
            .await;
        let committed = match outcome {
            Ok(report_id) => txn.commit().await.map(|_| report_id).map_err(ServiceError::from),
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        };

        match committed {
            Ok(report_id) => {
                if let Err(e) = self.uploads.promote(staged).await {
                    error!(report_id, error = %e, "committed report files could not be moved into place");
                }
                Ok(report_id)
            }
            Err(e) => {
                self.uploads.discard(staged).await;
                Err(e)
            }
        }
    }

    async fn write_new_report(
        &self,
        txn: &DatabaseTransaction,
        user_id: i32,
        valid: &ValidReport,
        origin: ReportOrigin,
        attachments: &ReportAttachments,
        staged: &mut StagedUploads,
    ) -> Result<i32, ServiceError> {
        let report = report::ActiveModel {
            user_id: Set(user_id),
            report_type: Set(valid.report_type),
            customer_name: Set(valid.customer_name.clone()),
            company_project: Set(valid.company_project.clone()),
            address: Set(valid.address.clone()),
            status: Set(valid.status),
            timestamp: Set(valid.timestamp),
            notes: Set(valid.notes.clone()),
            installation_type: Set(valid.installation_display()),
            installation_types: Set(valid.installation_types_json()),
            protections_count: Set(valid.protections_count),
            synced: Set(origin == ReportOrigin::OfflineSync),
            ..Default::default()
        }
        .insert(txn)
        .await?;

        insert_lines(txn, report.id, &valid.lines).await?;
        let note = match origin {
            ReportOrigin::Online => format!("Report #{}", report.id),
            ReportOrigin::OfflineSync => format!("Report #{} (offline sync)", report.id),
        };
        ledger::apply_report_lines(
            txn,
            &valid.lines,
            Direction::Consume,
            ChangeType::Report,
            report.id,
            user_id,
            &note,
        )
        .await?;

        if let Some(note_file) = &attachments.delivery_note {
            if valid.report_type == ReportType::Delivery {
                let stored = self
                    .uploads
                    .save(staged, report.id, UploadKind::DeliveryNote, note_file)
                    .await?
                    .map_err(|rejection| {
                        ServiceError::ValidationError(format!("Delivery note rejected: {rejection}"))
                    })?;
                report_document::ActiveModel {
                    report_id: Set(report.id),
                    document_path: Set(stored.relative_path),
                    original_filename: Set(stored.original_filename),
                    ..Default::default()
                }
                .insert(txn)
                .await?;
            }
        }

        let image_type = ImageType::from(valid.report_type);
        for image in &attachments.images {
            match self.uploads.save(staged, report.id, UploadKind::Image, image).await? {
                Ok(stored) => {
                    report_image::ActiveModel {
                        report_id: Set(report.id),
                        image_path: Set(stored.relative_path),
                        image_type: Set(image_type),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;
                }
                Err(rejection) => {
                    warn!(report_id = report.id, %rejection, "image skipped");
                }
            }
        }

        Ok(report.id)
    }

    async fn load_for(&self, report_id: i32, caller: &AuthUser) -> Result<report::Model, ServiceError> {
        let report = Report::find_by_id(report_id)
            .one(self.db_pool.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Report {report_id} not found")))?;
        if !caller.can_access(report.user_id) {
            return Err(ServiceError::Forbidden(
                "You do not have access to this report".into(),
            ));
        }
        Ok(report)
    }

    pub async fn get(&self, report_id: i32, caller: &AuthUser) -> Result<ReportDetail, ServiceError> {
        let report = self.load_for(report_id, caller).await?;
        hydrate(self.db_pool.as_ref(), vec![report])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::NotFound(format!("Report {report_id} not found")))
    }

    pub async fn list(
        &self,
        caller: &AuthUser,
        filter: &ReportFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<ReportDetail>, ServiceError> {
        let db = self.db_pool.as_ref();
        let query = filter.apply(Report::find(), ReportScope::for_caller(caller))?;
        let paginator = query.paginate(db, per_page.max(1));
        let total = paginator.num_items().await?;
        let reports = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok(Page {
            items: hydrate(db, reports).await?,
            total,
        })
    }

    /// Every matching report, newest first, for exports.
    pub async fn list_all(
        &self,
        filter: &ReportFilter,
        scope: ReportScope,
    ) -> Result<Vec<ReportDetail>, ServiceError> {
        let db = self.db_pool.as_ref();
        let reports = filter.apply(Report::find(), scope)?.all(db).await?;
        hydrate(db, reports).await
    }

    /// Replaces a report's fields and lines, reversing the old consumption first.
    #[instrument(skip(self, caller, submission), fields(user_id = caller.id))]
    pub async fn update(
        &self,
        report_id: i32,
        caller: &AuthUser,
        submission: ReportSubmission,
    ) -> Result<ReportDetail, ServiceError> {
        let existing = self.load_for(report_id, caller).await?;
        let valid = submission.validate(ReportOrigin::Online)?;

        let txn = self.db_pool.begin().await?;

        let old_lines: Vec<LineItem> = ReportProduct::find()
            .filter(report_product::Column::ReportId.eq(report_id))
            .order_by_asc(report_product::Column::Id)
            .all(&txn)
            .await?
            .iter()
            .map(LineItem::from)
            .collect();
        ledger::apply_report_lines(
            &txn,
            &old_lines,
            Direction::Restore,
            ChangeType::ReportEdit,
            report_id,
            caller.id,
            &format!("Revert Report #{report_id}"),
        )
        .await?;
        ReportProduct::delete_many()
            .filter(report_product::Column::ReportId.eq(report_id))
            .exec(&txn)
            .await?;

        let mut active: report::ActiveModel = existing.into();
        active.report_type = Set(valid.report_type);
        active.customer_name = Set(valid.customer_name.clone());
        active.company_project = Set(valid.company_project.clone());
        active.address = Set(valid.address.clone());
        active.status = Set(valid.status);
        active.timestamp = Set(valid.timestamp);
        active.notes = Set(valid.notes.clone());
        active.installation_type = Set(valid.installation_display());
        active.installation_types = Set(valid.installation_types_json());
        active.protections_count = Set(valid.protections_count);
        active.update(&txn).await?;

        insert_lines(&txn, report_id, &valid.lines).await?;
        ledger::apply_report_lines(
            &txn,
            &valid.lines,
            Direction::Consume,
            ChangeType::ReportEdit,
            report_id,
            caller.id,
            &format!("Update Report #{report_id}"),
        )
        .await?;

        txn.commit().await?;
        info!(report_id, "report updated");
        self.get(report_id, caller).await
    }

    /// Removes a report and gives its consumption back to stock.
    #[instrument(skip(self, caller), fields(user_id = caller.id))]
    pub async fn delete(&self, report_id: i32, caller: &AuthUser) -> Result<(), ServiceError> {
        self.load_for(report_id, caller).await?;

        let txn = self.db_pool.begin().await?;
        let lines: Vec<LineItem> = ReportProduct::find()
            .filter(report_product::Column::ReportId.eq(report_id))
            .all(&txn)
            .await?
            .iter()
            .map(LineItem::from)
            .collect();
        ledger::apply_report_lines(
            &txn,
            &lines,
            Direction::Restore,
            ChangeType::ReportEdit,
            report_id,
            caller.id,
            &format!("Delete Report #{report_id}"),
        )
        .await?;

        ReportImage::delete_many()
            .filter(report_image::Column::ReportId.eq(report_id))
            .exec(&txn)
            .await?;
        ReportDocument::delete_many()
            .filter(report_document::Column::ReportId.eq(report_id))
            .exec(&txn)
            .await?;
        ReportProduct::delete_many()
            .filter(report_product::Column::ReportId.eq(report_id))
            .exec(&txn)
            .await?;
        Report::delete_by_id(report_id).exec(&txn).await?;
        txn.commit().await?;

        self.uploads.remove_report_files(report_id).await;
        info!(report_id, "report deleted");
        Ok(())
    }

    pub async fn stats(&self, caller: &AuthUser) -> Result<ReportStats, ServiceError> {
        let db = self.db_pool.as_ref();
        let scoped = || match ReportScope::for_caller(caller) {
            ReportScope::Everyone => Report::find(),
            ReportScope::Owner(user_id) => Report::find().filter(report::Column::UserId.eq(user_id)),
        };

        let today = Utc::now().date_naive();
        let month_start = today
            .with_day(1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| ServiceError::InternalError("Invalid month start".into()))?;

        Ok(ReportStats {
            total: scoped().count(db).await?,
            delivery: scoped()
                .filter(report::Column::ReportType.eq(ReportType::Delivery))
                .count(db)
                .await?,
            installation: scoped()
                .filter(report::Column::ReportType.eq(ReportType::Installation))
                .count(db)
                .await?,
            this_month: scoped()
                .filter(report::Column::Timestamp.gte(month_start))
                .count(db)
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_end_is_exclusive_next_midnight() {
        let end = parse_day_end("2024-02-29").unwrap();
        assert_eq!(end.to_string(), "2024-03-01 00:00:00");
        assert!(parse_day_end("29/02/2024").is_err());
    }

    #[test]
    fn current_month_default_only_applies_without_dates() {
        let filled = ReportFilter::default().default_to_current_month();
        assert!(filled.date_from.as_deref().is_some_and(|d| d.ends_with("-01")));
        assert!(filled.date_to.is_some());

        let explicit = ReportFilter {
            date_from: Some("2023-01-01".into()),
            ..Default::default()
        }
        .default_to_current_month();
        assert_eq!(explicit.date_from.as_deref(), Some("2023-01-01"));
        assert!(explicit.date_to.is_none());
    }

    #[test]
    fn unknown_filter_values_are_rejected() {
        let filter = ReportFilter {
            report_type: Some("pickup".into()),
            ..Default::default()
        };
        assert!(filter.apply(Report::find(), ReportScope::Everyone).is_err());
    }
}
