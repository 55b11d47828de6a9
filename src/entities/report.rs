use super::sea_orm_active_enums::{ReportStatus, ReportType};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// A field report filed by a worker after a delivery or installation.
///
/// `timestamp` is the wall-clock time the work happened as entered by the
/// worker, so it is stored without a zone. `installation_types` holds a JSON
/// encoded list of labels.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reports")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub report_type: ReportType,
    pub customer_name: String,
    pub company_project: Option<String>,
    pub address: String,
    pub status: ReportStatus,
    pub timestamp: DateTime,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub installation_type: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub installation_types: Option<String>,
    pub protections_count: Option<i32>,
    pub synced: bool,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl Model {
    /// Decoded installation labels. Falls back to the single legacy column.
    pub fn installation_labels(&self) -> Vec<String> {
        self.installation_types
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .filter(|labels| !labels.is_empty())
            .or_else(|| {
                self.installation_type
                    .as_ref()
                    .filter(|label| !label.trim().is_empty())
                    .map(|label| vec![label.clone()])
            })
            .unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::report_product::Entity")]
    Products,
    #[sea_orm(has_many = "super::report_image::Entity")]
    Images,
    #[sea_orm(has_many = "super::report_document::Entity")]
    Documents,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::report_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Products.def()
    }
}

impl Related<super::report_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Images.def()
    }
}

impl Related<super::report_document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Documents.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if insert && matches!(active_model.created_at, ActiveValue::NotSet) {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> Model {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        Model {
            id: 1,
            user_id: 1,
            report_type: ReportType::Installation,
            customer_name: "Dana".into(),
            company_project: None,
            address: "Herzl 1".into(),
            status: ReportStatus::Completed,
            timestamp: ts,
            notes: None,
            installation_type: None,
            installation_types: None,
            protections_count: None,
            synced: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn labels_prefer_the_list_column() {
        let mut report = sample();
        report.installation_types = Some(r#"["floor","wall"]"#.into());
        report.installation_type = Some("legacy".into());
        assert_eq!(report.installation_labels(), vec!["floor", "wall"]);
    }

    #[test]
    fn labels_fall_back_to_legacy_column() {
        let mut report = sample();
        report.installation_types = Some("not json".into());
        report.installation_type = Some("floor".into());
        assert_eq!(report.installation_labels(), vec!["floor"]);

        report.installation_type = None;
        assert!(report.installation_labels().is_empty());
    }
}
