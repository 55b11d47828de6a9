use crate::db::DbPool;
use crate::entities::company_project::{self, Entity as CompanyProject};
use crate::errors::ServiceError;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

const MAX_PROJECT_NAME: usize = 200;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    pub name: String,
}

/// Names offered in the report form's project field
#[derive(Clone)]
pub struct ProjectService {
    db_pool: Arc<DbPool>,
}

impl ProjectService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    pub async fn list(&self, include_inactive: bool) -> Result<Vec<company_project::Model>, ServiceError> {
        let mut query = CompanyProject::find();
        if !include_inactive {
            query = query.filter(company_project::Column::IsActive.eq(true));
        }
        Ok(query
            .order_by_asc(company_project::Column::Name)
            .all(self.db_pool.as_ref())
            .await?)
    }

    /// Returns the project with that name, reactivating it if it was retired.
    pub async fn create(&self, request: CreateProjectRequest) -> Result<company_project::Model, ServiceError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ServiceError::ValidationError("Project name is required".into()));
        }
        if name.chars().count() > MAX_PROJECT_NAME {
            return Err(ServiceError::ValidationError(format!(
                "Project name must be at most {MAX_PROJECT_NAME} characters"
            )));
        }

        let db = self.db_pool.as_ref();
        let existing = CompanyProject::find()
            .filter(company_project::Column::Name.eq(name))
            .one(db)
            .await?;

        match existing {
            Some(project) if project.is_active => Ok(project),
            Some(project) => {
                let mut active: company_project::ActiveModel = project.into();
                active.is_active = Set(true);
                let project = active.update(db).await?;
                info!(project_id = project.id, "project reactivated");
                Ok(project)
            }
            None => {
                let project = company_project::ActiveModel {
                    name: Set(name.to_string()),
                    is_active: Set(true),
                    ..Default::default()
                }
                .insert(db)
                .await?;
                info!(project_id = project.id, "project created");
                Ok(project)
            }
        }
    }

    pub async fn delete(&self, project_id: i32) -> Result<(), ServiceError> {
        let result = CompanyProject::delete_by_id(project_id)
            .exec(self.db_pool.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Project {project_id} not found")));
        }
        info!(project_id, "project deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;
    use assert_matches::assert_matches;

    fn named(name: &str) -> CreateProjectRequest {
        CreateProjectRequest { name: name.into() }
    }

    #[tokio::test]
    async fn retired_project_is_reactivated_not_duplicated() {
        let db = memory_db().await;
        let retired = company_project::ActiveModel {
            name: Set("Harbor Tower".into()),
            is_active: Set(false),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();
        let service = ProjectService::new(Arc::new(db));

        assert!(service.list(false).await.unwrap().is_empty());
        let project = service.create(named("  Harbor Tower ")).await.unwrap();
        assert_eq!(project.id, retired.id);
        assert!(project.is_active);
        assert_eq!(service.list(false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listing_is_alphabetical_and_blank_names_fail() {
        let service = ProjectService::new(Arc::new(memory_db().await));
        service.create(named("Beta")).await.unwrap();
        service.create(named("Alpha")).await.unwrap();
        let names: Vec<_> = service.list(true).await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);

        assert_matches!(service.create(named("   ")).await, Err(ServiceError::ValidationError(_)));
        assert_matches!(service.delete(999).await, Err(ServiceError::NotFound(_)));
    }
}
