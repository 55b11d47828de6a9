use crate::auth::{check_password_strength, hash_password, verify_password, AuthUser};
use crate::db::DbPool;
use crate::entities::{
    report::{self, Entity as Report},
    sea_orm_active_enums::UserRole,
    user::{self, Entity as User},
};
use crate::errors::ServiceError;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

/// User as shown to clients. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserProfile {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            full_name: user.full_name,
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 80))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    /// `user` or `admin`, defaults to `user`
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 120))]
    pub full_name: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    /// Replaces the password when present and non-empty
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

fn parse_role(raw: Option<&str>) -> Result<Option<UserRole>, ServiceError> {
    raw.map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|r| {
            UserRole::from_str(r)
                .map_err(|_| ServiceError::ValidationError(format!("Invalid role {r}")))
        })
        .transpose()
}

#[derive(Clone)]
pub struct UserService {
    db_pool: Arc<DbPool>,
}

impl UserService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    async fn find(&self, user_id: i32) -> Result<user::Model, ServiceError> {
        User::find_by_id(user_id)
            .one(self.db_pool.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {user_id} not found")))
    }

    pub async fn get(&self, user_id: i32) -> Result<UserProfile, ServiceError> {
        self.find(user_id).await.map(UserProfile::from)
    }

    pub async fn list(&self) -> Result<Vec<UserProfile>, ServiceError> {
        let users = User::find()
            .order_by_asc(user::Column::CreatedAt)
            .order_by_asc(user::Column::Id)
            .all(self.db_pool.as_ref())
            .await?;
        Ok(users.into_iter().map(UserProfile::from).collect())
    }

    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn create(&self, request: CreateUserRequest) -> Result<UserProfile, ServiceError> {
        request.validate()?;
        let username = request.username.trim().to_string();
        let full_name = request.full_name.trim().to_string();
        if username.is_empty() || full_name.is_empty() {
            return Err(ServiceError::ValidationError(
                "Username and full name are required".into(),
            ));
        }
        check_password_strength(&request.password)?;
        let role = parse_role(request.role.as_deref())?.unwrap_or(UserRole::User);

        let db = self.db_pool.as_ref();
        let taken = User::find()
            .filter(user::Column::Username.eq(username.as_str()))
            .count(db)
            .await?
            > 0;
        if taken {
            return Err(ServiceError::Conflict(format!(
                "Username {username} already exists"
            )));
        }

        let created = user::ActiveModel {
            username: Set(username),
            password_hash: Set(hash_password(&request.password)?),
            role: Set(role),
            full_name: Set(full_name),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(user_id = created.id, "user created");
        Ok(created.into())
    }

    #[instrument(skip(self, actor, request), fields(actor_id = actor.id))]
    pub async fn update(
        &self,
        user_id: i32,
        actor: &AuthUser,
        request: UpdateUserRequest,
    ) -> Result<UserProfile, ServiceError> {
        request.validate()?;
        let existing = self.find(user_id).await?;
        let role = parse_role(request.role.as_deref())?;

        if user_id == actor.id {
            if role.is_some_and(|r| r != existing.role) {
                return Err(ServiceError::BadRequest("You cannot change your own role".into()));
            }
            if request.is_active == Some(false) {
                return Err(ServiceError::BadRequest(
                    "You cannot deactivate your own account".into(),
                ));
            }
        }

        let mut active: user::ActiveModel = existing.into();
        if let Some(full_name) = request.full_name.as_deref().map(str::trim) {
            if full_name.is_empty() {
                return Err(ServiceError::ValidationError("Full name is required".into()));
            }
            active.full_name = Set(full_name.to_string());
        }
        if let Some(role) = role {
            active.role = Set(role);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(password) = request.password.as_deref().filter(|p| !p.is_empty()) {
            check_password_strength(password)?;
            active.password_hash = Set(hash_password(password)?);
        }

        let updated = active.update(self.db_pool.as_ref()).await?;
        info!(user_id, "user updated");
        Ok(updated.into())
    }

    /// Users who still own reports are kept; deactivate them instead.
    #[instrument(skip(self, actor), fields(actor_id = actor.id))]
    pub async fn delete(&self, user_id: i32, actor: &AuthUser) -> Result<(), ServiceError> {
        if user_id == actor.id {
            return Err(ServiceError::BadRequest("You cannot delete your own account".into()));
        }
        let db = self.db_pool.as_ref();
        self.find(user_id).await?;

        let owned = Report::find()
            .filter(report::Column::UserId.eq(user_id))
            .count(db)
            .await?;
        if owned > 0 {
            return Err(ServiceError::Conflict(format!(
                "User has {owned} reports; deactivate the account instead"
            )));
        }

        User::delete_by_id(user_id).exec(db).await?;
        info!(user_id, "user deleted");
        Ok(())
    }

    pub async fn change_password(
        &self,
        caller: &AuthUser,
        request: ChangePasswordRequest,
    ) -> Result<(), ServiceError> {
        let existing = self.find(caller.id).await?;
        if !verify_password(&request.current_password, &existing.password_hash) {
            return Err(ServiceError::BadRequest("Current password is incorrect".into()));
        }
        check_password_strength(&request.new_password)?;

        let mut active: user::ActiveModel = existing.into();
        active.password_hash = Set(hash_password(&request.new_password)?);
        active.update(self.db_pool.as_ref()).await?;
        info!(user_id = caller.id, "password changed");
        Ok(())
    }

    /// Creates the configured administrator when that username does not exist yet.
    /// Returns whether a user was created.
    pub async fn ensure_bootstrap_admin(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
    ) -> Result<bool, ServiceError> {
        let db = self.db_pool.as_ref();
        let exists = User::find()
            .filter(user::Column::Username.eq(username))
            .count(db)
            .await?
            > 0;
        if exists {
            return Ok(false);
        }
        if password.chars().count() < crate::auth::password::MIN_PASSWORD_LEN {
            warn!("bootstrap admin password is too short; skipping");
            return Ok(false);
        }

        user::ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(hash_password(password)?),
            role: Set(UserRole::Admin),
            full_name: Set(full_name.to_string()),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(db)
        .await?;
        info!(username, "bootstrap admin created");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_user, memory_db};
    use assert_matches::assert_matches;

    fn actor(user: &user::Model) -> AuthUser {
        AuthUser {
            id: user.id,
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            token_id: "t".into(),
        }
    }

    fn request(username: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: username.into(),
            password: "secret1".into(),
            full_name: "Noa Levi".into(),
            role: None,
        }
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let service = UserService::new(Arc::new(memory_db().await));
        let created = service.create(request("noa")).await.unwrap();
        assert_eq!(created.role, UserRole::User);
        assert_matches!(service.create(request("noa")).await, Err(ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn invalid_role_and_short_password_are_rejected() {
        let service = UserService::new(Arc::new(memory_db().await));
        let mut bad_role = request("a");
        bad_role.role = Some("owner".into());
        assert_matches!(service.create(bad_role).await, Err(ServiceError::ValidationError(_)));

        let mut short = request("b");
        short.password = "123".into();
        assert_matches!(service.create(short).await, Err(ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn admin_cannot_demote_or_delete_self() {
        let db = memory_db().await;
        let admin = insert_user(&db, "boss", "secret1", UserRole::Admin).await;
        let service = UserService::new(Arc::new(db));
        let me = actor(&admin);

        let demote = UpdateUserRequest {
            role: Some("user".into()),
            ..Default::default()
        };
        assert_matches!(
            service.update(admin.id, &me, demote).await,
            Err(ServiceError::BadRequest(_))
        );
        assert_matches!(service.delete(admin.id, &me).await, Err(ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn password_change_requires_current_password() {
        let db = memory_db().await;
        let worker = insert_user(&db, "w", "secret1", UserRole::User).await;
        let service = UserService::new(Arc::new(db));
        let me = actor(&worker);

        let wrong = ChangePasswordRequest {
            current_password: "nope".into(),
            new_password: "secret2".into(),
        };
        assert_matches!(
            service.change_password(&me, wrong).await,
            Err(ServiceError::BadRequest(_))
        );

        let right = ChangePasswordRequest {
            current_password: "secret1".into(),
            new_password: "secret2".into(),
        };
        service.change_password(&me, right).await.unwrap();
        let stored = service.find(worker.id).await.unwrap();
        assert!(verify_password("secret2", &stored.password_hash));
    }

    #[tokio::test]
    async fn bootstrap_admin_is_created_once() {
        let service = UserService::new(Arc::new(memory_db().await));
        let admin = ("root", "changeme", "Administrator");
        assert!(service.ensure_bootstrap_admin(admin.0, admin.1, admin.2).await.unwrap());
        assert!(!service.ensure_bootstrap_admin(admin.0, admin.1, admin.2).await.unwrap());
        let users = service.list().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].role, UserRole::Admin);
    }
}
