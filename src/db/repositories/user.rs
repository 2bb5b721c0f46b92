use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::db::{WriteOutcome, is_unique_violation};
use crate::entities::{prelude::*, users};
use crate::models::{User, UserRole, UserStatus};

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(model: users::Model) -> Result<User> {
        Ok(User {
            role: model
                .role
                .parse::<UserRole>()
                .with_context(|| format!("Corrupt role for user {}", model.id))?,
            status: model
                .status
                .parse::<UserStatus>()
                .with_context(|| format!("Corrupt status for user {}", model.id))?,
            id: model.id,
            name: model.name,
            email: model.email,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    /// Inserts a user. A taken email yields [`WriteOutcome::Duplicate`].
    pub async fn create(&self, user: &User) -> Result<WriteOutcome> {
        let active = users::ActiveModel {
            id: Set(user.id.clone()),
            name: Set(user.name.clone()),
            email: Set(user.email.clone()),
            role: Set(user.role.as_str().to_string()),
            status: Set(user.status.as_str().to_string()),
            created_at: Set(user.created_at.clone()),
            updated_at: Set(user.updated_at.clone()),
        };

        match Users::insert(active).exec_without_returning(&self.conn).await {
            Ok(_) => Ok(WriteOutcome::Applied),
            Err(e) if is_unique_violation(&e) => Ok(WriteOutcome::Duplicate),
            Err(e) => Err(e).context("Failed to insert user"),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<User>> {
        Users::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?
            .map(Self::map_model)
            .transpose()
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        Users::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?
            .map(Self::map_model)
            .transpose()
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        Users::find()
            .order_by_asc(users::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to list users")?
            .into_iter()
            .map(Self::map_model)
            .collect()
    }

    pub async fn list_by_role(&self, role: UserRole) -> Result<Vec<User>> {
        Users::find()
            .filter(users::Column::Role.eq(role.as_str()))
            .order_by_asc(users::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to list users by role")?
            .into_iter()
            .map(Self::map_model)
            .collect()
    }

    /// Moves the user to `to` only if its current status is one of `from`.
    pub async fn transition_status(
        &self,
        id: &str,
        from: &[UserStatus],
        to: UserStatus,
    ) -> Result<bool> {
        let result = Users::update_many()
            .col_expr(users::Column::Status, Expr::value(to.as_str()))
            .col_expr(
                users::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(users::Column::Id.eq(id))
            .filter(users::Column::Status.is_in(from.iter().map(|s| s.as_str())))
            .exec(&self.conn)
            .await
            .context("Failed to update user status")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn update_profile(
        &self,
        id: &str,
        name: Option<&str>,
        email: Option<&str>,
        role: Option<UserRole>,
    ) -> Result<WriteOutcome> {
        let Some(model) = Users::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query user for update")?
        else {
            return Ok(WriteOutcome::NotFound);
        };

        let mut active: users::ActiveModel = model.into();
        if let Some(name) = name {
            active.name = Set(name.to_string());
        }
        if let Some(email) = email {
            active.email = Set(email.to_string());
        }
        if let Some(role) = role {
            active.role = Set(role.as_str().to_string());
        }
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        match active.update(&self.conn).await {
            Ok(_) => Ok(WriteOutcome::Applied),
            Err(e) if is_unique_violation(&e) => Ok(WriteOutcome::Duplicate),
            Err(e) => Err(e).context("Failed to update user"),
        }
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = Users::delete_by_id(id.to_string())
            .exec(&self.conn)
            .await
            .context("Failed to delete user")?;
        Ok(result.rows_affected > 0)
    }
}
