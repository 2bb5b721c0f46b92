use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::db::{WriteOutcome, is_unique_violation};
use crate::entities::{api_keys, prelude::*};
use crate::models::{ApiKey, ApiKeyState};

pub struct ApiKeyRepository {
    conn: DatabaseConnection,
}

impl ApiKeyRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(model: api_keys::Model) -> Result<ApiKey> {
        Ok(ApiKey {
            state: model
                .state
                .parse::<ApiKeyState>()
                .with_context(|| format!("Corrupt state for API key {}", model.id))?,
            key_version: u32::try_from(model.key_version)
                .with_context(|| format!("Corrupt key version for API key {}", model.id))?,
            id: model.id,
            user_id: model.user_id,
            key_prefix: model.key_prefix,
            key_hash: model.key_hash,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    fn map_all(models: Vec<api_keys::Model>) -> Result<Vec<ApiKey>> {
        models.into_iter().map(Self::map_model).collect()
    }

    /// Inserts a key. A second live key for the same user yields [`WriteOutcome::Duplicate`].
    pub async fn insert(&self, key: &ApiKey) -> Result<WriteOutcome> {
        let active = api_keys::ActiveModel {
            id: Set(key.id.clone()),
            user_id: Set(key.user_id.clone()),
            key_prefix: Set(key.key_prefix.clone()),
            key_hash: Set(key.key_hash.clone()),
            state: Set(key.state.as_str().to_string()),
            key_version: Set(i32::try_from(key.key_version).context("Key version out of range")?),
            created_at: Set(key.created_at.clone()),
            updated_at: Set(key.updated_at.clone()),
        };

        match ApiKeys::insert(active).exec_without_returning(&self.conn).await {
            Ok(_) => Ok(WriteOutcome::Applied),
            Err(e) if is_unique_violation(&e) => Ok(WriteOutcome::Duplicate),
            Err(e) => Err(e).context("Failed to insert API key"),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<ApiKey>> {
        ApiKeys::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query API key")?
            .map(Self::map_model)
            .transpose()
    }

    /// The user's pending or active key, if any.
    pub async fn live_for_user(&self, user_id: &str) -> Result<Option<ApiKey>> {
        ApiKeys::find()
            .filter(api_keys::Column::UserId.eq(user_id))
            .filter(api_keys::Column::State.is_in(ApiKeyState::LIVE.map(ApiKeyState::as_str)))
            .one(&self.conn)
            .await
            .context("Failed to query live API key")?
            .map(Self::map_model)
            .transpose()
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<ApiKey>> {
        let rows = ApiKeys::find()
            .filter(api_keys::Column::UserId.eq(user_id))
            .order_by_desc(api_keys::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to list API keys")?;

        Self::map_all(rows)
    }

    pub async fn active_by_prefix(&self, key_prefix: &str) -> Result<Vec<ApiKey>> {
        let rows = ApiKeys::find()
            .filter(api_keys::Column::KeyPrefix.eq(key_prefix))
            .filter(api_keys::Column::State.eq(ApiKeyState::Active.as_str()))
            .all(&self.conn)
            .await
            .context("Failed to query API keys by prefix")?;

        Self::map_all(rows)
    }

    /// Single conditional update: applies only while the key is in one of `from`.
    pub async fn transition(&self, id: &str, from: &[ApiKeyState], to: ApiKeyState) -> Result<bool> {
        let result = ApiKeys::update_many()
            .col_expr(api_keys::Column::State, Expr::value(to.as_str()))
            .col_expr(
                api_keys::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(api_keys::Column::Id.eq(id))
            .filter(api_keys::Column::State.is_in(from.iter().map(|s| s.as_str())))
            .exec(&self.conn)
            .await
            .context("Failed to update API key state")?;

        Ok(result.rows_affected == 1)
    }

    /// Applies the same conditional transition to every key of a user.
    pub async fn transition_for_user(
        &self,
        user_id: &str,
        from: &[ApiKeyState],
        to: ApiKeyState,
    ) -> Result<u64> {
        let result = ApiKeys::update_many()
            .col_expr(api_keys::Column::State, Expr::value(to.as_str()))
            .col_expr(
                api_keys::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(api_keys::Column::UserId.eq(user_id))
            .filter(api_keys::Column::State.is_in(from.iter().map(|s| s.as_str())))
            .exec(&self.conn)
            .await
            .context("Failed to update API keys for user")?;

        Ok(result.rows_affected)
    }
}
