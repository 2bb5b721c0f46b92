use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::entities::{email_bots, prelude::*};
use crate::models::EmailBot;

pub struct EmailBotRepository {
    conn: DatabaseConnection,
}

impl EmailBotRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(model: email_bots::Model) -> Result<EmailBot> {
        Ok(EmailBot {
            smtp_port: u16::try_from(model.smtp_port)
                .with_context(|| format!("Corrupt SMTP port for bot {}", model.id))?,
            id: model.id,
            user_id: model.user_id,
            display_name: model.display_name,
            smtp_server: model.smtp_server,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    pub async fn insert(&self, bot: &EmailBot) -> Result<()> {
        let active = email_bots::ActiveModel {
            id: Set(bot.id.clone()),
            user_id: Set(bot.user_id.clone()),
            display_name: Set(bot.display_name.clone()),
            smtp_server: Set(bot.smtp_server.clone()),
            smtp_port: Set(i32::from(bot.smtp_port)),
            created_at: Set(bot.created_at.clone()),
            updated_at: Set(bot.updated_at.clone()),
        };

        EmailBots::insert(active)
            .exec_without_returning(&self.conn)
            .await
            .context("Failed to insert email bot")?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<EmailBot>> {
        EmailBots::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query email bot")?
            .map(Self::map_model)
            .transpose()
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<EmailBot>> {
        EmailBots::find()
            .filter(email_bots::Column::UserId.eq(user_id))
            .order_by_asc(email_bots::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to list email bots")?
            .into_iter()
            .map(Self::map_model)
            .collect()
    }

    pub async fn ids_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        EmailBots::find()
            .select_only()
            .column(email_bots::Column::Id)
            .filter(email_bots::Column::UserId.eq(user_id))
            .into_tuple::<String>()
            .all(&self.conn)
            .await
            .context("Failed to list email bot ids")
    }

    /// Rewrites the non-secret columns and bumps `updated_at`.
    pub async fn update_metadata(&self, bot: &EmailBot) -> Result<bool> {
        let Some(model) = EmailBots::find_by_id(bot.id.clone())
            .one(&self.conn)
            .await
            .context("Failed to query email bot for update")?
        else {
            return Ok(false);
        };

        let mut active: email_bots::ActiveModel = model.into();
        active.display_name = Set(bot.display_name.clone());
        active.smtp_server = Set(bot.smtp_server.clone());
        active.smtp_port = Set(i32::from(bot.smtp_port));
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        active
            .update(&self.conn)
            .await
            .context("Failed to update email bot")?;

        Ok(true)
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = EmailBots::delete_by_id(id.to_string())
            .exec(&self.conn)
            .await
            .context("Failed to delete email bot")?;
        Ok(result.rows_affected > 0)
    }
}
