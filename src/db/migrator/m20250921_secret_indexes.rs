use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();

        conn.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_api_keys_key_prefix ON api_keys(key_prefix)",
        )
        .await?;

        conn.execute_unprepared("CREATE INDEX IF NOT EXISTS idx_api_keys_user_id ON api_keys(user_id)")
            .await?;

        // At most one pending or active key per user, even under concurrent issuance.
        conn.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_api_keys_one_live_per_user \
             ON api_keys(user_id) WHERE state IN ('pending', 'active')",
        )
        .await?;

        conn.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_email_bots_user_id ON email_bots(user_id)",
        )
        .await?;

        conn.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_encrypted_secrets_key_version \
             ON encrypted_secrets(key_version, owner_id, kind)",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();

        for index in [
            "idx_encrypted_secrets_key_version",
            "idx_email_bots_user_id",
            "idx_api_keys_one_live_per_user",
            "idx_api_keys_user_id",
            "idx_api_keys_key_prefix",
        ] {
            conn.execute_unprepared(&format!("DROP INDEX IF EXISTS {index}"))
                .await?;
        }

        Ok(())
    }
}
