use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "api_keys")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub user_id: String,

    /// Non-secret lookup segment of the key, narrows verification candidates.
    pub key_prefix: String,

    /// Argon2id PHC string of the full key
    pub key_hash: String,

    /// `pending`, `active`, `rejected` or `revoked`
    pub state: String,

    /// Master key generation current when the key was issued
    pub key_version: i32,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
