use sea_orm::entity::prelude::*;

#[derive(Clone, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "encrypted_secrets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub owner_id: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub kind: String,

    #[sea_orm(column_type = "Blob")]
    pub ciphertext: Vec<u8>,

    #[sea_orm(column_type = "Blob")]
    pub nonce: Vec<u8>,

    pub key_version: i32,

    pub updated_at: String,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("owner_id", &self.owner_id)
            .field("kind", &self.kind)
            .field("key_version", &self.key_version)
            .finish_non_exhaustive()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
