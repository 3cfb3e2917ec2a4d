use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "denom_metadata")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub denom: String,
    pub base_denom: String,
    pub display_name: String,
    pub symbol: String,
    pub decimals: i32,
    pub is_ibc: bool,
    pub ibc_hash: Option<String>,
    pub ibc_path: Option<String>,
    pub hash_mismatch: bool,
    pub chain_id: String,
    pub last_updated: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
