use sea_orm::entity::prelude::*;

/// `id` is the block height.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "blocks_raw")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    #[sea_orm(unique)]
    pub block_hash: String,
    pub chain_id: String,
    pub proposer_address: Vec<u8>,
    pub timestamp: TimeDateTimeWithTimeZone,
    pub data: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transactions_main::Entity")]
    TransactionsMain,
}

impl Related<super::transactions_main::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionsMain.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
