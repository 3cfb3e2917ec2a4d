use sea_orm::entity::prelude::*;

/// `id` is the tx hash (hex64, uppercase).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions_main")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub height: i64,
    pub index_in_block: i32,
    pub fee: Json,
    pub gas_limit: i64,
    pub memo: Option<String>,
    pub error_code: Option<i32>,
    pub error_log: Option<String>,
    pub timestamp: TimeDateTimeWithTimeZone,
    pub proposal_ids: Option<Vec<i32>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::blocks_raw::Entity",
        from = "Column::Height",
        to = "super::blocks_raw::Column::Id"
    )]
    BlocksRaw,
    #[sea_orm(has_one = "super::transactions_raw::Entity")]
    TransactionsRaw,
    #[sea_orm(has_many = "super::messages_main::Entity")]
    MessagesMain,
    #[sea_orm(has_many = "super::events_main::Entity")]
    EventsMain,
}

impl Related<super::blocks_raw::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BlocksRaw.def()
    }
}

impl Related<super::transactions_raw::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionsRaw.def()
    }
}

impl Related<super::messages_main::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MessagesMain.def()
    }
}

impl Related<super::events_main::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EventsMain.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
