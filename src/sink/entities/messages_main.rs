use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "messages_main")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tx_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub message_index: i32,
    #[sea_orm(column_name = "type")]
    pub r#type: String,
    pub sender: Option<String>,
    pub mentions: Vec<String>,
    pub metadata: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transactions_main::Entity",
        from = "Column::TxId",
        to = "super::transactions_main::Column::Id"
    )]
    TransactionsMain,
}

impl Related<super::transactions_main::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionsMain.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
