use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions_raw")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub data: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transactions_main::Entity",
        from = "Column::Id",
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
