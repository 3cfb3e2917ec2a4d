use sea_orm_migration::prelude::*;

use crate::m20260112_000003_create_table_transactions_main::TransactionsMain;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EventsMain::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EventsMain::TxId).char_len(64).not_null())
                    .col(ColumnDef::new(EventsMain::EventIndex).integer().not_null())
                    .col(ColumnDef::new(EventsMain::AttrIndex).integer().not_null())
                    .col(ColumnDef::new(EventsMain::EventType).string().not_null())
                    .col(ColumnDef::new(EventsMain::AttrKey).string().not_null())
                    .col(ColumnDef::new(EventsMain::AttrValue).text().null())
                    .col(ColumnDef::new(EventsMain::MsgIndex).integer().null())
                    .primary_key(
                        Index::create()
                            .col(EventsMain::TxId)
                            .col(EventsMain::EventIndex)
                            .col(EventsMain::AttrIndex),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from_col(EventsMain::TxId)
                            .to(TransactionsMain::Table, TransactionsMain::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EventsMain::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum EventsMain {
    Table,
    TxId,
    EventIndex,
    AttrIndex,
    EventType,
    AttrKey,
    AttrValue,
    MsgIndex,
}
