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
                    .table(MessagesMain::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(MessagesMain::TxId).char_len(64).not_null())
                    .col(ColumnDef::new(MessagesMain::MessageIndex).integer().not_null())
                    .col(ColumnDef::new(MessagesMain::Type).string().not_null())
                    .col(ColumnDef::new(MessagesMain::Sender).string().null())
                    .col(
                        ColumnDef::new(MessagesMain::Mentions)
                            .array(ColumnType::Text)
                            .not_null(),
                    )
                    .col(ColumnDef::new(MessagesMain::Metadata).json_binary().not_null())
                    .primary_key(
                        Index::create()
                            .col(MessagesMain::TxId)
                            .col(MessagesMain::MessageIndex),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from_col(MessagesMain::TxId)
                            .to(TransactionsMain::Table, TransactionsMain::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(MessagesMain::Table)
                    .name("messages_main_sender_idx")
                    .col(MessagesMain::Sender)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MessagesMain::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum MessagesMain {
    Table,
    TxId,
    MessageIndex,
    Type,
    Sender,
    Mentions,
    Metadata,
}
