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
                    .table(TransactionsRaw::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TransactionsRaw::Id)
                            .char_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TransactionsRaw::Data).json_binary().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from_col(TransactionsRaw::Id)
                            .to(TransactionsMain::Table, TransactionsMain::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TransactionsRaw::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum TransactionsRaw {
    Table,
    Id,
    Data,
}
