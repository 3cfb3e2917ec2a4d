use sea_orm_migration::prelude::*;

use crate::m20260112_000002_create_table_blocks_raw::BlocksRaw;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TransactionsMain::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TransactionsMain::Id)
                            .char_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TransactionsMain::Height).big_integer().not_null())
                    .col(
                        ColumnDef::new(TransactionsMain::IndexInBlock)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TransactionsMain::Fee).json_binary().not_null())
                    .col(ColumnDef::new(TransactionsMain::GasLimit).big_integer().not_null())
                    .col(ColumnDef::new(TransactionsMain::Memo).text().null())
                    .col(ColumnDef::new(TransactionsMain::ErrorCode).integer().null())
                    .col(ColumnDef::new(TransactionsMain::ErrorLog).text().null())
                    .col(
                        ColumnDef::new(TransactionsMain::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionsMain::ProposalIds)
                            .array(ColumnType::Integer)
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from_col(TransactionsMain::Height)
                            .to(BlocksRaw::Table, BlocksRaw::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(TransactionsMain::Table)
                    .name("transactions_main_height_index_idx")
                    .col(TransactionsMain::Height)
                    .col(TransactionsMain::IndexInBlock)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TransactionsMain::Table).to_owned())
            .await
    }
}

/// `id` is the tx hash (hex64, uppercase by convention).
#[derive(Iden)]
pub enum TransactionsMain {
    Table,
    Id,
    Height,
    IndexInBlock,
    Fee,
    GasLimit,
    Memo,
    ErrorCode,
    ErrorLog,
    Timestamp,
    ProposalIds,
}
