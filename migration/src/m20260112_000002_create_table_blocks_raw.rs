use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BlocksRaw::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BlocksRaw::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BlocksRaw::BlockHash).char_len(64).not_null())
                    .col(
                        ColumnDef::new(BlocksRaw::ChainId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BlocksRaw::ProposerAddress)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BlocksRaw::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BlocksRaw::Data).json_binary().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(BlocksRaw::Table)
                    .name("blocks_raw_block_hash_idx")
                    .col(BlocksRaw::BlockHash)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BlocksRaw::Table).to_owned())
            .await
    }
}

/// `id` is the block height.
#[derive(Iden)]
pub enum BlocksRaw {
    Table,
    Id,
    BlockHash,
    ChainId,
    ProposerAddress,
    Timestamp,
    Data,
}
