use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DenomMetadata::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DenomMetadata::Denom)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DenomMetadata::BaseDenom).string().not_null())
                    .col(ColumnDef::new(DenomMetadata::DisplayName).string().not_null())
                    .col(ColumnDef::new(DenomMetadata::Symbol).string().not_null())
                    .col(ColumnDef::new(DenomMetadata::Decimals).integer().not_null())
                    .col(ColumnDef::new(DenomMetadata::IsIbc).boolean().not_null())
                    .col(ColumnDef::new(DenomMetadata::IbcHash).char_len(64).null())
                    .col(ColumnDef::new(DenomMetadata::IbcPath).string().null())
                    .col(
                        ColumnDef::new(DenomMetadata::HashMismatch)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(DenomMetadata::ChainId).string().not_null())
                    .col(
                        ColumnDef::new(DenomMetadata::LastUpdated)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default("NOW()"),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DenomMetadata::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum DenomMetadata {
    Table,
    Denom,
    BaseDenom,
    DisplayName,
    Symbol,
    Decimals,
    IsIbc,
    IbcHash,
    IbcPath,
    HashMismatch,
    ChainId,
    LastUpdated,
}
