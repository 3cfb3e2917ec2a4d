use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Progress::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Progress::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Progress::LastCommittedHeight)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Progress::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default("NOW()"),
                    )
                    .col(
                        ColumnDef::new(Progress::SkippedHeights)
                            .array(ColumnType::BigInteger)
                            .not_null()
                            .default(Expr::cust("'{}'")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"INSERT INTO "progress" ("id", "last_committed_height") VALUES (0, 0) ON CONFLICT DO NOTHING"#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Progress::Table).to_owned())
            .await
    }
}

/// The singleton progress row always lives at id = 0.
#[derive(Iden)]
pub enum Progress {
    Table,
    Id,
    LastCommittedHeight,
    UpdatedAt,
    /// Heights permanently skipped under the skip failure policy (\S4.7).
    SkippedHeights,
}
