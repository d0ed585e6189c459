use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScheduledRetries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScheduledRetries::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ScheduledRetries::FailureRecordId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ScheduledRetries::DueAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ScheduledRetries::Cancelled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ScheduledRetries::ClaimedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(ScheduledRetries::ResolvedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ScheduledRetries::Version)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScheduledRetries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(ScheduledRetries::Table, ScheduledRetries::FailureRecordId)
                            .to(FailureRecords::Table, FailureRecords::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Due-job polls filter on (resolved_at, claimed_at, due_at).
        manager
            .create_index(
                Index::create()
                    .table(ScheduledRetries::Table)
                    .col(ScheduledRetries::DueAt)
                    .name("idx_scheduled_retries_due_at")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(ScheduledRetries::Table)
                    .col(ScheduledRetries::FailureRecordId)
                    .name("idx_scheduled_retries_failure_record_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScheduledRetries::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ScheduledRetries {
    Table,
    Id,
    FailureRecordId,
    DueAt,
    Cancelled,
    ClaimedAt,
    ResolvedAt,
    Version,
    CreatedAt,
}

#[derive(Iden)]
enum FailureRecords {
    Table,
    Id,
}
