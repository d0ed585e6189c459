use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FailureRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FailureRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FailureRecords::State).string().not_null())
                    .col(
                        ColumnDef::new(FailureRecords::Temporality)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FailureRecords::ErrorCode).string().not_null())
                    .col(
                        ColumnDef::new(FailureRecords::ErrorMessage)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FailureRecords::ErrorDescription).text())
                    .col(ColumnDef::new(FailureRecords::StackTrace).text())
                    .col(ColumnDef::new(FailureRecords::StackHash).string())
                    .col(
                        ColumnDef::new(FailureRecords::CausingEventId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FailureRecords::GroupId).uuid())
                    .col(
                        ColumnDef::new(FailureRecords::ReporterService)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FailureRecords::ReporterSystem).string())
                    .col(
                        ColumnDef::new(FailureRecords::ReportEventId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FailureRecords::ReportTypeName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FailureRecords::ReportTypeVersion).string())
                    .col(
                        ColumnDef::new(FailureRecords::ReportIdempotenceId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FailureRecords::ReportCreated).timestamp_with_time_zone())
                    .col(ColumnDef::new(FailureRecords::ClosingReason).string())
                    .col(ColumnDef::new(FailureRecords::TaskId).uuid())
                    .col(ColumnDef::new(FailureRecords::TraceId).string())
                    .col(ColumnDef::new(FailureRecords::SpanId).string())
                    .col(
                        ColumnDef::new(FailureRecords::Version)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FailureRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(FailureRecords::ModifiedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .from(FailureRecords::Table, FailureRecords::CausingEventId)
                            .to(CausingEvents::Table, CausingEvents::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(FailureRecords::Table, FailureRecords::GroupId)
                            .to(FailureGroups::Table, FailureGroups::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Ingestion dedup looks reports up by (idempotence id, reporter).
        // Not unique: chained retry clones reuse the report identity.
        manager
            .create_index(
                Index::create()
                    .table(FailureRecords::Table)
                    .col(FailureRecords::ReportIdempotenceId)
                    .col(FailureRecords::ReporterService)
                    .name("idx_failure_records_report_identity")
                    .to_owned(),
            )
            .await?;

        // The synchronizer and admin listing page through records by state,
        // newest first.
        manager
            .create_index(
                Index::create()
                    .table(FailureRecords::Table)
                    .col(FailureRecords::State)
                    .col(FailureRecords::CreatedAt)
                    .name("idx_failure_records_state_created_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FailureRecords::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum FailureRecords {
    Table,
    Id,
    State,
    Temporality,
    ErrorCode,
    ErrorMessage,
    ErrorDescription,
    StackTrace,
    StackHash,
    CausingEventId,
    GroupId,
    ReporterService,
    ReporterSystem,
    ReportEventId,
    ReportTypeName,
    ReportTypeVersion,
    ReportIdempotenceId,
    ReportCreated,
    ClosingReason,
    TaskId,
    TraceId,
    SpanId,
    Version,
    CreatedAt,
    ModifiedAt,
}

#[derive(Iden)]
enum CausingEvents {
    Table,
    Id,
}

#[derive(Iden)]
enum FailureGroups {
    Table,
    Id,
}
