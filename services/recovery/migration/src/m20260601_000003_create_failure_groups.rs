use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FailureGroups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FailureGroups::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FailureGroups::ErrorCode).string().not_null())
                    .col(ColumnDef::new(FailureGroups::EventName).string().not_null())
                    .col(
                        ColumnDef::new(FailureGroups::SourceService)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FailureGroups::StackHash).string().not_null())
                    .col(
                        ColumnDef::new(FailureGroups::ErrorMessage)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FailureGroups::Ticket).string().unique_key())
                    .col(ColumnDef::new(FailureGroups::Note).text())
                    .col(
                        ColumnDef::new(FailureGroups::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(FailureGroups::ModifiedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // One group per distinct failure signature.
        manager
            .create_index(
                Index::create()
                    .table(FailureGroups::Table)
                    .col(FailureGroups::ErrorCode)
                    .col(FailureGroups::EventName)
                    .col(FailureGroups::SourceService)
                    .col(FailureGroups::StackHash)
                    .name("uidx_failure_groups_signature")
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FailureGroups::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum FailureGroups {
    Table,
    Id,
    ErrorCode,
    EventName,
    SourceService,
    StackHash,
    ErrorMessage,
    Ticket,
    Note,
    CreatedAt,
    ModifiedAt,
}
