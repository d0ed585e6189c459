use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CausingEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CausingEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CausingEvents::EventId).string())
                    .col(ColumnDef::new(CausingEvents::EventIdempotenceId).string())
                    .col(ColumnDef::new(CausingEvents::EventName).string().not_null())
                    .col(ColumnDef::new(CausingEvents::EventVersion).string())
                    .col(
                        ColumnDef::new(CausingEvents::PublisherService)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CausingEvents::PublisherSystem).string())
                    .col(ColumnDef::new(CausingEvents::EventCreated).timestamp_with_time_zone())
                    .col(ColumnDef::new(CausingEvents::Topic).string().not_null())
                    .col(ColumnDef::new(CausingEvents::ClusterName).string())
                    .col(ColumnDef::new(CausingEvents::Partition).integer())
                    .col(ColumnDef::new(CausingEvents::MessageOffset).big_integer())
                    .col(ColumnDef::new(CausingEvents::MessageKey).binary())
                    .col(ColumnDef::new(CausingEvents::Payload).binary().not_null())
                    .col(
                        ColumnDef::new(CausingEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One stored envelope per external event id; ingestion relies on
        // the violation to converge concurrent reports onto one row.
        // Postgres lets any number of NULL ids through, which is what
        // id-less messages need.
        manager
            .create_index(
                Index::create()
                    .table(CausingEvents::Table)
                    .col(CausingEvents::EventId)
                    .name("idx_causing_events_event_id")
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CausingEvents::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum CausingEvents {
    Table,
    Id,
    EventId,
    EventIdempotenceId,
    EventName,
    EventVersion,
    PublisherService,
    PublisherSystem,
    EventCreated,
    Topic,
    ClusterName,
    Partition,
    MessageOffset,
    MessageKey,
    Payload,
    CreatedAt,
}
