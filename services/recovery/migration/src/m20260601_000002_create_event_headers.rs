use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EventHeaders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EventHeaders::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EventHeaders::CausingEventId)
                            .uuid()
                            .not_null(),
                    )
                    // Headers are an ordered list on the wire; keep that order.
                    .col(ColumnDef::new(EventHeaders::Position).integer().not_null())
                    .col(ColumnDef::new(EventHeaders::Name).string().not_null())
                    .col(ColumnDef::new(EventHeaders::Value).binary().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(EventHeaders::Table, EventHeaders::CausingEventId)
                            .to(CausingEvents::Table, CausingEvents::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(EventHeaders::Table)
                    .col(EventHeaders::CausingEventId)
                    .name("idx_event_headers_causing_event_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EventHeaders::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum EventHeaders {
    Table,
    Id,
    CausingEventId,
    Position,
    Name,
    Value,
}

#[derive(Iden)]
enum CausingEvents {
    Table,
    Id,
}
