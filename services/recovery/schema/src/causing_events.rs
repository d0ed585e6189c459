use sea_orm::entity::prelude::*;

/// Verbatim copy of a message whose processing failed, kept for replay.
///
/// Metadata columns are nullable: a reporter that could not decode the
/// message only delivers the raw bytes.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "causing_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub event_id: Option<String>,
    pub event_idempotence_id: Option<String>,
    pub event_name: String,
    pub event_version: Option<String>,
    pub publisher_service: String,
    pub publisher_system: Option<String>,
    pub event_created: Option<chrono::DateTime<chrono::Utc>>,
    pub topic: String,
    pub cluster_name: Option<String>,
    pub partition: Option<i32>,
    pub message_offset: Option<i64>,
    pub message_key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::event_headers::Entity")]
    EventHeaders,
    #[sea_orm(has_many = "super::failure_records::Entity")]
    FailureRecords,
}

impl Related<super::event_headers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EventHeaders.def()
    }
}

impl Related<super::failure_records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FailureRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
