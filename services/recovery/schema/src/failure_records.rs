use sea_orm::entity::prelude::*;

/// One reported processing failure and its recovery state.
///
/// `version` backs optimistic locking: every update bumps it and is
/// conditioned on the previously read value.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "failure_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub state: String,
    pub temporality: String,
    pub error_code: String,
    pub error_message: String,
    pub error_description: Option<String>,
    pub stack_trace: Option<String>,
    pub stack_hash: Option<String>,
    pub causing_event_id: Uuid,
    pub group_id: Option<Uuid>,
    pub reporter_service: String,
    pub reporter_system: Option<String>,
    pub report_event_id: String,
    pub report_type_name: String,
    pub report_type_version: Option<String>,
    pub report_idempotence_id: String,
    pub report_created: Option<chrono::DateTime<chrono::Utc>>,
    pub closing_reason: Option<String>,
    pub task_id: Option<Uuid>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub version: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub modified_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::causing_events::Entity",
        from = "Column::CausingEventId",
        to = "super::causing_events::Column::Id"
    )]
    CausingEvent,
    #[sea_orm(
        belongs_to = "super::failure_groups::Entity",
        from = "Column::GroupId",
        to = "super::failure_groups::Column::Id"
    )]
    FailureGroup,
    #[sea_orm(has_many = "super::scheduled_retries::Entity")]
    ScheduledRetries,
    #[sea_orm(has_many = "super::audit_entries::Entity")]
    AuditEntries,
}

impl Related<super::causing_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CausingEvent.def()
    }
}

impl Related<super::failure_groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FailureGroup.def()
    }
}

impl Related<super::scheduled_retries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ScheduledRetries.def()
    }
}

impl Related<super::audit_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AuditEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
