use sea_orm::entity::prelude::*;

/// A pending automatic resend of a failure record's causing event.
///
/// `claimed_at` marks the job as taken by one scheduler instance; the claim
/// update is conditioned on `version` so concurrent instances cannot both
/// win.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "scheduled_retries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub failure_record_id: Uuid,
    pub due_at: chrono::DateTime<chrono::Utc>,
    pub cancelled: bool,
    pub claimed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
    pub version: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::failure_records::Entity",
        from = "Column::FailureRecordId",
        to = "super::failure_records::Column::Id"
    )]
    FailureRecord,
}

impl Related<super::failure_records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FailureRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
