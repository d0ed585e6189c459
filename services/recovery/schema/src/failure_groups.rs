use sea_orm::entity::prelude::*;

/// Dedup bucket for recurring identical failures.
///
/// The four key columns identify "the same failure happening again"; the
/// migration puts a unique index over them.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "failure_groups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub error_code: String,
    pub event_name: String,
    pub source_service: String,
    pub stack_hash: String,
    /// Message of the first failure that opened the group.
    pub error_message: String,
    #[sea_orm(unique)]
    pub ticket: Option<String>,
    pub note: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub modified_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::failure_records::Entity")]
    FailureRecords,
}

impl Related<super::failure_records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FailureRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
