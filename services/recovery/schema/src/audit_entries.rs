use sea_orm::entity::prelude::*;

/// Audit trail row for a manual resend or delete.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub failure_record_id: Uuid,
    pub action: String,
    pub state_at: String,
    pub reason: Option<String>,
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
