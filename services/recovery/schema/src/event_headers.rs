use sea_orm::entity::prelude::*;

/// One transport header of a stored causing event.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "event_headers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub causing_event_id: Uuid,
    /// Index of the header within the message, preserving wire order.
    pub position: i32,
    pub name: String,
    pub value: Vec<u8>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::causing_events::Entity",
        from = "Column::CausingEventId",
        to = "super::causing_events::Column::Id"
    )]
    CausingEvent,
}

impl Related<super::causing_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CausingEvent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
