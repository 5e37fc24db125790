use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One production batch: flock size, losses, feed used, and its money side.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "productions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub chicken_count: i32,
    pub mortality: i32,
    pub feed_consumption: f64,
    pub feed_cost: f64,
    pub vaccine_cost: f64,
    pub utility_cost: f64,
    pub other_cost: f64,
    pub revenue: f64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Model {
    pub fn total_costs(&self) -> f64 {
        self.feed_cost + self.vaccine_cost + self.utility_cost + self.other_cost
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
