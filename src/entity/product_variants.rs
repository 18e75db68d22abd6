use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "product_variants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    #[sea_orm(unique)]
    pub sku: String,
    pub size: String,
    pub color: Option<String>,
    pub stock_quantity: i32,
    pub additional_price: i64,
    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Human readable snapshot stored on order lines.
    pub fn details(&self) -> String {
        match &self.color {
            Some(color) => format!("Size: {}, Color: {}", self.size, color),
            None => format!("Size: {}", self.size),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::products::Entity",
        from = "Column::ProductId",
        to = "super::products::Column::Id"
    )]
    Products,
}

impl Related<super::products::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Products.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
