use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::products;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = products)]
pub struct ProductEntity {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub stripe_product_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

