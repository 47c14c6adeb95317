use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::customers;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = customers)]
pub struct CustomerEntity {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

