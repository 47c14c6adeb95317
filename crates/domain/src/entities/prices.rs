use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::prices;

/// Local price row. `amount_minor`, `currency`, and the billing interval
/// are immutable on the remote side once a remote price exists; local
/// edits to them cause the sync layer to mint a replacement remote price.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = prices)]
pub struct PriceEntity {
    pub id: Uuid,
    pub product_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub interval: String,
    pub interval_count: i32,
    pub trial_period_days: Option<i32>,
    pub is_active: bool,
    pub stripe_price_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

