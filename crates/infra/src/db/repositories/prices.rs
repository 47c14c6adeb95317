use anyhow::Result;
use async_trait::async_trait;
use diesel::{OptionalExtension, RunQueryDsl, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::postgres::postgres_connection::PgPoolSquad;
use domain::entities::prices::PriceEntity;
use domain::repositories::prices::PriceRepository;
use domain::schema::prices;

pub struct PricePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PricePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PriceRepository for PricePostgres {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PriceEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let price = prices::table
            .filter(prices::id.eq(id))
            .select(PriceEntity::as_select())
            .first::<PriceEntity>(&mut conn)
            .optional()?;

        Ok(price)
    }

    async fn find_by_stripe_price_id(
        &self,
        stripe_price_id: &str,
    ) -> Result<Option<PriceEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let price = prices::table
            .filter(prices::stripe_price_id.eq(stripe_price_id))
            .select(PriceEntity::as_select())
            .first::<PriceEntity>(&mut conn)
            .optional()?;

        Ok(price)
    }

    async fn set_stripe_price_id(&self, id: Uuid, stripe_price_id: &str) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(prices::table.filter(prices::id.eq(id)))
            .set(prices::stripe_price_id.eq(Some(stripe_price_id)))
            .execute(&mut conn)?;

        Ok(())
    }
}
