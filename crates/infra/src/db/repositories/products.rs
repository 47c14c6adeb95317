use anyhow::Result;
use async_trait::async_trait;
use diesel::{OptionalExtension, RunQueryDsl, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::postgres::postgres_connection::PgPoolSquad;
use domain::entities::products::ProductEntity;
use domain::repositories::products::ProductRepository;
use domain::schema::products;

pub struct ProductPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl ProductPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ProductRepository for ProductPostgres {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ProductEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let product = products::table
            .filter(products::id.eq(id))
            .select(ProductEntity::as_select())
            .first::<ProductEntity>(&mut conn)
            .optional()?;

        Ok(product)
    }

    async fn set_stripe_product_id(&self, id: Uuid, stripe_product_id: &str) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(products::table.filter(products::id.eq(id)))
            .set(products::stripe_product_id.eq(Some(stripe_product_id)))
            .execute(&mut conn)?;

        Ok(())
    }
}
