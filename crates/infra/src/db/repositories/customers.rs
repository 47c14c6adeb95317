use anyhow::Result;
use async_trait::async_trait;
use diesel::{OptionalExtension, RunQueryDsl, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::postgres::postgres_connection::PgPoolSquad;
use domain::entities::customers::CustomerEntity;
use domain::repositories::customers::CustomerRepository;
use domain::schema::customers;

pub struct CustomerPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl CustomerPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl CustomerRepository for CustomerPostgres {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<CustomerEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let customer = customers::table
            .filter(customers::id.eq(id))
            .select(CustomerEntity::as_select())
            .first::<CustomerEntity>(&mut conn)
            .optional()?;

        Ok(customer)
    }

    async fn find_by_stripe_customer_id(
        &self,
        stripe_customer_id: &str,
    ) -> Result<Option<CustomerEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let customer = customers::table
            .filter(customers::stripe_customer_id.eq(stripe_customer_id))
            .select(CustomerEntity::as_select())
            .first::<CustomerEntity>(&mut conn)
            .optional()?;

        Ok(customer)
    }

    async fn set_stripe_customer_id(&self, id: Uuid, stripe_customer_id: &str) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(customers::table.filter(customers::id.eq(id)))
            .set(customers::stripe_customer_id.eq(Some(stripe_customer_id)))
            .execute(&mut conn)?;

        Ok(())
    }
}
