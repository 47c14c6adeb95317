use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{OptionalExtension, RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::postgres::postgres_connection::PgPoolSquad;
use domain::entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity};
use domain::repositories::subscriptions::SubscriptionRepository;
use domain::schema::subscriptions;
use domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use domain::value_objects::subscriptions::SubscriptionPatch;

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn create(&self, entity: InsertSubscriptionEntity) -> Result<SubscriptionEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // The remote id is unique; racing inserts from the synchronous and
        // webhook paths merge into one row instead of erroring.
        let subscription = insert_into(subscriptions::table)
            .values(&entity)
            .on_conflict(subscriptions::stripe_subscription_id)
            .do_update()
            .set((
                subscriptions::status.eq(&entity.status),
                subscriptions::quantity.eq(entity.quantity),
                subscriptions::current_period_start.eq(entity.current_period_start),
                subscriptions::current_period_end.eq(entity.current_period_end),
                subscriptions::cancel_at_period_end.eq(entity.cancel_at_period_end),
            ))
            .returning(SubscriptionEntity::as_returning())
            .get_result::<SubscriptionEntity>(&mut conn)?;

        Ok(subscription)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let subscription = subscriptions::table
            .filter(subscriptions::id.eq(id))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(subscription)
    }

    async fn find_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let subscription = subscriptions::table
            .filter(subscriptions::stripe_subscription_id.eq(stripe_subscription_id))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(subscription)
    }

    async fn update_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        patch: SubscriptionPatch,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(
            subscriptions::table
                .filter(subscriptions::stripe_subscription_id.eq(stripe_subscription_id)),
        )
        .set((
            subscriptions::status.eq(patch.status.to_string()),
            subscriptions::quantity.eq(patch.quantity),
            subscriptions::current_period_start.eq(patch.current_period_start),
            subscriptions::current_period_end.eq(patch.current_period_end),
            subscriptions::cancel_at.eq(patch.cancel_at),
            subscriptions::canceled_at.eq(patch.canceled_at),
            subscriptions::ended_at.eq(patch.ended_at),
            subscriptions::cancel_at_period_end.eq(patch.cancel_at_period_end),
        ))
        .execute(&mut conn)?;

        Ok(())
    }

    async fn update_status_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(
            subscriptions::table
                .filter(subscriptions::stripe_subscription_id.eq(stripe_subscription_id)),
        )
        .set(subscriptions::status.eq(status.to_string()))
        .execute(&mut conn)?;

        Ok(())
    }

    async fn mark_canceled(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(subscriptions::table.filter(subscriptions::id.eq(id)))
            .set((
                subscriptions::status.eq(SubscriptionStatus::Canceled.to_string()),
                subscriptions::canceled_at.eq(Some(at)),
                subscriptions::ended_at.eq(Some(at)),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn schedule_cancellation(&self, id: Uuid, cancel_at: DateTime<Utc>) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(subscriptions::table.filter(subscriptions::id.eq(id)))
            .set((
                subscriptions::cancel_at_period_end.eq(true),
                subscriptions::cancel_at.eq(Some(cancel_at)),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
