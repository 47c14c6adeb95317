use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity};
use crate::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::value_objects::subscriptions::SubscriptionPatch;

#[automock]
#[async_trait]
pub trait SubscriptionRepository {
    /// Insert keyed on the remote subscription id; a concurrent insert of
    /// the same remote id must merge, not duplicate.
    async fn create(&self, entity: InsertSubscriptionEntity) -> Result<SubscriptionEntity>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SubscriptionEntity>>;

    async fn find_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<SubscriptionEntity>>;

    async fn update_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        patch: SubscriptionPatch,
    ) -> Result<()>;

    async fn update_status_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<()>;

    /// Immediate cancellation: status `canceled` with `canceled_at` and
    /// `ended_at` both set to `at`.
    async fn mark_canceled(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Period-end cancellation: status stays as-is, only the schedule fields
    /// are written.
    async fn schedule_cancellation(&self, id: Uuid, cancel_at: DateTime<Utc>) -> Result<()>;
}
