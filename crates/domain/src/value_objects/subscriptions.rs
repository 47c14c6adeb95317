use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::subscriptions::SubscriptionEntity;
use crate::value_objects::enums::subscription_statuses::SubscriptionStatus;

/// Fields a reconciled remote snapshot is allowed to overwrite on an
/// existing subscription row, applied in one repository call.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionPatch {
    pub status: SubscriptionStatus,
    pub quantity: i32,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionDto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub price_id: Uuid,
    pub quantity: i32,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub stripe_subscription_id: String,
}

impl From<SubscriptionEntity> for SubscriptionDto {
    fn from(entity: SubscriptionEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            price_id: entity.price_id,
            quantity: entity.quantity,
            status: SubscriptionStatus::from_str(&entity.status),
            current_period_start: entity.current_period_start,
            current_period_end: entity.current_period_end,
            cancel_at_period_end: entity.cancel_at_period_end,
            stripe_subscription_id: entity.stripe_subscription_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionModel {
    pub user_id: Uuid,
    pub price_id: Uuid,
    pub quantity: i32,
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelSubscriptionModel {
    #[serde(default)]
    pub immediate: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateQuantityModel {
    pub quantity: i32,
}
