use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use domain::entities::subscriptions::InsertSubscriptionEntity;
use domain::value_objects::enums::collection_methods::CollectionMethod;
use domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use domain::value_objects::subscriptions::SubscriptionPatch;
use payments::gateway::RemoteSubscription;
use tracing::warn;
use uuid::Uuid;

pub(crate) fn ts_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

pub(crate) fn opt_ts(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.and_then(ts_to_datetime)
}

/// Projects a remote snapshot into a new local row. Both the synchronous
/// creation path and webhook reconciliation go through here so the two
/// paths cannot disagree about field mapping.
pub(crate) fn subscription_insert_from_snapshot(
    user_id: Uuid,
    price_id: Uuid,
    snapshot: &RemoteSubscription,
) -> Result<InsertSubscriptionEntity> {
    let current_period_start = snapshot
        .period_start()
        .and_then(ts_to_datetime)
        .context("subscription snapshot is missing a period start")?;
    let current_period_end = snapshot
        .period_end()
        .and_then(ts_to_datetime)
        .context("subscription snapshot is missing a period end")?;

    Ok(InsertSubscriptionEntity {
        user_id,
        price_id,
        quantity: i32::try_from(snapshot.effective_quantity()).unwrap_or(1),
        status: SubscriptionStatus::from_remote(&snapshot.status).to_string(),
        current_period_start,
        current_period_end,
        cancel_at: opt_ts(snapshot.cancel_at),
        canceled_at: opt_ts(snapshot.canceled_at),
        ended_at: opt_ts(snapshot.ended_at),
        trial_start: opt_ts(snapshot.trial_start),
        trial_end: opt_ts(snapshot.trial_end),
        stripe_subscription_id: snapshot.id.clone(),
        stripe_customer_id: snapshot.customer.clone(),
        collection_method: snapshot
            .collection_method
            .as_deref()
            .map(CollectionMethod::from_str)
            .unwrap_or_default()
            .to_string(),
        cancel_at_period_end: snapshot.cancel_at_period_end,
    })
}

/// Projects a remote snapshot onto an existing row. The status only moves
/// along the lifecycle state machine; a snapshot that would jump somewhere
/// illegal keeps the current status and logs the refusal.
pub(crate) fn subscription_patch_from_snapshot(
    current: SubscriptionStatus,
    snapshot: &RemoteSubscription,
) -> Result<SubscriptionPatch> {
    let next = SubscriptionStatus::from_remote(&snapshot.status);
    let status = if next == current || current.can_transition_to(next) {
        next
    } else {
        warn!(
            stripe_subscription_id = %snapshot.id,
            current = %current,
            requested = %next,
            "refusing illegal status transition from remote snapshot"
        );
        current
    };

    let current_period_start = snapshot
        .period_start()
        .and_then(ts_to_datetime)
        .context("subscription snapshot is missing a period start")?;
    let current_period_end = snapshot
        .period_end()
        .and_then(ts_to_datetime)
        .context("subscription snapshot is missing a period end")?;

    Ok(SubscriptionPatch {
        status,
        quantity: i32::try_from(snapshot.effective_quantity()).unwrap_or(1),
        current_period_start,
        current_period_end,
        cancel_at: opt_ts(snapshot.cancel_at),
        canceled_at: opt_ts(snapshot.canceled_at),
        ended_at: opt_ts(snapshot.ended_at),
        cancel_at_period_end: snapshot.cancel_at_period_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(status: &str) -> RemoteSubscription {
        serde_json::from_value(json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": status,
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_702_592_000,
            "items": { "data": [ { "id": "si_1", "quantity": 3 } ] }
        }))
        .unwrap()
    }

    #[test]
    fn insert_projection_maps_quantity_and_status() {
        let entity =
            subscription_insert_from_snapshot(Uuid::new_v4(), Uuid::new_v4(), &snapshot("active"))
                .unwrap();
        assert_eq!(entity.quantity, 3);
        assert_eq!(entity.status, "active");
        assert_eq!(entity.stripe_subscription_id, "sub_1");
    }

    #[test]
    fn patch_refuses_illegal_transition() {
        let patch =
            subscription_patch_from_snapshot(SubscriptionStatus::Canceled, &snapshot("active"))
                .unwrap();
        assert_eq!(patch.status, SubscriptionStatus::Canceled);
    }

    #[test]
    fn patch_applies_legal_transition() {
        let patch =
            subscription_patch_from_snapshot(SubscriptionStatus::Active, &snapshot("past_due"))
                .unwrap();
        assert_eq!(patch.status, SubscriptionStatus::PastDue);
    }

    #[test]
    fn missing_period_is_an_error() {
        let bare: RemoteSubscription = serde_json::from_value(json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active"
        }))
        .unwrap();
        assert!(subscription_insert_from_snapshot(Uuid::new_v4(), Uuid::new_v4(), &bare).is_err());
    }
}
