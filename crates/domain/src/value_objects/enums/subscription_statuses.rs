use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    Paused,
    #[default]
    Incomplete,
}

impl Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Incomplete => "incomplete",
        };
        write!(f, "{}", status)
    }
}

impl SubscriptionStatus {
    pub fn from_str(value: &str) -> Self {
        match value {
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            "paused" => SubscriptionStatus::Paused,
            "incomplete" => SubscriptionStatus::Incomplete,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    /// Maps the wider set of processor-side statuses onto the local lifecycle.
    pub fn from_remote(value: &str) -> Self {
        match value {
            "active" | "trialing" => SubscriptionStatus::Active,
            "past_due" | "unpaid" => SubscriptionStatus::PastDue,
            "canceled" | "incomplete_expired" => SubscriptionStatus::Canceled,
            "paused" => SubscriptionStatus::Paused,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SubscriptionStatus::Canceled)
    }

    /// The only legal status advances. `canceled` is terminal; everything
    /// that writes a status must go through this predicate.
    pub fn can_transition_to(self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;
        match (self, next) {
            (Canceled, _) => false,
            (Active, PastDue) | (Active, Paused) | (Active, Canceled) => true,
            (PastDue, Active) | (PastDue, Canceled) => true,
            (Paused, Active) | (Paused, Canceled) => true,
            (Incomplete, Active) | (Incomplete, PastDue) | (Incomplete, Canceled) => true,
            _ => false,
        }
    }
}
