use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// `None` marks a one-time price; everything else is a recurrence period.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BillingInterval {
    #[default]
    None,
    Day,
    Week,
    Month,
    Year,
}

impl Display for BillingInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let interval = match self {
            BillingInterval::None => "none",
            BillingInterval::Day => "day",
            BillingInterval::Week => "week",
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        };
        write!(f, "{}", interval)
    }
}

impl BillingInterval {
    pub fn from_str(value: &str) -> Self {
        match value {
            "day" => BillingInterval::Day,
            "week" => BillingInterval::Week,
            "month" => BillingInterval::Month,
            "year" => BillingInterval::Year,
            _ => BillingInterval::None,
        }
    }

    pub fn is_recurring(self) -> bool {
        !matches!(self, BillingInterval::None)
    }
}
