use chrono::{DateTime, Utc};

use crate::value_objects::enums::invoice_statuses::InvoiceStatus;

/// Fields a reconciled invoice event overwrites on an existing row keyed by
/// its remote invoice id. Amounts are set, never incremented, so replays
/// converge.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoicePatch {
    pub status: InvoiceStatus,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub payment_intent_id: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}
