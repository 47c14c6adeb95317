pub mod billing_intervals;
pub mod collection_methods;
pub mod invoice_statuses;
pub mod subscription_statuses;
