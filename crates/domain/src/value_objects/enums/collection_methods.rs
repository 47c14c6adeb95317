use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CollectionMethod {
    #[default]
    ChargeAutomatically,
    SendInvoice,
}

impl Display for CollectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let method = match self {
            CollectionMethod::ChargeAutomatically => "charge_automatically",
            CollectionMethod::SendInvoice => "send_invoice",
        };
        write!(f, "{}", method)
    }
}

impl CollectionMethod {
    pub fn from_str(value: &str) -> Self {
        match value {
            "send_invoice" => CollectionMethod::SendInvoice,
            _ => CollectionMethod::ChargeAutomatically,
        }
    }
}
