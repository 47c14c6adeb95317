use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::invoices::{InsertInvoiceEntity, InvoiceEntity};
use crate::value_objects::invoices::InvoicePatch;

#[automock]
#[async_trait]
pub trait InvoiceRepository {
    async fn create(&self, entity: InsertInvoiceEntity) -> Result<Uuid>;

    async fn find_by_stripe_invoice_id(
        &self,
        stripe_invoice_id: &str,
    ) -> Result<Option<InvoiceEntity>>;

    async fn update_by_stripe_invoice_id(
        &self,
        stripe_invoice_id: &str,
        patch: InvoicePatch,
    ) -> Result<()>;
}
