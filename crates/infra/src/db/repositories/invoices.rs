use anyhow::Result;
use async_trait::async_trait;
use diesel::{OptionalExtension, RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::postgres::postgres_connection::PgPoolSquad;
use domain::entities::invoices::{InsertInvoiceEntity, InvoiceEntity};
use domain::repositories::invoices::InvoiceRepository;
use domain::schema::invoices;
use domain::value_objects::invoices::InvoicePatch;

pub struct InvoicePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl InvoicePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl InvoiceRepository for InvoicePostgres {
    async fn create(&self, entity: InsertInvoiceEntity) -> Result<Uuid> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // A remote-id collision means the invoice already exists; converge
        // on it rather than inserting a duplicate row.
        let invoice_id = insert_into(invoices::table)
            .values(&entity)
            .on_conflict(invoices::stripe_invoice_id)
            .do_update()
            .set((
                invoices::status.eq(&entity.status),
                invoices::amount_due.eq(entity.amount_due),
                invoices::amount_paid.eq(entity.amount_paid),
                invoices::payment_intent_id.eq(entity.payment_intent_id.clone()),
            ))
            .returning(invoices::id)
            .get_result::<Uuid>(&mut conn)?;

        Ok(invoice_id)
    }

    async fn find_by_stripe_invoice_id(
        &self,
        stripe_invoice_id: &str,
    ) -> Result<Option<InvoiceEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let invoice = invoices::table
            .filter(invoices::stripe_invoice_id.eq(stripe_invoice_id))
            .select(InvoiceEntity::as_select())
            .first::<InvoiceEntity>(&mut conn)
            .optional()?;

        Ok(invoice)
    }

    async fn update_by_stripe_invoice_id(
        &self,
        stripe_invoice_id: &str,
        patch: InvoicePatch,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(invoices::table.filter(invoices::stripe_invoice_id.eq(stripe_invoice_id)))
            .set((
                invoices::status.eq(patch.status.to_string()),
                invoices::amount_due.eq(patch.amount_due),
                invoices::amount_paid.eq(patch.amount_paid),
                invoices::payment_intent_id.eq(patch.payment_intent_id),
                invoices::period_start.eq(patch.period_start),
                invoices::period_end.eq(patch.period_end),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
