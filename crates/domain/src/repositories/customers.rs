use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::customers::CustomerEntity;

#[automock]
#[async_trait]
pub trait CustomerRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<CustomerEntity>>;

    async fn find_by_stripe_customer_id(
        &self,
        stripe_customer_id: &str,
    ) -> Result<Option<CustomerEntity>>;

    async fn set_stripe_customer_id(&self, id: Uuid, stripe_customer_id: &str) -> Result<()>;
}
