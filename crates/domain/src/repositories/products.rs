use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::products::ProductEntity;

#[automock]
#[async_trait]
pub trait ProductRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ProductEntity>>;

    async fn set_stripe_product_id(&self, id: Uuid, stripe_product_id: &str) -> Result<()>;
}
