use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::prices::PriceEntity;

#[automock]
#[async_trait]
pub trait PriceRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PriceEntity>>;

    async fn find_by_stripe_price_id(&self, stripe_price_id: &str)
    -> Result<Option<PriceEntity>>;

    async fn set_stripe_price_id(&self, id: Uuid, stripe_price_id: &str) -> Result<()>;
}
