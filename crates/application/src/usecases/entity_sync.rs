use std::sync::Arc;

use domain::entities::prices::PriceEntity;
use domain::repositories::customers::CustomerRepository;
use domain::repositories::prices::PriceRepository;
use domain::repositories::products::ProductRepository;
use domain::value_objects::enums::billing_intervals::BillingInterval;
use payments::gateway::{GatewayError, PaymentGateway, RemotePrice};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

const REMOTE_CUSTOMER_PREFIX: &str = "cus_";
const REMOTE_PRODUCT_PREFIX: &str = "prod_";
const REMOTE_PRICE_PREFIX: &str = "price_";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("local {0} does not exist")]
    UnknownLocal(&'static str),
    #[error("payment processor call failed: {0}")]
    Remote(#[from] GatewayError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Ensures a local catalog entity has a live remote counterpart before any
/// call that references it. Cached remote ids are verified first; a stale
/// or malformed id falls through to recreation and the fresh id is written
/// back, so divergence between the stores heals itself on the next sync.
pub struct EntitySyncUseCase<C, P, Pr, G>
where
    C: CustomerRepository + Send + Sync + 'static,
    P: ProductRepository + Send + Sync + 'static,
    Pr: PriceRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    customer_repo: Arc<C>,
    product_repo: Arc<P>,
    price_repo: Arc<Pr>,
    gateway: Arc<G>,
}

impl<C, P, Pr, G> EntitySyncUseCase<C, P, Pr, G>
where
    C: CustomerRepository + Send + Sync + 'static,
    P: ProductRepository + Send + Sync + 'static,
    Pr: PriceRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    pub fn new(
        customer_repo: Arc<C>,
        product_repo: Arc<P>,
        price_repo: Arc<Pr>,
        gateway: Arc<G>,
    ) -> Self {
        Self {
            customer_repo,
            product_repo,
            price_repo,
            gateway,
        }
    }

    pub async fn sync_customer(&self, user_id: Uuid) -> SyncResult<String> {
        let customer = self
            .customer_repo
            .find_by_id(user_id)
            .await?
            .ok_or(SyncError::UnknownLocal("customer"))?;

        if let Some(remote_id) = customer.stripe_customer_id.as_deref() {
            if remote_id.starts_with(REMOTE_CUSTOMER_PREFIX) {
                match self.gateway.retrieve_customer(remote_id).await {
                    Ok(_) => {
                        debug!(
                            %user_id,
                            remote_customer_id = remote_id,
                            "cached remote customer is live"
                        );
                        return Ok(remote_id.to_string());
                    }
                    Err(GatewayError::NotFound) => {
                        warn!(
                            %user_id,
                            remote_customer_id = remote_id,
                            "cached remote customer no longer resolves; recreating"
                        );
                    }
                    Err(err) => return Err(err.into()),
                }
            } else {
                warn!(
                    %user_id,
                    remote_customer_id = remote_id,
                    "cached remote customer id has unexpected shape; recreating"
                );
            }
        }

        let remote_id = self
            .gateway
            .create_customer(&customer.email, &customer.name, customer.id)
            .await?;
        self.customer_repo
            .set_stripe_customer_id(customer.id, &remote_id)
            .await?;
        info!(%user_id, remote_customer_id = %remote_id, "created remote customer");
        Ok(remote_id)
    }

    pub async fn sync_product(&self, product_id: Uuid) -> SyncResult<String> {
        let product = self
            .product_repo
            .find_by_id(product_id)
            .await?
            .ok_or(SyncError::UnknownLocal("product"))?;

        if let Some(remote_id) = product.stripe_product_id.as_deref() {
            if remote_id.starts_with(REMOTE_PRODUCT_PREFIX) {
                match self.gateway.retrieve_product(remote_id).await {
                    Ok(_) => {
                        debug!(
                            %product_id,
                            remote_product_id = remote_id,
                            "cached remote product is live"
                        );
                        return Ok(remote_id.to_string());
                    }
                    Err(GatewayError::NotFound) => {
                        warn!(
                            %product_id,
                            remote_product_id = remote_id,
                            "cached remote product no longer resolves; recreating"
                        );
                    }
                    Err(err) => return Err(err.into()),
                }
            } else {
                warn!(
                    %product_id,
                    remote_product_id = remote_id,
                    "cached remote product id has unexpected shape; recreating"
                );
            }
        }

        let remote_id = self
            .gateway
            .create_product(&product.name, product.description.as_deref(), product.id)
            .await?;
        self.product_repo
            .set_stripe_product_id(product.id, &remote_id)
            .await?;
        info!(%product_id, remote_product_id = %remote_id, "created remote product");
        Ok(remote_id)
    }

    /// Resolves the owning product first, then runs the same
    /// verify-then-recreate pass on the price itself. A live remote price
    /// whose amount/currency/interval no longer match the local row is
    /// superseded by a freshly minted one, since remote prices are
    /// immutable.
    pub async fn sync_price(&self, price_id: Uuid) -> SyncResult<String> {
        let price = self
            .price_repo
            .find_by_id(price_id)
            .await?
            .ok_or(SyncError::UnknownLocal("price"))?;

        let remote_product_id = self.sync_product(price.product_id).await?;

        if let Some(remote_id) = price.stripe_price_id.as_deref() {
            if remote_id.starts_with(REMOTE_PRICE_PREFIX) {
                match self.gateway.retrieve_price(remote_id).await {
                    Ok(remote) => {
                        if remote_price_matches(&remote, &price) {
                            debug!(
                                %price_id,
                                remote_price_id = remote_id,
                                "cached remote price is live"
                            );
                            return Ok(remote_id.to_string());
                        }
                        info!(
                            %price_id,
                            remote_price_id = remote_id,
                            "local price diverged from immutable remote price; superseding"
                        );
                    }
                    Err(GatewayError::NotFound) => {
                        warn!(
                            %price_id,
                            remote_price_id = remote_id,
                            "cached remote price no longer resolves; recreating"
                        );
                    }
                    Err(err) => return Err(err.into()),
                }
            } else {
                warn!(
                    %price_id,
                    remote_price_id = remote_id,
                    "cached remote price id has unexpected shape; recreating"
                );
            }
        }

        let interval = BillingInterval::from_str(&price.interval);
        let remote_id = self
            .gateway
            .create_price(
                &remote_product_id,
                price.amount_minor,
                &price.currency,
                &interval.to_string(),
                price.interval_count,
            )
            .await?;
        self.price_repo
            .set_stripe_price_id(price.id, &remote_id)
            .await?;
        info!(%price_id, remote_price_id = %remote_id, "created remote price");
        Ok(remote_id)
    }
}

fn remote_price_matches(remote: &RemotePrice, local: &PriceEntity) -> bool {
    let interval = BillingInterval::from_str(&local.interval);
    let amount_ok = remote.unit_amount == Some(local.amount_minor);
    let currency_ok = remote.currency.as_deref() == Some(local.currency.as_str());
    let interval_ok = match &remote.recurring {
        Some(recurring) => {
            interval.is_recurring()
                && recurring.interval == interval.to_string()
                && recurring.interval_count.unwrap_or(1) == i64::from(local.interval_count)
        }
        None => !interval.is_recurring(),
    };
    amount_ok && currency_ok && interval_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::entities::customers::CustomerEntity;
    use domain::entities::prices::PriceEntity;
    use domain::entities::products::ProductEntity;
    use domain::repositories::customers::MockCustomerRepository;
    use domain::repositories::prices::MockPriceRepository;
    use domain::repositories::products::MockProductRepository;
    use payments::gateway::{MockPaymentGateway, RemoteCustomer, RemoteRecurrence};

    fn customer(remote_id: Option<&str>) -> CustomerEntity {
        CustomerEntity {
            id: Uuid::new_v4(),
            email: "jo@example.com".to_string(),
            name: "Jo".to_string(),
            stripe_customer_id: remote_id.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    fn product(remote_id: Option<&str>) -> ProductEntity {
        ProductEntity {
            id: Uuid::new_v4(),
            name: "Plan".to_string(),
            description: None,
            is_active: true,
            stripe_product_id: remote_id.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    fn price(product_id: Uuid, remote_id: Option<&str>) -> PriceEntity {
        PriceEntity {
            id: Uuid::new_v4(),
            product_id,
            amount_minor: 2000,
            currency: "usd".to_string(),
            interval: "month".to_string(),
            interval_count: 1,
            trial_period_days: None,
            is_active: true,
            stripe_price_id: remote_id.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    fn remote_customer(id: &str) -> RemoteCustomer {
        RemoteCustomer {
            id: id.to_string(),
            email: Some("jo@example.com".to_string()),
            deleted: false,
        }
    }

    fn usecase(
        customers: MockCustomerRepository,
        products: MockProductRepository,
        prices: MockPriceRepository,
        gateway: MockPaymentGateway,
    ) -> EntitySyncUseCase<
        MockCustomerRepository,
        MockProductRepository,
        MockPriceRepository,
        MockPaymentGateway,
    > {
        EntitySyncUseCase::new(
            Arc::new(customers),
            Arc::new(products),
            Arc::new(prices),
            Arc::new(gateway),
        )
    }

    #[tokio::test]
    async fn live_remote_customer_is_reused_without_creation() {
        let existing = customer(Some("cus_live"));
        let user_id = existing.id;

        let mut customers = MockCustomerRepository::new();
        let entity = existing.clone();
        customers
            .expect_find_by_id()
            .times(2)
            .returning(move |_| Ok(Some(entity.clone())));
        customers.expect_set_stripe_customer_id().never();

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_retrieve_customer()
            .withf(|id| id == "cus_live")
            .times(2)
            .returning(|id| Ok(remote_customer(id)));
        gateway.expect_create_customer().never();

        let sync = usecase(
            customers,
            MockProductRepository::new(),
            MockPriceRepository::new(),
            gateway,
        );

        assert_eq!(sync.sync_customer(user_id).await.unwrap(), "cus_live");
        assert_eq!(sync.sync_customer(user_id).await.unwrap(), "cus_live");
    }

    #[tokio::test]
    async fn stale_remote_customer_is_recreated_once() {
        let existing = customer(Some("cus_gone"));
        let user_id = existing.id;

        let mut customers = MockCustomerRepository::new();
        let entity = existing.clone();
        customers
            .expect_find_by_id()
            .returning(move |_| Ok(Some(entity.clone())));
        customers
            .expect_set_stripe_customer_id()
            .withf(move |id, remote| *id == user_id && remote == "cus_new")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_retrieve_customer()
            .returning(|_| Err(GatewayError::NotFound));
        gateway
            .expect_create_customer()
            .times(1)
            .returning(|_, _, _| Ok("cus_new".to_string()));

        let sync = usecase(
            customers,
            MockProductRepository::new(),
            MockPriceRepository::new(),
            gateway,
        );

        assert_eq!(sync.sync_customer(user_id).await.unwrap(), "cus_new");
    }

    #[tokio::test]
    async fn malformed_cached_id_skips_liveness_check() {
        let existing = customer(Some("price_wrong_shape"));
        let user_id = existing.id;

        let mut customers = MockCustomerRepository::new();
        let entity = existing.clone();
        customers
            .expect_find_by_id()
            .returning(move |_| Ok(Some(entity.clone())));
        customers
            .expect_set_stripe_customer_id()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_retrieve_customer().never();
        gateway
            .expect_create_customer()
            .times(1)
            .returning(|_, _, _| Ok("cus_fresh".to_string()));

        let sync = usecase(
            customers,
            MockProductRepository::new(),
            MockPriceRepository::new(),
            gateway,
        );

        assert_eq!(sync.sync_customer(user_id).await.unwrap(), "cus_fresh");
    }

    #[tokio::test]
    async fn unknown_local_customer_is_rejected() {
        let mut customers = MockCustomerRepository::new();
        customers.expect_find_by_id().returning(|_| Ok(None));

        let sync = usecase(
            customers,
            MockProductRepository::new(),
            MockPriceRepository::new(),
            MockPaymentGateway::new(),
        );

        let err = sync.sync_customer(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownLocal("customer")));
    }

    #[tokio::test]
    async fn price_sync_materializes_product_first() {
        let owning_product = product(None);
        let local_price = price(owning_product.id, None);
        let price_id = local_price.id;

        let mut products = MockProductRepository::new();
        let product_entity = owning_product.clone();
        products
            .expect_find_by_id()
            .returning(move |_| Ok(Some(product_entity.clone())));
        products
            .expect_set_stripe_product_id()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut prices = MockPriceRepository::new();
        let price_entity = local_price.clone();
        prices
            .expect_find_by_id()
            .returning(move |_| Ok(Some(price_entity.clone())));
        prices
            .expect_set_stripe_price_id()
            .withf(move |id, remote| *id == price_id && remote == "price_new")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_product()
            .times(1)
            .returning(|_, _, _| Ok("prod_new".to_string()));
        gateway
            .expect_create_price()
            .withf(|product, amount, currency, interval, count| {
                product == "prod_new"
                    && *amount == 2000
                    && currency == "usd"
                    && interval == "month"
                    && *count == 1
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok("price_new".to_string()));

        let sync = usecase(MockCustomerRepository::new(), products, prices, gateway);

        assert_eq!(sync.sync_price(price_id).await.unwrap(), "price_new");
    }

    #[tokio::test]
    async fn diverged_remote_price_is_superseded() {
        let owning_product = product(Some("prod_live"));
        let local_price = price(owning_product.id, Some("price_old"));
        let price_id = local_price.id;

        let mut products = MockProductRepository::new();
        let product_entity = owning_product.clone();
        products
            .expect_find_by_id()
            .returning(move |_| Ok(Some(product_entity.clone())));

        let mut prices = MockPriceRepository::new();
        let price_entity = local_price.clone();
        prices
            .expect_find_by_id()
            .returning(move |_| Ok(Some(price_entity.clone())));
        prices
            .expect_set_stripe_price_id()
            .withf(move |id, remote| *id == price_id && remote == "price_super")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_retrieve_product().returning(|id| {
            Ok(payments::gateway::RemoteProduct {
                id: id.to_string(),
                name: None,
                active: true,
            })
        });
        // Amount no longer matches the local row.
        gateway.expect_retrieve_price().returning(|id| {
            Ok(RemotePrice {
                id: id.to_string(),
                unit_amount: Some(1500),
                currency: Some("usd".to_string()),
                product: Some("prod_live".to_string()),
                recurring: Some(RemoteRecurrence {
                    interval: "month".to_string(),
                    interval_count: Some(1),
                }),
            })
        });
        gateway
            .expect_create_price()
            .times(1)
            .returning(|_, _, _, _, _| Ok("price_super".to_string()));

        let sync = usecase(MockCustomerRepository::new(), products, prices, gateway);

        assert_eq!(sync.sync_price(price_id).await.unwrap(), "price_super");
    }

    #[tokio::test]
    async fn gateway_outage_propagates_without_writes() {
        let existing = customer(Some("cus_live"));
        let user_id = existing.id;

        let mut customers = MockCustomerRepository::new();
        let entity = existing.clone();
        customers
            .expect_find_by_id()
            .returning(move |_| Ok(Some(entity.clone())));
        customers.expect_set_stripe_customer_id().never();

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_retrieve_customer().returning(|_| {
            Err(GatewayError::Api {
                context: "retrieve customer",
                status: 500,
                code: None,
                message: None,
                request_id: None,
            })
        });
        gateway.expect_create_customer().never();

        let sync = usecase(
            customers,
            MockProductRepository::new(),
            MockPriceRepository::new(),
            gateway,
        );

        let err = sync.sync_customer(user_id).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(_)));
    }
}
