use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::error;
use uuid::Uuid;

use crate::gateway::{
    CreateSubscriptionRequest, GatewayError, GatewayResult, PaymentGateway, RemoteCustomer,
    RemotePrice, RemoteProduct, RemoteSubscription, SubscriptionChange,
};
use crate::webhook_events::StripeEvent;
use async_trait::async_trait;

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.stripe.com/v1";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Explicit credential set handed to the client at construction time.
/// There is deliberately no process-wide configuration.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
}

impl StripeConfig {
    pub fn new(secret_key: String, webhook_secret: String) -> Self {
        Self {
            secret_key,
            webhook_secret,
            webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
        }
    }
}

/// Minimal Stripe adapter built on reqwest. All requests are bounded by a
/// short client-wide timeout; a timeout surfaces as a transport error and
/// never mutates local state.
pub struct StripeClient {
    http: reqwest::Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
    param: Option<String>,
}

#[derive(Deserialize)]
struct IdResp {
    id: String,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("reqwest client must build");
        Self { http, config }
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &'static str,
    ) -> GatewayResult<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .or_else(|| resp.headers().get("stripe-request-id"))
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let details = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .map(|envelope| envelope.error)
            .ok();
        let (error_type, code, message, param) = match details {
            Some(details) => (details.type_, details.code, details.message, details.param),
            None => (None, None, None, None),
        };

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?error_type,
            stripe_error_code = ?code,
            stripe_error_param = ?param,
            stripe_error_message = ?message,
            context = %context,
            "stripe api request failed"
        );

        if status == reqwest::StatusCode::NOT_FOUND
            || code.as_deref() == Some("resource_missing")
        {
            return Err(GatewayError::NotFound);
        }

        Err(GatewayError::Api {
            context,
            status: status.as_u16(),
            code,
            message,
            request_id,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        context: &'static str,
    ) -> GatewayResult<T> {
        let resp = self
            .http
            .get(format!("{API_BASE}{path}"))
            .header(AUTHORIZATION, format!("Bearer {}", self.config.secret_key))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, context).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &[(String, String)],
        idempotency_key: Option<&str>,
        context: &'static str,
    ) -> GatewayResult<T> {
        let mut request = self
            .http
            .post(format!("{API_BASE}{path}"))
            .header(AUTHORIZATION, format!("Bearer {}", self.config.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(body);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        let resp = request.send().await?;
        let resp = Self::ensure_success(resp, context).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn delete_json<T: DeserializeOwned>(
        &self,
        path: &str,
        context: &'static str,
    ) -> GatewayResult<T> {
        let resp = self
            .http
            .delete(format!("{API_BASE}{path}"))
            .header(AUTHORIZATION, format!("Bearer {}", self.config.secret_key))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, context).await?;
        Ok(resp.json::<T>().await?)
    }

    /// Verifies the `t=...,v1=...` signature header against the raw payload
    /// and rejects payloads whose timestamp falls outside the configured
    /// tolerance. https://stripe.com/docs/webhooks/signatures
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> GatewayResult<StripeEvent> {
        let mut timestamp: Option<String> = None;
        let mut signature: Option<String> = None;

        for part in signature_header.split(',') {
            if let Some(rest) = part.strip_prefix("t=") {
                timestamp = Some(rest.to_string());
            } else if let Some(rest) = part.strip_prefix("v1=") {
                signature = Some(rest.to_string());
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            GatewayError::SignatureInvalid("missing timestamp in signature header".to_string())
        })?;
        let signature = signature.ok_or_else(|| {
            GatewayError::SignatureInvalid("missing v1 in signature header".to_string())
        })?;

        let timestamp_secs = timestamp.parse::<i64>().map_err(|_| {
            GatewayError::SignatureInvalid("malformed timestamp in signature header".to_string())
        })?;
        let age = (Utc::now().timestamp() - timestamp_secs).abs();
        if age > self.config.webhook_tolerance_secs {
            return Err(GatewayError::SignatureInvalid(format!(
                "timestamp outside tolerance ({age}s old)"
            )));
        }

        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(self.config.webhook_secret.as_bytes())
            .map_err(|err| GatewayError::SignatureInvalid(err.to_string()))?;
        mac.update(signed_payload.as_bytes());
        let expected = mac.finalize().into_bytes();
        let provided = hex::decode(&signature)
            .map_err(|_| GatewayError::SignatureInvalid("malformed v1 signature".to_string()))?;

        if expected[..] != provided[..] {
            return Err(GatewayError::SignatureInvalid(
                "signature mismatch".to_string(),
            ));
        }

        let event: StripeEvent = serde_json::from_slice(payload)?;
        Ok(event)
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_customer(
        &self,
        email: &str,
        name: &str,
        user_id: Uuid,
    ) -> GatewayResult<String> {
        // https://stripe.com/docs/api/customers/create
        let body = vec![
            ("email".to_string(), email.to_string()),
            ("name".to_string(), name.to_string()),
            ("metadata[user_id]".to_string(), user_id.to_string()),
        ];
        let parsed: IdResp = self
            .post_form("/customers", &body, None, "create customer")
            .await?;
        Ok(parsed.id)
    }

    async fn retrieve_customer(&self, stripe_customer_id: &str) -> GatewayResult<RemoteCustomer> {
        let customer: RemoteCustomer = self
            .get_json(
                &format!("/customers/{stripe_customer_id}"),
                "retrieve customer",
            )
            .await?;
        // Deleted customers still resolve; treat the tombstone as absent.
        if customer.deleted {
            return Err(GatewayError::NotFound);
        }
        Ok(customer)
    }

    async fn create_product<'a>(
        &self,
        name: &str,
        description: Option<&'a str>,
        product_id: Uuid,
    ) -> GatewayResult<String> {
        let mut body = vec![
            ("name".to_string(), name.to_string()),
            ("metadata[product_id]".to_string(), product_id.to_string()),
        ];
        if let Some(description) = description {
            body.push(("description".to_string(), description.to_string()));
        }
        let parsed: IdResp = self
            .post_form("/products", &body, None, "create product")
            .await?;
        Ok(parsed.id)
    }

    async fn retrieve_product(&self, stripe_product_id: &str) -> GatewayResult<RemoteProduct> {
        self.get_json(
            &format!("/products/{stripe_product_id}"),
            "retrieve product",
        )
        .await
    }

    async fn create_price(
        &self,
        stripe_product_id: &str,
        amount_minor: i64,
        currency: &str,
        interval: &str,
        interval_count: i32,
    ) -> GatewayResult<String> {
        // https://stripe.com/docs/api/prices/create
        let mut body = vec![
            ("product".to_string(), stripe_product_id.to_string()),
            ("unit_amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), currency.to_string()),
        ];
        if interval != "none" {
            body.push(("recurring[interval]".to_string(), interval.to_string()));
            body.push((
                "recurring[interval_count]".to_string(),
                interval_count.to_string(),
            ));
        }
        let parsed: IdResp = self.post_form("/prices", &body, None, "create price").await?;
        Ok(parsed.id)
    }

    async fn retrieve_price(&self, stripe_price_id: &str) -> GatewayResult<RemotePrice> {
        self.get_json(&format!("/prices/{stripe_price_id}"), "retrieve price")
            .await
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> GatewayResult<RemoteSubscription> {
        // https://stripe.com/docs/api/subscriptions/create
        let mut body = vec![
            ("customer".to_string(), request.customer),
            ("items[0][price]".to_string(), request.price),
            ("items[0][quantity]".to_string(), request.quantity.to_string()),
        ];
        if let Some(payment_method) = request.default_payment_method {
            body.push(("default_payment_method".to_string(), payment_method));
        }
        if let Some(trial_days) = request.trial_period_days {
            body.push(("trial_period_days".to_string(), trial_days.to_string()));
        }
        self.post_form(
            "/subscriptions",
            &body,
            Some(request.idempotency_key.as_str()),
            "create subscription",
        )
        .await
    }

    async fn cancel_subscription(
        &self,
        stripe_subscription_id: &str,
    ) -> GatewayResult<RemoteSubscription> {
        // https://stripe.com/docs/api/subscriptions/cancel
        self.delete_json(
            &format!("/subscriptions/{stripe_subscription_id}"),
            "cancel subscription",
        )
        .await
    }

    async fn cancel_at_period_end(
        &self,
        stripe_subscription_id: &str,
    ) -> GatewayResult<RemoteSubscription> {
        // https://stripe.com/docs/api/subscriptions/update#update_subscription-cancel_at_period_end
        let body = vec![("cancel_at_period_end".to_string(), "true".to_string())];
        self.post_form(
            &format!("/subscriptions/{stripe_subscription_id}"),
            &body,
            None,
            "schedule subscription cancellation",
        )
        .await
    }

    async fn update_subscription(
        &self,
        stripe_subscription_id: &str,
        change: SubscriptionChange,
    ) -> GatewayResult<RemoteSubscription> {
        // Item-level changes need the subscription item id.
        let current: RemoteSubscription = self
            .get_json(
                &format!("/subscriptions/{stripe_subscription_id}"),
                "retrieve subscription",
            )
            .await?;
        let item_id = current
            .items
            .data
            .first()
            .and_then(|item| item.id.clone())
            .ok_or(GatewayError::Api {
                context: "update subscription",
                status: 0,
                code: None,
                message: Some("subscription has no items".to_string()),
                request_id: None,
            })?;

        let mut body = vec![("items[0][id]".to_string(), item_id)];
        if let Some(quantity) = change.quantity {
            body.push(("items[0][quantity]".to_string(), quantity.to_string()));
        }
        if let Some(price) = change.price {
            body.push(("items[0][price]".to_string(), price));
        }
        self.post_form(
            &format!("/subscriptions/{stripe_subscription_id}"),
            &body,
            None,
            "update subscription",
        )
        .await
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        stripe_customer_id: &str,
    ) -> GatewayResult<()> {
        let body = vec![("customer".to_string(), stripe_customer_id.to_string())];
        let result: GatewayResult<serde_json::Value> = self
            .post_form(
                &format!("/payment_methods/{payment_method_id}/attach"),
                &body,
                None,
                "attach payment method",
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            // Re-attaching to the same customer reports an error we can
            // safely absorb.
            Err(GatewayError::Api { message, .. })
                if message
                    .as_deref()
                    .is_some_and(|m| m.contains("already been attached")) =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn verify_webhook(&self, payload: &[u8], signature_header: &str) -> GatewayResult<StripeEvent> {
        self.verify_webhook_signature(payload, signature_header)
    }
}
