//! Payment gateway abstraction. Production talks to Stripe's PaymentIntents
//! API; tests plug in a fake through the same trait.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Context attached to a payment intent so the dashboard can attribute it.
#[derive(Debug, Clone)]
pub struct IntentMetadata {
    pub user_id: Uuid,
    pub buy_now: bool,
}

/// A created intent; the client secret goes back to the storefront so the
/// browser can confirm the payment.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent for `amount_minor_units` of `currency`.
    async fn create_intent(
        &self,
        amount_minor_units: i64,
        currency: &str,
        metadata: &IntentMetadata,
    ) -> Result<PaymentIntent, ServiceError>;
}

/// Stripe-backed gateway. `api_base` is overridable so tests can point it at
/// a local stub.
pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: String, api_base: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            api_base,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeIntentResponse {
    id: String,
    client_secret: String,
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self), fields(amount_minor_units, currency))]
    async fn create_intent(
        &self,
        amount_minor_units: i64,
        currency: &str,
        metadata: &IntentMetadata,
    ) -> Result<PaymentIntent, ServiceError> {
        let params = [
            ("amount", amount_minor_units.to_string()),
            ("currency", currency.to_string()),
            ("metadata[user_id]", metadata.user_id.to_string()),
            ("metadata[buy_now]", metadata.buy_now.to_string()),
        ];

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentGateway(format!("stripe unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, %body, "stripe rejected payment intent");
            return Err(ServiceError::PaymentGateway(format!(
                "stripe returned {status}"
            )));
        }

        let intent: StripeIntentResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::PaymentGateway(format!("invalid stripe response: {e}")))?;

        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }
}

/// Placeholder used when no Stripe key is configured. Card checkout still
/// needs an intent, so it fails loudly instead of panicking at startup.
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_intent(
        &self,
        _amount_minor_units: i64,
        _currency: &str,
        _metadata: &IntentMetadata,
    ) -> Result<PaymentIntent, ServiceError> {
        Err(ServiceError::PaymentGateway(
            "payment gateway is not configured".to_string(),
        ))
    }
}
