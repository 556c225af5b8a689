use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::AppError;

/// Envelope returned by the payment gateway for every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub status: bool,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl GatewayResponse {
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }

    pub fn data_i64(&self, key: &str) -> Option<i64> {
        self.data.as_ref()?.get(key)?.as_i64()
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// `amount_minor` is in minor currency units.
    async fn initialize_transaction(
        &self,
        email: &str,
        amount_minor: i64,
        reference: &str,
    ) -> Result<GatewayResponse, AppError>;

    async fn verify_transaction(&self, reference: &str) -> Result<GatewayResponse, AppError>;
}

#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    secret_key: String,
    currency: String,
}

impl HttpPaymentGateway {
    pub fn new(client: Client, base_url: String, secret_key: String, currency: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
            currency,
        }
    }

    async fn decode(response: reqwest::Response) -> Result<GatewayResponse, AppError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| AppError::RemoteCallFailed(format!("payment gateway read failed: {err}")))?;

        // Error responses carry the same envelope, so decode before looking at the status.
        serde_json::from_str::<GatewayResponse>(&body).map_err(|err| {
            warn!(http_status = %status, error = %err, "undecodable payment gateway response");
            AppError::RemoteCallFailed(format!("payment gateway returned {status}"))
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initialize_transaction(
        &self,
        email: &str,
        amount_minor: i64,
        reference: &str,
    ) -> Result<GatewayResponse, AppError> {
        let url = format!("{}/transaction/initialize", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&json!({
                "email": email,
                "amount": amount_minor,
                "reference": reference,
                "currency": self.currency,
            }))
            .send()
            .await
            .map_err(|err| {
                AppError::RemoteCallFailed(format!("payment gateway unreachable: {err}"))
            })?;

        Self::decode(response).await
    }

    async fn verify_transaction(&self, reference: &str) -> Result<GatewayResponse, AppError> {
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|err| {
                AppError::RemoteCallFailed(format!("payment gateway unreachable: {err}"))
            })?;

        Self::decode(response).await
    }
}
