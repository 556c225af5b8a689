use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::AppError;

pub const SUCCESS_CODE: &str = "000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillsResponse {
    pub code: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub response_description: Option<String>,
}

impl BillsResponse {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    pub fn description(&self) -> Option<String> {
        if let Some(description) = &self.response_description {
            return Some(description.clone());
        }
        ["response_description", "error", "errors"]
            .iter()
            .find_map(|key| self.content.get(*key))
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
    }

    /// Maps a non-success code to `RemoteCallFailed`.
    pub fn into_result(self) -> Result<Value, AppError> {
        if self.is_success() {
            return Ok(self.content);
        }

        let detail = self
            .description()
            .map(|text| format!(": {text}"))
            .unwrap_or_default();
        Err(AppError::RemoteCallFailed(format!(
            "bills aggregator returned code {}{detail}",
            self.code
        )))
    }
}

#[async_trait]
pub trait BillsAggregator: Send + Sync {
    async fn purchase_airtime(
        &self,
        service_id: &str,
        phone: &str,
        amount: i64,
        request_id: &str,
    ) -> Result<BillsResponse, AppError>;

    async fn purchase_data(
        &self,
        service_id: &str,
        phone: &str,
        variation_code: &str,
        request_id: &str,
    ) -> Result<BillsResponse, AppError>;

    async fn verify_smart_card(
        &self,
        card_number: &str,
        service_id: &str,
    ) -> Result<BillsResponse, AppError>;

    async fn pay_electricity(
        &self,
        meter_number: &str,
        service_id: &str,
        amount: i64,
        phone: &str,
        request_id: &str,
    ) -> Result<BillsResponse, AppError>;
}

#[derive(Clone)]
pub struct HttpBillsAggregator {
    client: Client,
    base_url: String,
    api_key: String,
    public_key: String,
}

impl HttpBillsAggregator {
    pub fn new(client: Client, base_url: String, api_key: String, public_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            public_key,
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<BillsResponse, AppError> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.api_key)
            .header("public-key", &self.public_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                AppError::RemoteCallFailed(format!("bills aggregator unreachable: {err}"))
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|err| {
            AppError::RemoteCallFailed(format!("bills aggregator read failed: {err}"))
        })?;

        serde_json::from_str::<BillsResponse>(&text).map_err(|err| {
            warn!(http_status = %status, error = %err, "undecodable bills aggregator response");
            AppError::RemoteCallFailed(format!("bills aggregator returned {status}"))
        })
    }
}

#[async_trait]
impl BillsAggregator for HttpBillsAggregator {
    async fn purchase_airtime(
        &self,
        service_id: &str,
        phone: &str,
        amount: i64,
        request_id: &str,
    ) -> Result<BillsResponse, AppError> {
        self.post(
            "pay",
            json!({
                "request_id": request_id,
                "serviceID": service_id,
                "amount": amount,
                "phone": phone,
            }),
        )
        .await
    }

    async fn purchase_data(
        &self,
        service_id: &str,
        phone: &str,
        variation_code: &str,
        request_id: &str,
    ) -> Result<BillsResponse, AppError> {
        self.post(
            "pay",
            json!({
                "request_id": request_id,
                "serviceID": service_id,
                "billersCode": phone,
                "variation_code": variation_code,
                "phone": phone,
            }),
        )
        .await
    }

    async fn verify_smart_card(
        &self,
        card_number: &str,
        service_id: &str,
    ) -> Result<BillsResponse, AppError> {
        self.post(
            "merchant-verify",
            json!({
                "billersCode": card_number,
                "serviceID": service_id,
            }),
        )
        .await
    }

    async fn pay_electricity(
        &self,
        meter_number: &str,
        service_id: &str,
        amount: i64,
        phone: &str,
        request_id: &str,
    ) -> Result<BillsResponse, AppError> {
        self.post(
            "pay",
            json!({
                "request_id": request_id,
                "serviceID": service_id,
                "billersCode": meter_number,
                "amount": amount,
                "phone": phone,
            }),
        )
        .await
    }
}
