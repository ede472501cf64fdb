use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::error;

use crate::error::ApiError;

const DEFAULT_BASE_URL: &str = "https://api.razorpay.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Razorpay order endpoint client. Key material is optional so the server
/// can boot without payment credentials; `/payments/config` reports the
/// state and order creation rejects until both keys are present.
#[derive(Clone)]
pub struct RazorpayClient {
    key_id: Option<String>,
    key_secret: Option<String>,
    base_url: String,
    http: Client,
}

/// Order minted by the processor.
#[derive(Debug, Deserialize)]
pub struct ProcessorOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    #[serde(default)]
    pub notes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ProcessorErrorBody {
    error: ProcessorErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProcessorErrorDetail {
    description: String,
}

impl RazorpayClient {
    pub fn from_env() -> anyhow::Result<Self> {
        let key_id = first_env(&["RAZORPAY_KEY_ID"]);
        let key_secret = first_env(&["RAZORPAY_KEY_SECRET"]);
        let base_url =
            first_env(&["RAZORPAY_BASE_URL"]).unwrap_or_else(|| DEFAULT_BASE_URL.into());
        Ok(Self::new(key_id, key_secret, base_url)?)
    }

    pub fn new(
        key_id: Option<String>,
        key_secret: Option<String>,
        base_url: String,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent("autocare-backend")
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            key_id,
            key_secret,
            base_url,
            http,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.key_id.is_some() && self.key_secret.is_some()
    }

    /// Public key identifier the client needs to render its payment widget.
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Server-side signing secret used for verification.
    pub fn key_secret(&self) -> Option<&str> {
        self.key_secret.as_deref()
    }

    /// Mint an order with the processor. Amount is in integer minor units.
    pub async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<ProcessorOrder, ApiError> {
        let (key_id, key_secret) = match (&self.key_id, &self.key_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => {
                return Err(ApiError::Config(
                    "Razorpay keys are not configured. Please set RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET".into(),
                ))
            }
        };

        let url = format!("{}/v1/orders", self.base_url);
        let body = serde_json::json!({
            "amount": amount,
            "currency": currency,
            "receipt": receipt,
        });

        let response = self
            .http
            .post(&url)
            .basic_auth(key_id, Some(key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|err| ApiError::Upstream(format!("Failed to reach payment processor: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ApiError::Upstream(format!("Failed to read processor response: {err}")))?;

        if !status.is_success() {
            error!("processor order creation failed: status={status}, body={text}");
            if let Ok(parsed) = serde_json::from_str::<ProcessorErrorBody>(&text) {
                return Err(ApiError::Upstream(parsed.error.description));
            }
            return Err(ApiError::Upstream("Failed to create payment order".into()));
        }

        serde_json::from_str(&text)
            .map_err(|err| ApiError::Upstream(format!("Unexpected processor response: {err}")))
    }
}

fn first_env(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(val) = std::env::var(key) {
            if !val.trim().is_empty() {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: String) -> RazorpayClient {
        RazorpayClient::new(
            Some("rzp_test_key".into()),
            Some("rzp_test_secret".into()),
            base_url,
        )
        .expect("client")
    }

    #[tokio::test]
    async fn create_order_round_trips_the_processor_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .and(body_partial_json(serde_json::json!({
                "amount": 50000,
                "currency": "INR",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "order_abc",
                "amount": 50000,
                "currency": "INR",
                "receipt": "rcpt_1",
                "status": "created",
            })))
            .mount(&server)
            .await;

        let order = client(server.uri())
            .create_order(50000, "INR", "rcpt_1")
            .await
            .expect("order");
        assert_eq!(order.id, "order_abc");
        assert_eq!(order.amount, 50000);
        assert_eq!(order.currency, "INR");
        assert_eq!(order.receipt.as_deref(), Some("rcpt_1"));
    }

    #[tokio::test]
    async fn processor_error_surfaces_as_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "code": "BAD_REQUEST_ERROR", "description": "amount exceeds maximum" }
            })))
            .mount(&server)
            .await;

        let err = client(server.uri())
            .create_order(1, "INR", "rcpt_1")
            .await
            .expect_err("must fail");
        match err {
            ApiError::Upstream(msg) => assert_eq!(msg, "amount exceeds maximum"),
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_keys_reject_before_any_network_call() {
        let client = RazorpayClient::new(None, None, "http://127.0.0.1:1".into()).expect("client");
        assert!(!client.is_configured());
        let err = client
            .create_order(100, "INR", "rcpt")
            .await
            .expect_err("must fail");
        assert!(matches!(err, ApiError::Config(_)));
    }
}
