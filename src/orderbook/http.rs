//! Fusion+ REST client for quotes, order submission and secret release

use super::types::{
    OrderPayload, OrderStatus, Quote, ReadyFill, ReadyFills, SubmitAck, SwapParams,
};
use super::{OrderBook, QuoteOracle};
use crate::config::OrderBookConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::secrets::Secret;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client for the quoter and relayer APIs
pub struct FusionPlusClient {
    http: Client,
    base_url: String,
    api_version: String,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SecretSubmission<'a> {
    order_hash: &'a str,
    secret: String,
}

impl FusionPlusClient {
    pub fn new(config: &OrderBookConfig) -> CoordinatorResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CoordinatorError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// `{base}/fusion-plus/{service}/{version}/{path}`
    fn endpoint(&self, service: &str, path: &str) -> String {
        format!(
            "{}/fusion-plus/{}/{}/{}",
            self.base_url, service, self.api_version, path
        )
    }

    async fn checked(response: Response, operation: &str) -> CoordinatorResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!("{} failed with HTTP {}: {}", operation, status, body);
        Err(CoordinatorError::OrderBook(format!(
            "{} returned {}: {}",
            operation, status, body
        )))
    }

    fn transport(operation: &str, err: reqwest::Error) -> CoordinatorError {
        CoordinatorError::OrderBook(format!("{} request failed: {}", operation, err))
    }
}

#[async_trait]
impl QuoteOracle for FusionPlusClient {
    async fn get_quote(&self, params: &SwapParams) -> CoordinatorResult<Quote> {
        let response = self
            .http
            .post(self.endpoint("quoter", "quote/receive"))
            .bearer_auth(&self.api_key)
            .json(params)
            .send()
            .await
            .map_err(|e| Self::transport("quote", e))?;

        let quote: Quote = Self::checked(response, "quote")
            .await?
            .json()
            .await
            .map_err(|e| Self::transport("quote", e))?;

        debug!("Received quote {} with {} presets", quote.quote_id, quote.presets.len());
        Ok(quote)
    }
}

#[async_trait]
impl OrderBook for FusionPlusClient {
    async fn submit(&self, payload: &OrderPayload) -> CoordinatorResult<SubmitAck> {
        let response = self
            .http
            .post(self.endpoint("relayer", "submit"))
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| Self::transport("submit order", e))?;

        let status = response.status();
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(CoordinatorError::SubmissionRejected(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        Self::checked(response, "submit order")
            .await?
            .json()
            .await
            .map_err(|e| Self::transport("submit order", e))
    }

    async fn get_order_status(&self, order_hash: &str) -> CoordinatorResult<OrderStatus> {
        let response = self
            .http
            .get(self.endpoint("orders", &format!("order/status/{}", order_hash)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Self::transport("order status", e))?;

        Self::checked(response, "order status")
            .await?
            .json()
            .await
            .map_err(|e| Self::transport("order status", e))
    }

    async fn get_ready_to_accept_secret_fills(
        &self,
        order_hash: &str,
    ) -> CoordinatorResult<Vec<ReadyFill>> {
        let response = self
            .http
            .get(self.endpoint(
                "orders",
                &format!("order/ready-to-accept-secret-fills/{}", order_hash),
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Self::transport("ready fills", e))?;

        let ready: ReadyFills = Self::checked(response, "ready fills")
            .await?
            .json()
            .await
            .map_err(|e| Self::transport("ready fills", e))?;
        Ok(ready.fills)
    }

    async fn submit_secret(&self, order_hash: &str, secret: &Secret) -> CoordinatorResult<()> {
        let body = SecretSubmission {
            order_hash,
            secret: secret.expose_hex(),
        };

        let response = self
            .http
            .post(self.endpoint("relayer", "submit/secret"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport("submit secret", e))?;

        Self::checked(response, "submit secret").await?;
        Ok(())
    }
}
