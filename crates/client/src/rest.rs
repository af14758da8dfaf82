use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mthub_core::*;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Configuration for the REST backend client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    /// Base URL of the backend (e.g. "https://hub.example.com").
    pub base_url: String,
    /// Per-request timeout in seconds. The loader joins three requests,
    /// so without this the batch would wait on the slowest endpoint
    /// indefinitely.
    pub timeout_secs: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Standard response envelope used by every data endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<ErrorBody>,
    #[serde(default)]
    #[allow(dead_code)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[allow(dead_code)]
    code: i64,
    message: String,
}

/// The login endpoint answers with its own flat shape, not the envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginBody {
    success: bool,
    token: Option<String>,
    message: Option<String>,
    account_info: Option<AccountInfo>,
}

/// REST implementation of [`AccountApi`].
pub struct RestClient {
    config: RestConfig,
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(config: RestConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Issue an authorized GET and unwrap the response envelope.
    ///
    /// The status line is inspected before the body: a 401/403 means the
    /// credential was rejected regardless of what the body says.
    async fn get_data<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(%url, "GET");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(ApiError::AuthExpired),
            status if !status.is_success() => {
                return Err(ApiError::Transport(format!("HTTP {status} from {url}")));
            }
            _ => {}
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))?;

        match envelope {
            Envelope {
                success: true,
                data: Some(data),
                ..
            } => Ok(data),
            Envelope { error: Some(e), .. } => Err(ApiError::MalformedResponse(e.message)),
            _ => Err(ApiError::MalformedResponse(format!(
                "missing data field in response from {url}"
            ))),
        }
    }
}

#[async_trait]
impl AccountApi for RestClient {
    async fn login(&self, request: &LoginRequest) -> Result<LoginOk, ApiError> {
        let url = self.url("/api/auth/login");
        debug!(%url, account = %request.account_number, "POST login");

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::LoginRejected("invalid credentials".to_string()));
        }
        if !response.status().is_success() {
            return Err(ApiError::Transport(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        let body: LoginBody = response
            .json()
            .await
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))?;

        match body {
            LoginBody {
                success: true,
                token: Some(token),
                account_info: Some(account_info),
                ..
            } => Ok(LoginOk {
                token,
                account_info,
            }),
            LoginBody { message, .. } => Err(ApiError::LoginRejected(
                message.unwrap_or_else(|| "login failed".to_string()),
            )),
        }
    }

    async fn account_info(&self, token: &str) -> Result<AccountSnapshot, ApiError> {
        self.get_data("/api/account/info", token, &[]).await
    }

    async fn open_positions(&self, token: &str) -> Result<Vec<Position>, ApiError> {
        self.get_data("/api/positions", token, &[]).await
    }

    async fn closed_trades(
        &self,
        token: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HistoryTrade>, ApiError> {
        self.get_data(
            "/api/history/trades",
            token,
            &[
                ("from_date", from.to_rfc3339()),
                ("to_date", to.to_rfc3339()),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_positions_envelope() {
        let body = r#"{
            "success": true,
            "data": [{
                "ticket": 123456,
                "symbol": "XAUUSD",
                "type": "BUY",
                "volume": 0.10,
                "openPrice": 2025.50,
                "currentPrice": 2028.75,
                "profit": 32.50,
                "swap": -5.20,
                "commission": -10.00,
                "openTime": "2024-01-15T10:30:00Z"
            }],
            "timestamp": "2024-01-15T10:35:00Z"
        }"#;

        let envelope: Envelope<Vec<Position>> = serde_json::from_str(body).expect("decode");
        assert!(envelope.success);
        let positions = envelope.data.expect("data");
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].ticket, 123456);
        assert_eq!(positions[0].side, Side::Buy);
        assert_eq!(positions[0].volume, dec!(0.10));
        assert_eq!(positions[0].open_price, dec!(2025.50));
        assert_eq!(positions[0].stop_loss, None);
    }

    #[test]
    fn test_decode_account_envelope() {
        let body = r#"{
            "success": true,
            "data": {
                "balance": 10000.00,
                "equity": 10250.50,
                "margin": 1500.00,
                "freeMargin": 8750.50,
                "marginLevel": 683.37,
                "profit": 250.50,
                "currency": "USD"
            },
            "timestamp": "2024-01-15T10:35:00Z"
        }"#;

        let envelope: Envelope<AccountSnapshot> = serde_json::from_str(body).expect("decode");
        let account = envelope.data.expect("data");
        assert_eq!(account.free_margin, dec!(8750.50));
        assert!(account.margin_level_is_safe());
    }

    #[test]
    fn test_decode_error_envelope() {
        let body = r#"{
            "success": false,
            "data": null,
            "error": { "code": 500, "message": "terminal offline" },
            "timestamp": "2024-01-15T10:35:00Z"
        }"#;

        let envelope: Envelope<AccountSnapshot> = serde_json::from_str(body).expect("decode");
        assert!(!envelope.success);
        assert_eq!(envelope.error.expect("error").message, "terminal offline");
    }
}
