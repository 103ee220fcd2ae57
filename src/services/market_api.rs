use crate::config::AppConfig;
use crate::constants::{FETCH_TIMEOUT_SECS, LISTING_PAGE_SIZE};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error as ThisError;
use tracing::debug;

/// Errors from one catalog fetch. `Unsuccessful` and `NoListings` mean the
/// upstream answered but had nothing usable — a no-op for the collector, not
/// a collection error. Everything else counts as a collection error.
#[derive(ThisError, Debug)]
pub enum MarketApiError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("unexpected status: {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Parse(reqwest::Error),

    #[error("upstream reported failure")]
    Unsuccessful,

    #[error("no listings returned")]
    NoListings,
}

impl MarketApiError {
    /// True for network/timeout/parse failures — the error-alert path.
    /// False for an upstream "nothing for sale" answer.
    pub fn is_collection_error(&self) -> bool {
        !matches!(self, MarketApiError::Unsuccessful | MarketApiError::NoListings)
    }
}

/// One marketplace listing as the catalog reports it. Fields beyond price
/// and stock are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct SaleListing {
    #[serde(rename = "keyPrice")]
    pub key_price: f64,
    #[serde(default)]
    pub stock: i64,
}

#[derive(Debug, Deserialize)]
struct SalePage {
    #[serde(default)]
    content: Vec<SaleListing>,
}

#[derive(Debug, Deserialize)]
struct SaleListResponse {
    #[serde(default)]
    success: bool,
    result: Option<SalePage>,
}

/// Read-only client for the external key marketplace catalog.
pub struct MarketClient {
    client: reqwest::Client,
}

impl MarketClient {
    pub fn new() -> Result<Self, MarketApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(MarketApiError::Http)?;
        Ok(Self { client })
    }

    /// Fetch one page of current listings for a game, ascending by price.
    /// Host, path and token come from the config snapshot so live config
    /// changes apply on the next fetch.
    pub async fn fetch_listings(
        &self,
        config: &AppConfig,
        game_id: &str,
    ) -> Result<Vec<SaleListing>, MarketApiError> {
        let url = format!("https://{}{}", config.api_host, config.api_path);
        debug!(game_id, url = %url, "Fetching listings");

        let page_size = LISTING_PAGE_SIZE.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("gameId", game_id),
                ("pageNumber", "1"),
                ("pageSize", page_size.as_str()),
                ("sort", "keyPrice"),
                ("order", "asc"),
            ])
            .header("User-Agent", "APPAPK")
            .header("accessToken", &config.access_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MarketApiError::Timeout
                } else {
                    MarketApiError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MarketApiError::Status(status.as_u16()));
        }

        let body: SaleListResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                MarketApiError::Timeout
            } else {
                MarketApiError::Parse(e)
            }
        })?;

        if !body.success {
            return Err(MarketApiError::Unsuccessful);
        }

        let listings = body.result.map(|page| page.content).unwrap_or_default();
        if listings.is_empty() {
            return Err(MarketApiError::NoListings);
        }

        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "success": true,
            "result": {
                "content": [
                    {"keyPrice": 12.5, "stock": 3, "seller": "a"},
                    {"keyPrice": 9.9, "stock": 1}
                ]
            }
        }"#;
        let parsed: SaleListResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.success);
        let listings = parsed.result.unwrap().content;
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].key_price, 12.5);
        assert_eq!(listings[1].stock, 1);
    }

    #[test]
    fn test_empty_result_is_not_collection_error() {
        let raw = r#"{"success": true, "result": {"content": []}}"#;
        let parsed: SaleListResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.result.unwrap().content.is_empty());
        assert!(!MarketApiError::NoListings.is_collection_error());
        assert!(!MarketApiError::Unsuccessful.is_collection_error());
        assert!(MarketApiError::Timeout.is_collection_error());
        assert!(MarketApiError::Status(502).is_collection_error());
    }

    #[test]
    fn test_unsuccessful_response() {
        let raw = r#"{"success": false}"#;
        let parsed: SaleListResponse = serde_json::from_str(raw).unwrap();
        assert!(!parsed.success);
        assert!(parsed.result.is_none());
    }
}
