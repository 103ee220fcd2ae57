use crate::config::mask_secret;
use crate::constants::NOTIFY_TIMEOUT_SECS;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of one delivery attempt. The endpoint is masked for display —
/// delivery targets are secrets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDelivery {
    pub endpoint: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of one notification. `attempted == 0` means no endpoints
/// were configured, which callers report as its own reason.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub deliveries: Vec<EndpointDelivery>,
}

impl PushReport {
    pub fn ok(&self) -> bool {
        self.succeeded > 0
    }
}

/// Dispatches a formatted message to each configured webhook endpoint.
pub struct Notifier {
    client: reqwest::Client,
}

impl Notifier {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    /// Deliver sequentially to every endpoint; one failure never aborts the
    /// remaining attempts.
    pub async fn notify(&self, title: &str, content: &str, endpoints: &[String]) -> PushReport {
        let mut report = PushReport::default();

        for endpoint in endpoints {
            report.attempted += 1;
            let masked = mask_secret(endpoint);

            let result = self
                .client
                .post(endpoint)
                .json(&json!({ "title": title, "content": content }))
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    report.succeeded += 1;
                    report.deliveries.push(EndpointDelivery {
                        endpoint: masked,
                        ok: true,
                        error: None,
                    });
                }
                Ok(response) => {
                    warn!(endpoint = %masked, status = %response.status(), "Notification rejected");
                    report.deliveries.push(EndpointDelivery {
                        endpoint: masked,
                        ok: false,
                        error: Some(format!("status {}", response.status())),
                    });
                }
                Err(e) => {
                    warn!(endpoint = %masked, error = %e, "Notification delivery failed");
                    report.deliveries.push(EndpointDelivery {
                        endpoint: masked,
                        ok: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        info!(
            title,
            attempted = report.attempted,
            succeeded = report.succeeded,
            "Notification dispatched"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_endpoint_list_is_distinct() {
        let report = PushReport::default();
        assert_eq!(report.attempted, 0);
        assert!(!report.ok());
    }
}
