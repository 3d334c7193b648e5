use anyhow::{bail, Context, Result};

use crate::config::HttpPublisherConfig;
use crate::sensor::Report;

use super::json::ReportJson;

/// POSTs every report as a JSON document.
///
/// One request per report; the configured timeout bounds how long a
/// sensor's tick task waits on a slow endpoint.
pub struct HttpPublisher {
    cfg: HttpPublisherConfig,
    client: Option<reqwest::Client>,
}

impl HttpPublisher {
    /// Creates a new HTTP publisher with the given configuration.
    pub fn new(cfg: HttpPublisherConfig) -> Self {
        Self { cfg, client: None }
    }

    pub fn name(&self) -> &str {
        "http"
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.cfg.address.is_empty() {
            bail!("http address is required");
        }

        let client = reqwest::Client::builder()
            .timeout(self.cfg.timeout)
            .build()
            .context("building HTTP client")?;
        self.client = Some(client);

        tracing::info!(
            address = %self.cfg.address,
            timeout = ?self.cfg.timeout,
            "HTTP publisher started",
        );

        Ok(())
    }

    pub async fn publish(&self, report: &Report) -> Result<()> {
        let Some(client) = &self.client else {
            bail!("HTTP publisher not started");
        };

        let body = ReportJson::from(report);
        let mut request = client.post(&self.cfg.address).json(&body);

        for (k, v) in &self.cfg.headers {
            request = request.header(k.as_str(), v.as_str());
        }

        let resp = request
            .send()
            .await
            .with_context(|| format!("sending report for {}", report.sensor()))?;

        let status = resp.status();
        // Drain body for connection reuse.
        let _ = resp.bytes().await;

        if !status.is_success() {
            bail!("HTTP publish unexpected status: {status}");
        }

        tracing::debug!(sensor = report.sensor(), %status, "published report via HTTP");

        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        Ok(())
    }
}
