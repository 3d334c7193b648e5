pub mod health;
pub mod http;
pub mod json;
pub mod log;

use anyhow::Result;

use crate::config::PublishersConfig;
use crate::sensor::Report;

use self::http::HttpPublisher;
use self::log::LogPublisher;

/// Publisher dispatches sensor reports to the log or an HTTP endpoint.
///
/// Enum dispatch keeps `publish` a plain async fn without boxing.
pub enum Publisher {
    Log(LogPublisher),
    Http(HttpPublisher),
}

impl Publisher {
    /// Builds the publishers enabled in the configuration.
    pub fn from_config(cfg: &PublishersConfig) -> Vec<Self> {
        let mut publishers = Vec::with_capacity(2);
        if cfg.log {
            publishers.push(Self::Log(LogPublisher::new()));
        }
        if cfg.http.enabled {
            publishers.push(Self::Http(HttpPublisher::new(cfg.http.clone())));
        }
        publishers
    }

    /// Returns the publisher name for logging.
    pub fn name(&self) -> &str {
        match self {
            Self::Log(p) => p.name(),
            Self::Http(p) => p.name(),
        }
    }

    /// Initialize the publisher.
    pub async fn start(&mut self) -> Result<()> {
        match self {
            Self::Log(p) => p.start().await,
            Self::Http(p) => p.start().await,
        }
    }

    /// Publish one report.
    pub async fn publish(&self, report: &Report) -> Result<()> {
        match self {
            Self::Log(p) => p.publish(report).await,
            Self::Http(p) => p.publish(report).await,
        }
    }

    /// Shut down the publisher.
    pub async fn stop(&self) -> Result<()> {
        match self {
            Self::Log(p) => p.stop().await,
            Self::Http(p) => p.stop().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut cfg = PublishersConfig::default();
        let names: Vec<String> = Publisher::from_config(&cfg)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["log"]);

        cfg.log = false;
        cfg.http.enabled = true;
        cfg.http.address = "http://localhost:8123/report".to_string();
        let names: Vec<String> = Publisher::from_config(&cfg)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["http"]);
    }
}
