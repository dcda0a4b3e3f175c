//! Per-cycle HTTP report transport.
//!
//! Reports are best-effort: delivery failures are logged by the caller
//! and never stall the phase clock. The pre-shared key travels in the
//! `T-Secret-Key` header.

use std::time::Duration;

use junction_common::config::JunctionConfig;
use junction_common::report::JunctionReport;
use thiserror::Error;
use tracing::debug;

const REPORT_TIMEOUT: Duration = Duration::from_secs(5);
const SECRET_HEADER: &str = "T-Secret-Key";

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("report request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("report rejected with status {0}")]
    Status(reqwest::StatusCode),
}

pub struct Reporter {
    client: reqwest::blocking::Client,
    endpoint: String,
    secret: String,
}

impl Reporter {
    pub fn from_config(config: &JunctionConfig) -> Result<Self, ReporterError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REPORT_TIMEOUT)
            .build()
            .map_err(ReporterError::Client)?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/api/junction/report",
                config.http_url.trim_end_matches('/')
            ),
            secret: config.t_secret_key.clone(),
        })
    }

    pub fn send_junction_report(&self, report: &JunctionReport) -> Result<(), ReporterError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(SECRET_HEADER, &self.secret)
            .json(report)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReporterError::Status(status));
        }
        debug!(endpoint = %self.endpoint, "cycle report delivered");
        Ok(())
    }
}
