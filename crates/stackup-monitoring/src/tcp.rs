//! TCP connect health check.

use crate::{HealthCheckError, HealthCheckResult, HealthOutcome};
use tokio::net::TcpStream;
use tracing::debug;

/// Healthy when a connection to `address` is accepted.
pub async fn check_tcp(address: &str) -> HealthCheckResult<HealthOutcome> {
    match TcpStream::connect(address).await {
        Ok(_) => {
            debug!("TCP health check connected: {}", address);
            Ok(HealthOutcome::Healthy)
        }
        Err(e) => Err(HealthCheckError::ConnectionFailed {
            target: format!("tcp {}", address),
            reason: e.to_string(),
        }),
    }
}
