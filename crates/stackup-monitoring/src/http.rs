// HTTP health check implementation

use crate::{HealthCheckError, HealthCheckResult, HealthOutcome};
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

/// Perform one HTTP GET against `url`.
///
/// Returns `Ok(Healthy)` when the status is in `expected_status` and, if set,
/// the body contains `body_contains`; `Ok(Unhealthy)` when the server answered
/// otherwise; `Err` when no answer could be obtained. The caller bounds the
/// duration.
pub async fn check_http(
    url: &str,
    expected_status: &[u16],
    body_contains: Option<&str>,
) -> HealthCheckResult<HealthOutcome> {
    let target = format!("http {}", url);

    let uri: Uri = url.parse().map_err(|e| HealthCheckError::InvalidTarget {
        target: target.clone(),
        reason: format!("Invalid URI: {}", e),
    })?;

    let client = Client::builder(TokioExecutor::new()).build_http();

    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("User-Agent", concat!("stackup/", env!("CARGO_PKG_VERSION")))
        .body(Empty::<Bytes>::new())
        .map_err(|e| HealthCheckError::InvalidTarget {
            target: target.clone(),
            reason: format!("Failed to build request: {}", e),
        })?;

    let response = client
        .request(request)
        .await
        .map_err(|e| HealthCheckError::ConnectionFailed {
            target: target.clone(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !expected_status.contains(&status.as_u16()) {
        debug!("HTTP health check {} returned unexpected status {}", url, status);
        return Ok(HealthOutcome::Unhealthy(format!(
            "unexpected status code {}",
            status.as_u16()
        )));
    }

    if let Some(expected) = body_contains {
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| HealthCheckError::ConnectionFailed {
                target: target.clone(),
                reason: format!("Failed to read body: {}", e),
            })?
            .to_bytes();

        if !String::from_utf8_lossy(&body).contains(expected) {
            debug!("HTTP health check body mismatch: {} (expected '{}')", url, expected);
            return Ok(HealthOutcome::Unhealthy(format!(
                "body does not contain '{}'",
                expected
            )));
        }
    }

    debug!("HTTP health check complete: {} - status={}", url, status);
    Ok(HealthOutcome::Healthy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves a single canned response to every connection.
    async fn serve(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/health", addr)
    }

    #[tokio::test]
    async fn test_expected_status_and_body() {
        let url = serve("200 OK", "{\"status\":\"ok\"}").await;
        let outcome = check_http(&url, &[200], Some("\"ok\"")).await.unwrap();
        assert_eq!(outcome, HealthOutcome::Healthy);

        let outcome = check_http(&url, &[200], Some("ready")).await.unwrap();
        assert!(matches!(outcome, HealthOutcome::Unhealthy(_)));
    }

    #[tokio::test]
    async fn test_unexpected_status_is_unhealthy() {
        let url = serve("503 Service Unavailable", "starting").await;
        let outcome = check_http(&url, &[200, 204], None).await.unwrap();
        assert_eq!(
            outcome,
            HealthOutcome::Unhealthy("unexpected status code 503".to_string())
        );
    }

    #[tokio::test]
    async fn test_unreachable_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = check_http(&format!("http://{}/health", addr), &[200], None).await;
        assert!(matches!(result, Err(HealthCheckError::ConnectionFailed { .. })));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let result = check_http("not a url", &[200], None).await;
        assert!(matches!(result, Err(HealthCheckError::InvalidTarget { .. })));
    }
}
