//! HTTP client for the control API of a running `stackup up`.

use anyhow::{anyhow, Context, Result};
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use stackup_supervisor::api::ErrorResponse;
use stackup_supervisor::{ControlCommand, ProcessStatus};

pub struct ControlClient {
    base_url: String,
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl ControlClient {
    pub fn new(addr: &str) -> Self {
        Self {
            base_url: format!("http://{}/api/v1", addr),
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    pub async fn status_all(&self) -> Result<Vec<ProcessStatus>> {
        self.send(Method::GET, "/processes").await
    }

    pub async fn execute(&self, command: ControlCommand, name: &str) -> Result<ProcessStatus> {
        match command {
            ControlCommand::Status => self.send(Method::GET, &format!("/processes/{}", name)).await,
            command => {
                self.send(Method::POST, &format!("/processes/{}/{}", name, command))
                    .await
            }
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, method: Method, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let request = Request::builder()
            .method(method)
            .uri(&url)
            .header("User-Agent", concat!("stackup/", env!("CARGO_PKG_VERSION")))
            .body(Empty::<Bytes>::new())
            .with_context(|| format!("Failed to build request for {}", url))?;

        let response = self.client.request(request).await.with_context(|| {
            format!(
                "Cannot reach the control API at {} \
                 (is `stackup up` running with control.listen set?)",
                self.base_url
            )
        })?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .context("Failed to read response body")?
            .to_bytes();

        if status != StatusCode::OK {
            let message = serde_json::from_slice::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            return Err(anyhow!("{} ({})", message, status));
        }

        serde_json::from_slice(&body).context("Unexpected response from control API")
    }
}
