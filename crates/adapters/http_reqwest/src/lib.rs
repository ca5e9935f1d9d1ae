//! # cadence-adapter-http-reqwest
//!
//! Outbound HTTP adapter implementing the `ActionInvoker` port of
//! `cadence-app` with [reqwest](https://docs.rs/reqwest).
//!
//! Every action invocation is a JSON `POST`. Any 2xx response counts as
//! success; other statuses carry the response body back in the error so it
//! lands in the execution log. Only the first [`MAX_ERROR_BODY`] bytes of
//! that body are read.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};

use cadence_app::ports::ActionInvoker;
use cadence_domain::error::{ActionInvocationError, CadenceError};

/// Longest error response body kept for the execution log, in bytes.
pub const MAX_ERROR_BODY: usize = 4096;

/// Errors raised while setting up the HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("failed to build HTTP client")]
    Build(#[source] reqwest::Error),
}

/// Configuration for [`ReqwestActionInvoker`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Total time allowed for one invocation, body included.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            user_agent: concat!("cadence/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Build the invoker.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Build`] if the TLS backend cannot be initialised.
    pub fn build(self) -> Result<ReqwestActionInvoker, InvokeError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent)
            .build()
            .map_err(InvokeError::Build)?;
        Ok(ReqwestActionInvoker { client })
    }
}

/// [`ActionInvoker`] posting JSON bodies with a shared connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestActionInvoker {
    client: Client,
}

impl ActionInvoker for ReqwestActionInvoker {
    async fn invoke(&self, url: &str, body: &str) -> Result<(), CadenceError> {
        tracing::debug!(url, "invoking action");

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|err| ActionInvocationError::Transport {
                url: url.to_string(),
                source: Box::new(err),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = error_body(response).await;
        Err(ActionInvocationError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        }
        .into())
    }
}

async fn error_body(mut response: Response) -> String {
    let mut bytes = Vec::new();
    while bytes.len() < MAX_ERROR_BODY {
        match response.chunk().await {
            Ok(Some(chunk)) => bytes.extend_from_slice(&chunk),
            Ok(None) | Err(_) => break,
        }
    }
    bytes.truncate(MAX_ERROR_BODY);
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoker() -> ReqwestActionInvoker {
        Config {
            timeout: Duration::from_secs(5),
            ..Config::default()
        }
        .build()
        .unwrap()
    }

    #[tokio::test]
    async fn should_post_json_body_to_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hooks/report")
            .match_header("content-type", "application/json")
            .match_body(r#"{"automation":{"name":"report"}}"#)
            .with_status(204)
            .create_async()
            .await;

        let url = format!("{}/hooks/report", server.url());
        invoker()
            .invoke(&url, r#"{"automation":{"name":"report"}}"#)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn should_report_status_and_body_when_endpoint_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hooks/report")
            .with_status(500)
            .with_body(r#"{"error":"boom"}"#)
            .create_async()
            .await;

        let url = format!("{}/hooks/report", server.url());
        let result = invoker().invoke(&url, "{}").await;

        match result {
            Err(CadenceError::ActionInvocation(ActionInvocationError::Status { status, body, .. })) => {
                assert_eq!(status, 500);
                assert_eq!(body, r#"{"error":"boom"}"#);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn should_truncate_large_error_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hooks/report")
            .with_status(502)
            .with_body("x".repeat(MAX_ERROR_BODY * 4))
            .create_async()
            .await;

        let url = format!("{}/hooks/report", server.url());
        let result = invoker().invoke(&url, "{}").await;

        match result {
            Err(CadenceError::ActionInvocation(ActionInvocationError::Status { status, body, .. })) => {
                assert_eq!(status, 502);
                assert_eq!(body.len(), MAX_ERROR_BODY);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn should_treat_client_error_as_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hooks/missing")
            .with_status(404)
            .create_async()
            .await;

        let url = format!("{}/hooks/missing", server.url());
        let result = invoker().invoke(&url, "{}").await;

        assert!(matches!(
            result,
            Err(CadenceError::ActionInvocation(ActionInvocationError::Status { status: 404, .. }))
        ));
    }

    #[tokio::test]
    async fn should_report_transport_error_when_endpoint_unreachable() {
        // Port 9 (discard) is not listening on the test host.
        let result = invoker().invoke("http://127.0.0.1:9/hooks", "{}").await;

        assert!(matches!(
            result,
            Err(CadenceError::ActionInvocation(ActionInvocationError::Transport { .. }))
        ));
    }
}
