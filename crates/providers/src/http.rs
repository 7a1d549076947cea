use crate::{config::IntakeConfig, dispatch::DispatchRequest, transport::{Transport, UpstreamBody}};
use futures::StreamExt;
use intake_core::error::IntakeError;
use reqwest::{Client, Response, StatusCode};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const DETAIL_LIMIT: usize = 512;

#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    timeout: Duration,
}

impl HttpTransport {
    /// `timeout` bounds connecting and waiting for response headers, never
    /// the body: streams may legitimately run for minutes.
    pub fn new(timeout: Duration, proxy: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .connect_timeout(timeout);
        if let Some(p) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(p)?);
        }
        let http = builder.build()?;
        Ok(Self { http, timeout })
    }

    pub fn from_config(cfg: &IntakeConfig) -> anyhow::Result<Self> {
        Self::new(cfg.timeout, cfg.proxy.as_deref())
    }
}

impl Transport for HttpTransport {
    async fn open(
        &self,
        request: &DispatchRequest,
        cancel: &CancellationToken,
    ) -> Result<UpstreamBody, IntakeError> {
        let mut builder = self.http.post(&request.url).body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        debug!(target: "providers::http", url = %request.url, "opening upstream");

        let deadline = Instant::now() + self.timeout;
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IntakeError::Canceled),
            sent = tokio::time::timeout_at(deadline, builder.send()) => match sent {
                Ok(r) => r.map_err(map_reqwest_err)?,
                Err(_) => {
                    return Err(IntakeError::connect(format!(
                        "timeout: no response within {} ms",
                        self.timeout.as_millis()
                    )))
                }
            },
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(IntakeError::Canceled),
                body = error_body(resp, deadline) => body,
            };
            error!(target: "providers::http", "upstream non-200 status={} body={:?}", status, body);
            return Err(map_status_err(status, body));
        }
        debug!(target: "providers::http", status = %resp.status(), "upstream streaming");

        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| IntakeError::Read(format!("body read failed: {e}"))));
        Ok(UpstreamBody::new(stream))
    }
}

/// At most `DETAIL_LIMIT` bytes of an error response, read before `deadline`.
/// A body that stalls or fails yields no detail.
async fn error_body(resp: Response, deadline: Instant) -> Option<String> {
    let mut chunks = resp.bytes_stream();
    let mut body = Vec::new();
    let read = async {
        while let Some(chunk) = chunks.next().await {
            body.extend_from_slice(&chunk.ok()?);
            if body.len() > DETAIL_LIMIT {
                break;
            }
        }
        Some(())
    };
    let outcome = tokio::time::timeout_at(deadline, read).await;
    match outcome {
        Ok(Some(())) => Some(String::from_utf8_lossy(&body).into_owned()),
        Ok(None) => None,
        Err(_) => {
            debug!(target: "providers::http", read = body.len(), "error body not received in time");
            None
        }
    }
}

fn map_reqwest_err(e: reqwest::Error) -> IntakeError {
    if e.is_timeout() {
        IntakeError::connect(format!("timeout: {e}"))
    } else if e.is_connect() || e.is_request() {
        IntakeError::connect(format!("network: {e}"))
    } else {
        IntakeError::connect(format!("request failed: {e}"))
    }
}

fn map_status_err(status: StatusCode, body: Option<String>) -> IntakeError {
    let message = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "authentication rejected",
        StatusCode::TOO_MANY_REQUESTS => "rate limited",
        StatusCode::NOT_FOUND => "endpoint not found",
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => "upstream unavailable",
        _ => "unexpected upstream status",
    };
    IntakeError::Connect {
        message: message.to_string(),
        status: Some(status.as_u16()),
        detail: body.map(|b| truncate(b.trim(), DETAIL_LIMIT)),
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_are_classified_with_detail() {
        let e = map_status_err(StatusCode::UNAUTHORIZED, Some(" bad key \n".into()));
        assert_eq!(e.to_string(), "authentication rejected");
        assert_eq!(e.upstream_detail().as_deref(), Some("status 401: bad key"));

        let e = map_status_err(StatusCode::SERVICE_UNAVAILABLE, None);
        assert_eq!(e.to_string(), "upstream unavailable");
        assert_eq!(e.upstream_detail().as_deref(), Some("status 503"));
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundaries() {
        let body = "é".repeat(600);
        let t = truncate(&body, 513);
        assert!(t.ends_with('…'));
        assert_eq!(t.chars().count(), 257);
    }
}
