use crate::config::Settings;
use crate::error::TransportError;
use crate::models::{Method, RawResponse, RequestDescriptor, ResponseSummary};
use serde_json::Value;
use std::error::Error as _;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sends one request and returns the raw response. Implementations must not
/// interpret status codes or bodies.
pub trait Transport {
    fn send(
        &self,
        request: &RequestDescriptor,
    ) -> impl Future<Output = Result<RawResponse, TransportError>>;
}

impl<T: Transport> Transport for &T {
    fn send(
        &self,
        request: &RequestDescriptor,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> {
        (**self).send(request)
    }
}

/// Bodies larger than this are cut off; only a prefix is kept.
pub const DEFAULT_BODY_LIMIT: usize = 4 * 1024 * 1024;

pub struct HttpTransport {
    client: reqwest::Client,
    body_limit: usize,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("meetbot-probe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            body_limit: DEFAULT_BODY_LIMIT,
        })
    }

    #[must_use]
    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        let mut builder = builder.timeout(Duration::from_secs(request.timeout_secs));
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e, request))?;
        let status = response.status().as_u16();

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| classify_reqwest_error(&e, request))?
        {
            let room = self.body_limit - body.len();
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                tracing::warn!(
                    url = %request.url,
                    limit = self.body_limit,
                    "Response body truncated"
                );
                break;
            }
            body.extend_from_slice(&chunk);
        }
        let text = String::from_utf8_lossy(&body).into_owned();
        Ok(RawResponse { status, text })
    }
}

fn classify_reqwest_error(err: &reqwest::Error, request: &RequestDescriptor) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout(request.timeout_secs);
    }
    if err.is_builder() {
        return TransportError::InvalidUrl(request.url.clone());
    }

    // The interesting cause sits a few levels down (hyper-util -> io::Error).
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::ConnectionRefused
        {
            return TransportError::ConnectionRefused(request.url.clone());
        }
        let text = cause.to_string().to_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return TransportError::Dns(request.url.clone());
        }
        source = cause.source();
    }

    if err.is_connect() {
        return TransportError::Other(format!("Could not connect to {}: {err}", request.url));
    }
    TransportError::Other(err.to_string())
}

/// Wraps a [`Transport`] with the configured base URL, credentials and the
/// process-wide cancellation token. [`Client::call`] never fails: every
/// outcome is a [`ResponseSummary`].
pub struct Client<T> {
    transport: T,
    base_url: String,
    api_key: Option<String>,
    cancel: CancellationToken,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T, settings: &Settings, cancel: CancellationToken) -> Self {
        Self {
            transport,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            cancel,
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        timeout_secs: u64,
    ) -> ResponseSummary {
        self.execute(method, path, body, timeout_secs, Some(&self.cancel))
            .await
    }

    /// Like [`Client::call`] but not interrupted by the cancellation token,
    /// only by the timeout. Used to release a bot after an interrupt.
    pub async fn call_to_completion(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        timeout_secs: u64,
    ) -> ResponseSummary {
        self.execute(method, path, body, timeout_secs, None).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        timeout_secs: u64,
        cancel: Option<&CancellationToken>,
    ) -> ResponseSummary {
        let timeout_secs = timeout_secs.max(1);
        let request = RequestDescriptor {
            method,
            url: self.url_for(path),
            body,
            timeout_secs,
            bearer_token: self.api_key.clone(),
        };
        tracing::debug!(method = %request.method, url = %request.url, "Sending request");

        let bounded = async {
            tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                self.transport.send(&request),
            )
            .await
            .unwrap_or(Err(TransportError::Timeout(timeout_secs)))
        };
        let result = match cancel {
            Some(cancel) => tokio::select! {
                biased;
                () = cancel.cancelled() => Err(TransportError::Cancelled),
                result = bounded => result,
            },
            None => bounded.await,
        };

        match result {
            Ok(raw) => {
                tracing::debug!(status = raw.status, bytes = raw.text.len(), "Received response");
                ResponseSummary::from_raw(raw)
            }
            Err(err) => {
                tracing::info!(url = %request.url, "Request failed: {err}");
                ResponseSummary::from_transport_error(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Body;
    use crate::schema::WireSchema;
    use crate::testing::ScriptedTransport;
    use serde_json::json;

    fn settings(base_url: &str, api_key: Option<&str>) -> Settings {
        Settings {
            base_url: base_url.to_string(),
            schema: WireSchema::lookup("meeting-url").unwrap(),
            timeout_seconds: 5,
            api_key: api_key.map(str::to_string),
            raw: false,
        }
    }

    #[test]
    fn url_for_joins_with_single_slash() {
        let client = Client::new(
            ScriptedTransport::default(),
            &settings("http://localhost:3002/", None),
            CancellationToken::new(),
        );
        assert_eq!(client.url_for("/health"), "http://localhost:3002/health");
        assert_eq!(client.url_for("status"), "http://localhost:3002/status");
    }

    #[test]
    fn url_for_keeps_base_path_prefix() {
        let client = Client::new(
            ScriptedTransport::default(),
            &settings("http://18.141.229.165/api", None),
            CancellationToken::new(),
        );
        assert_eq!(
            client.url_for("/join-meeting"),
            "http://18.141.229.165/api/join-meeting"
        );
    }

    #[tokio::test]
    async fn call_builds_descriptor() {
        let transport = ScriptedTransport::with_json(200, json!({"success": true, "botId": "b1"}));
        let client = Client::new(
            &transport,
            &settings("http://localhost:3003", Some("secret")),
            CancellationToken::new(),
        );
        let body = json!({"meetingUrl": "https://meet.google.com/x"});
        let summary = client
            .call(Method::Post, "/join-meeting", Some(body.clone()), 7)
            .await;
        assert!(summary.success);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let sent = &requests[0];
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.url, "http://localhost:3003/join-meeting");
        assert_eq!(sent.body, Some(body));
        assert_eq!(sent.timeout_secs, 7);
        assert_eq!(sent.bearer_token.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn zero_timeout_is_clamped() {
        let transport = ScriptedTransport::with_json(200, json!({}));
        let client = Client::new(
            &transport,
            &settings("http://localhost:3002", None),
            CancellationToken::new(),
        );
        client.call(Method::Get, "/health", None, 0).await;
        assert_eq!(transport.requests()[0].timeout_secs, 1);
    }

    #[tokio::test]
    async fn transport_error_becomes_summary() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::ConnectionRefused(
            "http://localhost:3002/health".to_string(),
        ))]);
        let client = Client::new(
            &transport,
            &settings("http://localhost:3002", None),
            CancellationToken::new(),
        );
        let summary = client.call(Method::Get, "/health", None, 5).await;
        assert!(!summary.success);
        assert!(summary.status.is_none());
        assert!(summary.message.unwrap().contains("Connection refused"));
    }

    #[tokio::test]
    async fn text_body_is_kept_raw() {
        let transport = ScriptedTransport::with_text(200, "Server is running!");
        let client = Client::new(
            &transport,
            &settings("http://localhost:3002", None),
            CancellationToken::new(),
        );
        let summary = client.call(Method::Get, "/", None, 5).await;
        assert_eq!(summary.body, Body::Text("Server is running!".to_string()));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let transport = ScriptedTransport::with_json(200, json!({}));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let client = Client::new(&transport, &settings("http://localhost:3002", None), cancel);
        let summary = client.call(Method::Get, "/health", None, 5).await;
        assert_eq!(summary.transport_error, Some(TransportError::Cancelled));
    }

    #[tokio::test]
    async fn call_to_completion_ignores_cancellation() {
        let transport = ScriptedTransport::with_json(200, json!({"success": true}));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let client = Client::new(&transport, &settings("http://localhost:3002", None), cancel);
        let summary = client
            .call_to_completion(Method::Post, "/leave-meeting", None, 5)
            .await;
        assert!(summary.success);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn call_to_completion_still_times_out() {
        let transport = ScriptedTransport::hanging();
        let client = Client::new(
            &transport,
            &settings("http://localhost:3002", None),
            CancellationToken::new(),
        );
        let summary = client
            .call_to_completion(Method::Post, "/leave-meeting", None, 3)
            .await;
        assert_eq!(summary.transport_error, Some(TransportError::Timeout(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_transport_times_out() {
        let transport = ScriptedTransport::hanging();
        let client = Client::new(
            &transport,
            &settings("http://localhost:3002", None),
            CancellationToken::new(),
        );
        let summary = client.call(Method::Get, "/status", None, 2).await;
        assert_eq!(summary.transport_error, Some(TransportError::Timeout(2)));
    }
}
