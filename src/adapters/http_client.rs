use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tokio::time::timeout;
use tracing::Instrument;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

/// HTTP client adapter using Hyper with Rustls.
///
/// * Leaves the `Host` header to hyper, which derives it from the target URI
/// * Optionally bounds the wait for response headers
/// * Classifies failures into "backend unreachable" and "transport broke"
///
/// No retries. Dropping the returned future aborts the backend exchange.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
    response_timeout: Option<Duration>,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter. A zero `response_timeout` disables the limit.
    pub fn new(response_timeout: Duration) -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::info!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);

        let response_timeout = (!response_timeout.is_zero()).then_some(response_timeout);
        tracing::info!(?response_timeout, "Created backend HTTP client");

        Ok(Self {
            client,
            response_timeout,
        })
    }

    fn classify(err: hyper_util::client::legacy::Error) -> HttpClientError {
        if err.is_connect() {
            HttpClientError::Unavailable(err.to_string())
        } else {
            HttpClientError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
        if req.uri().host().is_none() {
            tracing::error!("Outgoing URI has no host: {}", req.uri());
            return Err(HttpClientError::InvalidRequest(
                "Outgoing URI has no host".to_string(),
            ));
        }

        let (mut parts, axum_body) = req.into_parts();
        parts.version = Version::HTTP_11;

        let span = tracing::info_span!(
            "backend_request",
            backend.uri = %parts.uri,
            http.method = %parts.method,
            http.status_code = tracing::field::Empty,
        );

        let pending = self.client.request(Request::from_parts(parts, axum_body));
        let response_timeout = self.response_timeout;

        async move {
            let result = match response_timeout {
                Some(limit) => match timeout(limit, pending).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::Span::current().record("http.status_code", 599u16);
                        tracing::error!("Backend did not respond within {:?}", limit);
                        return Err(HttpClientError::Timeout(limit));
                    }
                },
                None => pending.await,
            };

            match result {
                Ok(response) => {
                    tracing::Span::current().record("http.status_code", response.status().as_u16());

                    let (mut parts, hyper_body) = response.into_parts();

                    // The body is re-framed by the inbound server.
                    parts.headers.remove(header::TRANSFER_ENCODING);

                    Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
                }
                Err(e) => {
                    tracing::Span::current().record("http.status_code", 599u16);
                    tracing::error!("Error making request to backend: {:?}", e);
                    Err(Self::classify(e))
                }
            }
        }
        .instrument(span)
        .await
    }
}
