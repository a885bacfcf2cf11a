// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::uri::Scheme;
use http::{Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::{ConfigBuilderExt, HttpsConnector};
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::{ClientConfig, RootCertStore};
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service, ServiceBuilder};

/// Transport used by the collector exporter: one request in, the fully read
/// response out
pub type CollectorService = BoxCloneSyncService<Request<Full<Bytes>>, Response<Bytes>, BoxError>;

#[derive(Debug)]
pub struct ConnectError;
impl Display for ConnectError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unable to connect")
    }
}
impl Error for ConnectError {}

/// System roots are only loaded when `tls` is set. A plain `http://`
/// collector gets an empty root store and never performs a handshake.
fn client_config(tls: bool) -> Result<ClientConfig, BoxError> {
    let builder = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?;

    let config = if tls {
        builder.with_native_roots()?.with_no_client_auth()
    } else {
        builder
            .with_root_certificates(RootCertStore::empty())
            .with_no_client_auth()
    };

    Ok(config)
}

fn build_hyper_client(
    tls: bool,
) -> Result<HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>, BoxError> {
    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(client_config(tls)?)
        .https_or_http()
        .enable_http1()
        .build();

    let client = HyperClient::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(10)
        .timer(TokioTimer::new())
        .build::<_, Full<Bytes>>(https);

    Ok(client)
}

/// Hyper client that buffers the whole response body
#[derive(Clone)]
pub struct HttpClient {
    inner: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HttpClient {
    /// Client for `endpoint`, loading system roots for `https` only
    pub fn build(endpoint: &Uri) -> Result<Self, BoxError> {
        let tls = endpoint.scheme() == Some(&Scheme::HTTPS);
        Ok(Self {
            inner: build_hyper_client(tls)?,
        })
    }

    async fn perform_request(&self, req: Request<Full<Bytes>>) -> Result<Response<Bytes>, BoxError> {
        let resp = match self.inner.request(req).await {
            Ok(resp) => resp,
            Err(e) if e.is_connect() => return Err(ConnectError.into()),
            Err(e) => return Err(e.into()),
        };

        let (head, body) = resp.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| format!("failed reading response: {}", e))?
            .to_bytes();

        Ok(Response::from_parts(head, body))
    }
}

impl Service<Request<Full<Bytes>>> for HttpClient {
    type Response = Response<Bytes>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        let this = self.clone();

        Box::pin(async move { this.perform_request(req).await })
    }
}

/// HTTP transport to `endpoint` with a per-request deadline
pub fn build_service(endpoint: &str, timeout: Duration) -> Result<CollectorService, BoxError> {
    let endpoint: Uri = endpoint
        .parse()
        .map_err(|e| format!("invalid collector endpoint {}: {}", endpoint, e))?;
    let client = HttpClient::build(&endpoint)?;
    let service = ServiceBuilder::new().timeout(timeout).service(client);

    Ok(BoxCloneSyncService::new(service))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_http_needs_no_root_certificates() {
        let config = client_config(false).unwrap();
        assert!(config.alpn_protocols.is_empty());
    }

    #[tokio::test]
    async fn test_build_service_for_plain_http() {
        assert!(build_service("http://127.0.0.1:8080/sync_data", Duration::from_secs(1)).is_ok());
        assert!(build_service("not a uri", Duration::from_secs(1)).is_err());
    }
}
