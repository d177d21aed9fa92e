//! Client for the coordination endpoint: authenticated GET requests for
//! command polling and log submission.

use anyhow::{Context, Result};
use reqwest::Url;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::{Endpoint, Network};
use crate::hw::{Clock, DigitalOutput, HttpResponse, NetworkTransport};

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// `http://{host}:{port}{path}?psk={psk}&{action}={payload}`, with the query
/// values percent-encoded.
pub(crate) fn build_url(endpoint: &Endpoint, action: &str, payload: &str) -> Result<Url> {
    let base = format!("http://{}:{}{}", endpoint.host, endpoint.port, endpoint.path);
    let mut url = Url::parse(&base).with_context(|| format!("invalid endpoint url: {base}"))?;
    url.query_pairs_mut()
        .append_pair("psk", &endpoint.psk)
        .append_pair(action, payload);
    Ok(url)
}

// ---------------------------------------------------------------------------
// Remote client
// ---------------------------------------------------------------------------

pub(crate) struct RemoteClient<T, O> {
    pub(crate) transport: T,
    pub(crate) indicator: O,
    endpoint: Endpoint,
    connect_backoff_ms: u32,
}

impl<T: NetworkTransport, O: DigitalOutput> RemoteClient<T, O> {
    pub(crate) fn new(transport: T, indicator: O, endpoint: Endpoint, connect_backoff_ms: u32) -> Self {
        Self {
            transport,
            indicator,
            endpoint,
            connect_backoff_ms,
        }
    }

    /// Suspend until the link is up. No timeout: nothing useful can happen
    /// without the endpoint.
    pub(crate) async fn ensure_connected(&mut self, clock: &impl Clock) {
        let mut attempts: u32 = 0;
        while !self.transport.link_up().await {
            if attempts == 0 {
                warn!(host = %self.endpoint.host, "network link down, waiting");
            }
            attempts += 1;
            clock.sleep_ms(self.connect_backoff_ms).await;
        }
        if attempts > 0 {
            info!(attempts, "network link up");
        }
    }

    /// Send `action=payload` and return the response body. Any failure is
    /// logged locally and yields an empty string; there is no retry here.
    pub(crate) async fn request(&mut self, clock: &impl Clock, action: &str, payload: &str) -> String {
        let url = match build_url(&self.endpoint, action, payload) {
            Ok(url) => url,
            Err(e) => {
                warn!(action, "request not sent: {e:#}");
                return String::new();
            }
        };

        self.indicator.set(true);
        self.ensure_connected(clock).await;
        let result = self.transport.get(&url).await;
        self.indicator.set(false);

        match result {
            Ok(HttpResponse { status, body }) => {
                debug!(action, status, body_len = body.len(), "request done");
                body
            }
            Err(e) => {
                warn!(action, "request failed: {e:#}");
                String::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP transport (reqwest)
// ---------------------------------------------------------------------------

/// Plain-HTTP transport. The link is considered up when the host has a
/// local route to the endpoint address; whether the endpoint answers is
/// only learned from the request itself.
pub(crate) struct HttpTransport {
    client: reqwest::Client,
    host: String,
    port: u16,
    probe_timeout: Duration,
}

impl HttpTransport {
    pub(crate) fn new(endpoint: &Endpoint, network: &Network) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(u64::from(network.request_timeout_ms)))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            host: endpoint.host.clone(),
            port: endpoint.port,
            probe_timeout: Duration::from_millis(u64::from(network.probe_timeout_ms)),
        })
    }
}

impl NetworkTransport for HttpTransport {
    async fn link_up(&mut self) -> bool {
        let route = local_route(&self.host, self.port);
        match tokio::time::timeout(self.probe_timeout, route).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(host = %self.host, "no route to endpoint: {e}");
                false
            }
            Err(_) => false,
        }
    }

    async fn get(&mut self, url: &Url) -> Result<HttpResponse> {
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(HttpResponse { status, body })
    }
}

/// Resolve the endpoint and `connect` an unbound UDP socket to it. This only
/// asks the kernel to pick a route and source address; no packet is sent.
async fn local_route(host: &str, port: u16) -> io::Result<()> {
    let addr = tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host has no address"))?;
    let local: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(addr).await
}

// ===========================================================================
// Tests
// ===========================================================================
