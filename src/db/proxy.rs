//! SOCKS5 tunnelling for database connections.
//!
//! sqlx dials its own TCP sockets, so a proxied client gets a loopback
//! forwarder instead: the pool connects to `127.0.0.1:<port>` and every
//! accepted socket is relayed through the SOCKS5 proxy to the real server.
//! The forwarder belongs to one client and stops with it.

use crate::error::{DbError, DbResult};
use percent_encoding::percent_decode_str;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::copy_bidirectional;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_socks::tcp::Socks5Stream;
use tracing::{debug, info, warn};
use url::Url;

/// A validated `socks5://[user:pass@]host:port` proxy address.
#[derive(Clone, PartialEq, Eq)]
pub struct Socks5Proxy {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
}

impl Socks5Proxy {
    /// Default SOCKS port when the address has none.
    pub const DEFAULT_PORT: u16 = 1080;

    /// Parse a proxy URL. Only the `socks5` scheme is accepted.
    pub fn parse(address: &str) -> DbResult<Self> {
        let url = Url::parse(address)
            .map_err(|e| DbError::config(format!("Invalid proxy address '{}': {}", address, e)))?;

        if !url.scheme().eq_ignore_ascii_case("socks5") {
            return Err(DbError::config(format!(
                "Unsupported proxy scheme '{}': only socks5 is supported",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DbError::config("Proxy address has no host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let credentials = if url.username().is_empty() {
            None
        } else {
            let user = percent_decode(url.username())?;
            let pass = url.password().map(percent_decode).transpose()?.unwrap_or_default();
            Some((user, pass))
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(Self::DEFAULT_PORT),
            credentials,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Open a tunnelled connection to `target_host:target_port`.
    pub async fn connect(&self, target_host: &str, target_port: u16) -> DbResult<TcpStream> {
        let proxy = (self.host.as_str(), self.port);
        let target = (target_host, target_port);

        let stream = match &self.credentials {
            Some((user, pass)) => {
                Socks5Stream::connect_with_password(proxy, target, user, pass).await
            }
            None => Socks5Stream::connect(proxy, target).await,
        }
        .map_err(|e| {
            DbError::connect(
                format!("SOCKS5 connect to {}:{} failed: {}", target_host, target_port, e),
                "Check that the proxy is reachable and allows the database address",
            )
        })?;

        Ok(stream.into_inner())
    }
}

/// Credentials are never printed.
impl std::fmt::Debug for Socks5Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socks5Proxy")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("authenticated", &self.credentials.is_some())
            .finish()
    }
}

/// URL userinfo is percent-encoded only; `+` stays literal.
fn percent_decode(s: &str) -> DbResult<String> {
    percent_decode_str(s)
        .decode_utf8()
        .map(|v| v.into_owned())
        .map_err(|e| DbError::config(format!("Proxy credentials are not valid UTF-8: {}", e)))
}

/// Loopback forwarder relaying connections through a SOCKS5 proxy.
#[derive(Debug)]
pub struct ProxyTunnel {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl ProxyTunnel {
    /// Bind a loopback listener and start relaying to `target_host:target_port`.
    pub async fn start(proxy: Socks5Proxy, target_host: String, target_port: u16) -> DbResult<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| DbError::config(format!("Failed to bind proxy forwarder: {}", e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DbError::config(format!("Failed to bind proxy forwarder: {}", e)))?;

        info!(
            local = %local_addr,
            proxy_host = %proxy.host(),
            proxy_port = proxy.port(),
            target = %format!("{}:{}", target_host, target_port),
            "Started SOCKS5 forwarder"
        );

        let accept_task = tokio::spawn(accept_loop(listener, proxy, target_host, target_port));
        Ok(Self {
            local_addr,
            accept_task,
        })
    }

    /// Address the pool should dial instead of the database.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections. Relays already running finish with
    /// their sockets.
    pub fn stop(&self) {
        if !self.accept_task.is_finished() {
            debug!(local = %self.local_addr, "Stopping SOCKS5 forwarder");
            self.accept_task.abort();
        }
    }
}

impl Drop for ProxyTunnel {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

async fn accept_loop(listener: TcpListener, proxy: Socks5Proxy, target_host: String, target_port: u16) {
    loop {
        let (mut inbound, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "SOCKS5 forwarder accept failed");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };

        let proxy = proxy.clone();
        let target_host = target_host.clone();
        tokio::spawn(async move {
            let mut outbound = match proxy.connect(&target_host, target_port).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "SOCKS5 tunnel setup failed");
                    return;
                }
            };

            match copy_bidirectional(&mut inbound, &mut outbound).await {
                Ok((up, down)) => {
                    debug!(peer = %peer, bytes_up = up, bytes_down = down, "SOCKS5 relay closed")
                }
                Err(e) => debug!(peer = %peer, error = %e, "SOCKS5 relay ended with error"),
            }
        });
    }
}
