//! Connection pool construction.
//!
//! Builds the sqlx `MySqlPool` for a client from its [`ClientOptions`],
//! routing connections through a SOCKS5 forwarder when a proxy is configured,
//! and verifies the server is reachable before handing the pool out.

use crate::config::{ClientOptions, DEFAULT_MIN_CONNECTIONS};
use crate::context::Ctx;
use crate::db::proxy::{ProxyTunnel, Socks5Proxy};
use crate::error::{DbError, DbResult};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{Connection, MySqlPool};
use tracing::{debug, info, warn};

/// A connected pool plus the forwarder it dials through, if any.
#[derive(Debug)]
pub struct ConnectedPool {
    pub pool: MySqlPool,
    pub tunnel: Option<ProxyTunnel>,
}

/// Pool settings derived from client options.
///
/// The lifetime limit doubles as the idle timeout, and max idle equals max
/// open, so the pool only shrinks as connections age out.
pub fn pool_options(options: &ClientOptions) -> MySqlPoolOptions {
    let max_lifetime = options.max_lifetime();
    MySqlPoolOptions::new()
        .min_connections(DEFAULT_MIN_CONNECTIONS)
        .max_connections(options.max_connections_or_default())
        .acquire_timeout(options.connect_timeout())
        .idle_timeout(max_lifetime)
        .max_lifetime(max_lifetime)
}

/// Create the pool for `options` and ping the server once.
pub async fn connect(ctx: &Ctx, options: &ClientOptions) -> DbResult<ConnectedPool> {
    let mut connect_options = options.connect_options()?;

    let tunnel = match options.socks5_proxy.as_deref().filter(|p| !p.is_empty()) {
        Some(address) => {
            let (tunnel, local) = start_tunnel(address, &connect_options).await?;
            connect_options = local;
            Some(tunnel)
        }
        None => None,
    };

    info!(
        dsn = %options.masked_dsn(),
        max_connections = options.max_connections_or_default(),
        proxied = tunnel.is_some(),
        "Connecting to database"
    );

    let pool = pool_options(options).connect_lazy_with(connect_options);

    if let Err(e) = ctx.run("connect", ping(&pool)).await {
        pool.close().await;
        return Err(e);
    }

    if let Some(version) = server_version(&pool).await {
        info!(version = %version, "Connected to database");
    }

    Ok(ConnectedPool { pool, tunnel })
}

/// Start a forwarder to the configured server and return connect options
/// pointing at it.
async fn start_tunnel(
    address: &str,
    target: &MySqlConnectOptions,
) -> DbResult<(ProxyTunnel, MySqlConnectOptions)> {
    let proxy = Socks5Proxy::parse(address)?;

    if target.get_socket().is_some() {
        return Err(DbError::config(
            "A SOCKS5 proxy cannot be used with a unix socket connection",
        ));
    }
    let host = target.get_host();
    if host.is_empty() {
        return Err(DbError::config("A SOCKS5 proxy requires a database host"));
    }

    let tunnel = ProxyTunnel::start(proxy, host.to_string(), target.get_port()).await?;
    let local = tunnel.local_addr();
    let rewritten = target
        .clone()
        .host(&local.ip().to_string())
        .port(local.port());

    Ok((tunnel, rewritten))
}

/// Acquire a connection and ping it.
pub async fn ping(pool: &MySqlPool) -> DbResult<()> {
    let result = async {
        let mut conn = pool.acquire().await?;
        conn.ping().await
    }
    .await;

    result.map_err(|e| {
        DbError::connect(format!("Failed to connect: {}", e), connection_suggestion(&e))
    })
}

/// Get the server version from the connected database.
async fn server_version(pool: &MySqlPool) -> Option<String> {
    match sqlx::query_scalar::<_, String>("SELECT version()")
        .fetch_one(pool)
        .await
    {
        Ok(version) => Some(version),
        Err(e) => {
            warn!(error = %e, "Failed to get server version");
            None
        }
    }
}

/// Generate a helpful suggestion for connection errors.
pub fn connection_suggestion(error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();
    debug!(error = %error_str, "Deriving connection suggestion");

    if error_str.contains("connection refused") {
        return "Check that the MySQL server is running and accessible".to_string();
    }

    if error_str.contains("access denied") || error_str.contains("password") {
        return "Verify the username and password in the connection options".to_string();
    }

    if error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or set tls=false".to_string();
    }

    if matches!(error, sqlx::Error::PoolTimedOut) {
        return "The server did not answer in time; check the host, port and any proxy"
            .to_string();
    }

    "Verify the connection string format: user:pass@tcp(host:3306)/db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pool_options_defaults() {
        let pool = pool_options(&ClientOptions::default());
        assert_eq!(pool.get_max_connections(), 65535);
        assert_eq!(pool.get_min_connections(), 0);
        assert_eq!(pool.get_acquire_timeout(), Duration::from_secs(10));
        assert_eq!(pool.get_idle_timeout(), None);
        assert_eq!(pool.get_max_lifetime(), None);
    }

    #[test]
    fn test_pool_options_lifetime_sets_idle() {
        let options = ClientOptions {
            max_connections: Some(4),
            max_lifetime_secs: Some(90),
            ..ClientOptions::default()
        };
        let pool = pool_options(&options);
        assert_eq!(pool.get_max_connections(), 4);
        assert_eq!(pool.get_idle_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(pool.get_max_lifetime(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_connection_suggestion() {
        let refused = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Connection refused",
        ));
        assert!(connection_suggestion(&refused).contains("running"));
        assert!(connection_suggestion(&sqlx::Error::PoolTimedOut).contains("proxy"));
    }

    #[tokio::test]
    async fn test_proxy_rejects_unix_socket() {
        let options = ClientOptions {
            protocol: Some("unix".to_string()),
            host: Some("/tmp/mysql.sock".to_string()),
            socks5_proxy: Some("socks5://127.0.0.1:1080".to_string()),
            ..ClientOptions::default()
        };
        let err = connect(&Ctx::background(), &options).await.unwrap_err();
        assert!(matches!(err, DbError::Config { .. }));
    }

    #[tokio::test]
    async fn test_proxy_rejects_http_scheme() {
        let options = ClientOptions {
            host: Some("db".to_string()),
            socks5_proxy: Some("http://127.0.0.1:8080".to_string()),
            ..ClientOptions::default()
        };
        let err = connect(&Ctx::background(), &options).await.unwrap_err();
        assert!(matches!(err, DbError::Config { .. }));
    }

    #[tokio::test]
    async fn test_tunnel_rewrites_target() {
        let target = MySqlConnectOptions::new().host("db.internal").port(3307);
        let (tunnel, local) = start_tunnel("socks5://127.0.0.1:1", &target).await.unwrap();
        assert_eq!(local.get_host(), "127.0.0.1");
        assert_eq!(local.get_port(), tunnel.local_addr().port());
    }
}
