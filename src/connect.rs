//! Ordered connection strategy chain.
//!
//! Authentication environments for the document store are inconsistent in
//! practice: some deployments require mutual TLS, some infer the mechanism
//! from the client certificate alone, some sit behind a proxy with an
//! unverifiable chain, some only know username/password, and legacy ones
//! speak plaintext. Instead of nested fallback handlers, the chain is a
//! fixed declarative list tried strongest-first; the order is a contract,
//! not an implementation detail.
//!
//! Each attempt gets its own connect timeout and is only accepted after an
//! explicit liveness probe. Every attempt, successful or not, appends a
//! [`ConnectionAttemptRecord`] for diagnostics. Exhaustion is a value
//! ([`StrategyExhausted`]), never a panic: the caller substitutes a
//! degraded handle and the process keeps serving.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::certificate::MaterializedCert;
use crate::config::Config;
use crate::error::{StoreError, StrategyExhausted};
use crate::store::{RemoteStore, StoreHandle};

/// Header sent by the mutual-TLS strategy so servers that need an explicit
/// mechanism hint get one; the inferred variant omits it.
const AUTH_MECHANISM_HEADER: &str = "x-auth-mechanism";
const AUTH_MECHANISM_CLIENT_CERT: &str = "client-cert";

/// One rung of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// HTTPS with client identity and an explicit mechanism hint header.
    X509Mutual,
    /// HTTPS with client identity, no hint; for servers that infer the
    /// mechanism from the certificate alone.
    X509Inferred,
    /// HTTPS with server certificate validation disabled. Diagnostic rung
    /// for proxy/CA mismatch environments, never the default.
    RelaxedTls,
    /// HTTPS with HTTP Basic username/password.
    Password,
    /// `http://` with no credentials. Last resort.
    Plaintext,
}

/// The security gradient. Strongest and most specific first; this ordering
/// is load-bearing and covered by tests.
pub const STRATEGY_ORDER: [Strategy; 5] = [
    Strategy::X509Mutual,
    Strategy::X509Inferred,
    Strategy::RelaxedTls,
    Strategy::Password,
    Strategy::Plaintext,
];

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::X509Mutual => "x509-mutual",
            Strategy::X509Inferred => "x509-inferred",
            Strategy::RelaxedTls => "relaxed-tls",
            Strategy::Password => "password",
            Strategy::Plaintext => "plaintext",
        }
    }

    fn scheme(self) -> &'static str {
        match self {
            Strategy::Plaintext => "http",
            _ => "https",
        }
    }

    /// Whether this rung's prerequisites are satisfied. Missing
    /// prerequisites skip the rung; they do not fail the chain.
    fn applicable(self, config: &Config, cert: Option<&MaterializedCert>) -> bool {
        match self {
            Strategy::X509Mutual | Strategy::X509Inferred => cert.is_some(),
            Strategy::Password => {
                config.store.username.is_some() && config.store.password.is_some()
            }
            Strategy::RelaxedTls | Strategy::Plaintext => true,
        }
    }
}

/// Diagnostic record of one connection attempt. Appended per attempt,
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ConnectionAttemptRecord {
    pub strategy: &'static str,
    pub succeeded: bool,
    pub elapsed: Duration,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Run the chain and wrap the outcome in a [`StoreHandle`]: first success
/// wins, exhaustion becomes `Degraded` with a warning rather than an error
/// that could abort startup.
pub async fn establish(
    config: &Config,
    cert: Option<&MaterializedCert>,
) -> (StoreHandle, Vec<ConnectionAttemptRecord>) {
    let mut attempts = Vec::new();
    match run_chain(config, cert, &mut attempts).await {
        Ok(store) => (StoreHandle::Connected(store), attempts),
        Err(exhausted) => {
            warn!(
                attempted = exhausted.attempted,
                "{exhausted}; continuing in degraded mode"
            );
            (StoreHandle::Degraded, attempts)
        }
    }
}

/// Try each applicable strategy in [`STRATEGY_ORDER`] until one yields a
/// live, probed connection.
pub async fn run_chain(
    config: &Config,
    cert: Option<&MaterializedCert>,
    attempts: &mut Vec<ConnectionAttemptRecord>,
) -> Result<RemoteStore, StrategyExhausted> {
    for strategy in STRATEGY_ORDER {
        if !strategy.applicable(config, cert) {
            debug!(strategy = strategy.name(), "prerequisite missing; strategy skipped");
            continue;
        }

        let started = Instant::now();
        let result = attempt(strategy, config, cert).await;
        let elapsed = started.elapsed();

        match result {
            Ok(store) => {
                attempts.push(ConnectionAttemptRecord {
                    strategy: strategy.name(),
                    succeeded: true,
                    elapsed,
                    error: None,
                    at: Utc::now(),
                });
                match strategy {
                    Strategy::RelaxedTls => warn!(
                        "connected with server certificate validation disabled; \
                         check the store's certificate chain"
                    ),
                    Strategy::Plaintext => {
                        warn!("connected over plaintext; no transport security")
                    }
                    _ => info!(strategy = strategy.name(), "store connection established"),
                }
                return Ok(store);
            }
            Err(err) => {
                debug!(strategy = strategy.name(), "connection attempt failed: {err}");
                attempts.push(ConnectionAttemptRecord {
                    strategy: strategy.name(),
                    succeeded: false,
                    elapsed,
                    error: Some(err.to_string()),
                    at: Utc::now(),
                });
            }
        }
    }

    Err(StrategyExhausted {
        attempted: attempts.len(),
    })
}

/// One attempt: build the strategy's client, then confirm with the
/// liveness probe before accepting.
async fn attempt(
    strategy: Strategy,
    config: &Config,
    cert: Option<&MaterializedCert>,
) -> Result<RemoteStore, StoreError> {
    let client = build_client(strategy, config, cert)?;
    let base_url = format!("{}://{}", strategy.scheme(), config.store.endpoint);
    let auth = match strategy {
        Strategy::Password => Some((
            config.store.username.clone().unwrap_or_default(),
            config.store.password.clone().unwrap_or_default(),
        )),
        _ => None,
    };

    let store = RemoteStore::new(
        client,
        base_url,
        config.store.database.clone(),
        auth,
        strategy.name(),
    );
    store.ping().await?;
    Ok(store)
}

fn build_client(
    strategy: Strategy,
    config: &Config,
    cert: Option<&MaterializedCert>,
) -> Result<reqwest::Client, StoreError> {
    let timeout = Duration::from_secs(config.store.connect_timeout_secs);
    let mut builder = reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout);

    match strategy {
        Strategy::X509Mutual | Strategy::X509Inferred => {
            let cert = cert.ok_or_else(|| {
                StoreError::Transport("certificate strategy selected without a certificate".into())
            })?;
            let pem = std::fs::read(&cert.path)
                .map_err(|e| StoreError::Transport(format!("read client certificate: {e}")))?;
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| StoreError::Transport(format!("load client identity: {e}")))?;
            builder = builder.use_rustls_tls().identity(identity);

            if strategy == Strategy::X509Mutual {
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    AUTH_MECHANISM_HEADER,
                    reqwest::header::HeaderValue::from_static(AUTH_MECHANISM_CLIENT_CERT),
                );
                builder = builder.default_headers(headers);
            }
        }
        Strategy::RelaxedTls => {
            builder = builder.use_rustls_tls().danger_accept_invalid_certs(true);
        }
        Strategy::Password | Strategy::Plaintext => {}
    }

    builder
        .build()
        .map_err(|e| StoreError::Transport(format!("build http client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_strategy_order_is_the_security_gradient() {
        let names: Vec<&str> = STRATEGY_ORDER.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            [
                "x509-mutual",
                "x509-inferred",
                "relaxed-tls",
                "password",
                "plaintext"
            ]
        );
    }

    #[test]
    fn test_cert_strategies_require_certificate() {
        let config = Config::minimal("localhost:5984");
        assert!(!Strategy::X509Mutual.applicable(&config, None));
        assert!(!Strategy::X509Inferred.applicable(&config, None));
        assert!(Strategy::RelaxedTls.applicable(&config, None));
        assert!(Strategy::Plaintext.applicable(&config, None));
    }

    #[test]
    fn test_password_strategy_requires_both_credentials() {
        let mut config = Config::minimal("localhost:5984");
        assert!(!Strategy::Password.applicable(&config, None));

        config.store.username = Some("admin".to_string());
        assert!(!Strategy::Password.applicable(&config, None));

        config.store.password = Some("secret".to_string());
        assert!(Strategy::Password.applicable(&config, None));
    }

    #[test]
    fn test_only_plaintext_drops_tls() {
        for strategy in STRATEGY_ORDER {
            let expected = if strategy == Strategy::Plaintext {
                "http"
            } else {
                "https"
            };
            assert_eq!(strategy.scheme(), expected, "{:?}", strategy);
        }
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_plaintext_against_http_store() {
        let mut server = mockito::Server::new_async().await;
        let _up = server
            .mock("GET", "/_up")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"ok"}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        // host:port without scheme
        let endpoint = server.url().trim_start_matches("http://").to_string();
        let config = Config::minimal(&endpoint);

        let mut attempts = Vec::new();
        let store = run_chain(&config, None, &mut attempts).await.unwrap();
        assert_eq!(store.strategy(), "plaintext");

        // cert rungs skipped (no cert), password skipped (no credentials);
        // the relaxed-tls attempt fails against a plain http listener.
        let tried: Vec<&str> = attempts.iter().map(|a| a.strategy).collect();
        assert_eq!(tried, ["relaxed-tls", "plaintext"]);
        assert!(!attempts[0].succeeded);
        assert!(attempts[0].error.is_some());
        assert!(attempts[1].succeeded);
    }

    #[tokio::test]
    async fn test_exhaustion_is_a_value_and_degrades() {
        // reserved port, nothing listening
        let config = Config::minimal("127.0.0.1:9");

        let (handle, attempts) = establish(&config, None).await;
        assert!(handle.is_degraded());

        let tried: Vec<&str> = attempts.iter().map(|a| a.strategy).collect();
        assert_eq!(tried, ["relaxed-tls", "plaintext"]);
        assert!(attempts.iter().all(|a| !a.succeeded));
        assert!(attempts.iter().all(|a| a.error.is_some()));
    }

    #[tokio::test]
    async fn test_liveness_probe_failure_rejects_the_strategy() {
        let mut server = mockito::Server::new_async().await;
        let _up = server
            .mock("GET", "/_up")
            .with_status(503)
            .expect_at_least(1)
            .create_async()
            .await;

        let endpoint = server.url().trim_start_matches("http://").to_string();
        let config = Config::minimal(&endpoint);

        let mut attempts = Vec::new();
        let result = run_chain(&config, None, &mut attempts).await;
        assert!(result.is_err(), "socket open must not count as success");
        let plaintext = attempts.iter().find(|a| a.strategy == "plaintext").unwrap();
        assert!(!plaintext.succeeded);
    }
}
