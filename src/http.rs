use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("duksu/", env!("CARGO_PKG_VERSION"));

/// Builds an HTTP client with pooled connections. Components build one and clone it;
/// `Client::clone()` shares the pool.
pub fn build_client() -> reqwest::Result<Client> {
    build_client_with_timeout(Duration::from_secs(120))
}

pub fn build_client_with_timeout(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(5)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(timeout)
        .build()
}
