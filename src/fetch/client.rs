use crate::config::FetchConfig;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;

/// Redirect hops followed before a fetch is abandoned
const MAX_REDIRECTS: usize = 5;

/// Builds the HTTP client used by all of a site's workers.
///
/// TLS verification stays on; redirects are followed up to five hops;
/// compressed responses are decoded transparently.
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout)
        .connect_timeout(Duration::from_secs(5))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}
