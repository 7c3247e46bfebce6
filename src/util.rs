use std::sync::LazyLock;

use regex::Regex;

const AGENT_ENDPOINTS: &str = "CLOUDPULSE_AGENT_ENDPOINTS";

const FORECASTER_URL: &str = "CLOUDPULSE_FORECASTER_URL";

static AUTHORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z][A-Za-z0-9+.-]*://)?(?:[^@/]*@)?([^/?#]+)")
        .expect("authority pattern is valid")
});

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("separator pattern is valid"));

/// Derive a stable node identifier from an agent endpoint.
///
/// Only the host and port take part, so `http://10.0.0.5:8080/` and
/// `10.0.0.5:8080` map to the same node (`10-0-0-5-8080`).
pub fn node_id_from_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    let authority = AUTHORITY
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map_or(trimmed, |m| m.as_str());

    NON_ALPHANUMERIC
        .replace_all(authority, "-")
        .trim_matches('-')
        .to_lowercase()
}

/// Join an endpoint and a path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub fn get_agent_endpoints() -> Option<Vec<String>> {
    let endpoints = std::env::var(AGENT_ENDPOINTS).ok()?;
    Some(
        endpoints
            .split(',')
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .map(String::from)
            .collect(),
    )
}

pub fn get_forecaster_url() -> Option<String> {
    std::env::var(FORECASTER_URL).ok()
}
