//! URL utilities for the model server endpoint.

/// Turn an `OLLAMA_HOST`-style value into a base URL.
///
/// A bare `host:port` gets an `http://` scheme, and a bare host gets the
/// default Ollama port.
///
/// # Examples
///
/// ```
/// use hearth::utils::url::normalize_host;
///
/// assert_eq!(normalize_host("127.0.0.1:11434"), "http://127.0.0.1:11434");
/// assert_eq!(normalize_host("https://ollama.example.com/"), "https://ollama.example.com");
/// assert_eq!(normalize_host("gpu-box"), "http://gpu-box:11434");
/// ```
pub fn normalize_host(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        return trimmed.to_string();
    }
    if has_port(trimmed) {
        format!("http://{trimmed}")
    } else {
        format!("http://{trimmed}:11434")
    }
}

fn has_port(host: &str) -> bool {
    // Bracketed IPv6 literals carry their port after the closing bracket.
    if let Some(rest) = host.strip_prefix('[') {
        return rest
            .split_once(']')
            .is_some_and(|(_, tail)| tail.starts_with(':'));
    }
    host.rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
}

/// Construct an endpoint URL from a base URL and endpoint path without
/// doubling slashes.
///
/// # Examples
///
/// ```
/// use hearth::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:11434/", "/api/chat"),
///     "http://localhost:11434/api/chat"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    format!("{base}/{endpoint}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_host_adds_scheme_and_port() {
        assert_eq!(normalize_host("localhost"), "http://localhost:11434");
        assert_eq!(normalize_host("0.0.0.0:8080"), "http://0.0.0.0:8080");
        assert_eq!(normalize_host("[::1]:11434"), "http://[::1]:11434");
        assert_eq!(normalize_host("[::1]"), "http://[::1]:11434");
    }

    #[test]
    fn normalize_host_keeps_explicit_urls() {
        assert_eq!(
            normalize_host("https://models.internal:443/"),
            "https://models.internal:443"
        );
    }

    #[test]
    fn construct_api_url_joins_cleanly() {
        assert_eq!(
            construct_api_url("http://h:1", "api/tags"),
            "http://h:1/api/tags"
        );
        assert_eq!(
            construct_api_url("http://h:1///", "//api/tags"),
            "http://h:1/api/tags"
        );
    }
}
