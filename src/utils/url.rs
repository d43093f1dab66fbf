//! Base URL and path normalization for user-supplied provider endpoints

/// Normalize a provider base URL
///
/// Removes whitespace, repairs a scheme that lost its leading `h`,
/// adds `https://` when no scheme is present and strips trailing slashes.
pub fn normalize_base_url(raw: &str) -> String {
    let mut url: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if url.is_empty() {
        return url;
    }

    if url.starts_with("ttps://") || url.starts_with("ttp://") {
        url.insert(0, 'h');
    }

    if !url.contains("://") {
        url = format!("https://{}", url.trim_start_matches('/'));
    }

    url.trim_end_matches('/').to_string()
}

/// Ensure a request path has exactly one leading slash
pub fn normalize_path(raw: &str) -> String {
    let path = raw.trim();
    format!("/{}", path.trim_start_matches('/'))
}

/// Join a normalized base URL and a path
pub fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", normalize_base_url(base_url), normalize_path(path))
}
