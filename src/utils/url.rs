//! URL utilities for building completion endpoints without doubled slashes.

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use threadline::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://example.openai.azure.com/"), "https://example.openai.azure.com");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash between them.
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Chat-completions URL for an Azure OpenAI deployment (without the
/// `api-version` query, which the client appends).
///
/// ```
/// use threadline::utils::url::deployment_chat_url;
///
/// assert_eq!(
///     deployment_chat_url("https://example.openai.azure.com/", "gpt4"),
///     "https://example.openai.azure.com/openai/deployments/gpt4/chat/completions"
/// );
/// ```
pub fn deployment_chat_url(endpoint: &str, deployment: &str) -> String {
    construct_api_url(
        endpoint,
        &format!("openai/deployments/{}/chat/completions", deployment.trim()),
    )
}
