/// Supplies the bearer token attached to backend requests.
///
/// The engine never caches tokens itself; it asks the provider on every
/// request so rotating credentials take effect immediately.
pub trait TokenProvider: Send + Sync + 'static {
    /// Returns the current token, or `None` for anonymous access.
    fn bearer_token(&self) -> Option<String>;
}

/// A provider that always hands out the same token (or none).
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}
