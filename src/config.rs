use std::env;

pub const DEVELOPMENT_BASE_URL: &str = "http://localhost:8080";
pub const PRODUCTION_BASE_URL: &str = "https://codechat.example.com";

/// Overrides the compiled-in base URL when set.
pub const BASE_URL_ENV: &str = "CODECHAT_BASE_URL";

/// The backend base URL for this process.
///
/// The environment override wins; otherwise debug builds talk to the local
/// development server and release builds to the deployed one.
pub fn base_url() -> String {
    if let Ok(url) = env::var(BASE_URL_ENV) {
        let trimmed = url.trim_end_matches('/');
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    if cfg!(debug_assertions) {
        DEVELOPMENT_BASE_URL.to_string()
    } else {
        PRODUCTION_BASE_URL.to_string()
    }
}

/// The backend endpoints the engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiEndpoint {
    Chat,
    Search,
    ScopeSearch,
    Share,
}

impl ApiEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            ApiEndpoint::Chat => "/api/chat",
            ApiEndpoint::Search => "/api/search",
            ApiEndpoint::ScopeSearch => "/api/scope-search",
            ApiEndpoint::Share => "/api/share",
        }
    }
}

/// Full URL for an endpoint under a base.
pub fn api_url(base_url: &str, endpoint: ApiEndpoint) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), endpoint.path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(ApiEndpoint::Chat.path(), "/api/chat");
        assert_eq!(ApiEndpoint::ScopeSearch.path(), "/api/scope-search");
    }

    #[test]
    fn test_api_url_tolerates_trailing_slash() {
        assert_eq!(
            api_url("http://localhost:8080/", ApiEndpoint::Chat),
            "http://localhost:8080/api/chat"
        );
    }
}
