use serde::{Deserialize, Serialize};

use super::system_prompts::AssistantRole;
use crate::chat::models::SourceConfig;

/// Which model backend the server should route a turn to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ApiProvider {
    #[serde(rename = "Azure OpenAI")]
    AzureOpenAi,
    #[serde(rename = "Google Vertex AI")]
    GoogleVertexAi,
    #[default]
    #[serde(rename = "Built In")]
    BuiltIn,
}

impl ApiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiProvider::AzureOpenAi => "Azure OpenAI",
            ApiProvider::GoogleVertexAi => "Google Vertex AI",
            ApiProvider::BuiltIn => "Built In",
        }
    }
}

/// All user-adjustable knobs that shape a turn.
///
/// `search_query` is session-scoped scratch state and is never persisted;
/// everything else round-trips through the settings repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsModel {
    pub sources: Vec<SourceConfig>,
    pub selected_repositories: Vec<String>,
    #[serde(skip)]
    pub search_query: String,
    pub api_provider: ApiProvider,
    pub azure_api_key: String,
    pub azure_endpoint: String,
    pub azure_model: String,
    pub gcp_project_name: String,
    pub gcp_region: String,
    pub gcp_model: String,
    pub temperature: f32,
    pub assistant_role: AssistantRole,
    pub scope_learning: bool,
}

impl Default for SettingsModel {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            selected_repositories: Vec::new(),
            search_query: String::new(),
            api_provider: ApiProvider::default(),
            azure_api_key: String::new(),
            azure_endpoint: String::new(),
            azure_model: String::new(),
            gcp_project_name: String::new(),
            gcp_region: String::new(),
            gcp_model: String::new(),
            temperature: 0.7,
            assistant_role: AssistantRole::default(),
            scope_learning: false,
        }
    }
}

impl SettingsModel {
    /// Provider-specific query parameters for backend requests. Only the
    /// fields of the active provider are sent, and only when non-empty.
    pub fn provider_params(&self) -> Vec<(&'static str, String)> {
        let candidates: Vec<(&'static str, &str)> = match self.api_provider {
            ApiProvider::AzureOpenAi => vec![
                ("azure_api_key", self.azure_api_key.as_str()),
                ("azure_endpoint", self.azure_endpoint.as_str()),
                ("azure_model", self.azure_model.as_str()),
            ],
            ApiProvider::GoogleVertexAi => vec![
                ("gcp_project_name", self.gcp_project_name.as_str()),
                ("gcp_region", self.gcp_region.as_str()),
                ("gcp_model", self.gcp_model.as_str()),
            ],
            ApiProvider::BuiltIn => Vec::new(),
        };

        candidates
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| (name, value.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SettingsModel::default();
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.api_provider, ApiProvider::BuiltIn);
        assert_eq!(settings.assistant_role, AssistantRole::Custom);
        assert!(!settings.scope_learning);
    }

    #[test]
    fn test_provider_params_follow_active_provider() {
        let mut settings = SettingsModel {
            api_provider: ApiProvider::AzureOpenAi,
            azure_api_key: "key".to_string(),
            azure_model: "gpt-4.1".to_string(),
            gcp_region: "europe-west4".to_string(),
            ..Default::default()
        };

        let params = settings.provider_params();
        assert_eq!(
            params,
            vec![
                ("azure_api_key", "key".to_string()),
                ("azure_model", "gpt-4.1".to_string()),
            ]
        );

        settings.api_provider = ApiProvider::BuiltIn;
        assert!(settings.provider_params().is_empty());
    }

    #[test]
    fn test_search_query_is_not_serialized() {
        let settings = SettingsModel {
            search_query: "transient".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("transient"));
    }
}
