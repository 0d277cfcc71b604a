use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::settings::models::{SettingsModel, SystemPrompts};
use crate::storage::{KeyValueStore, StorageError, StorageResult};

/// Storage keys for individual settings. Each setting persists under its
/// own key so one corrupt value never takes the rest of the settings down.
mod keys {
    pub const SOURCES: &str = "settings.sources";
    pub const SELECTED_REPOSITORIES: &str = "settings.selected_repositories";
    pub const API_PROVIDER: &str = "settings.api_provider";
    pub const AZURE_API_KEY: &str = "settings.azure_api_key";
    pub const AZURE_ENDPOINT: &str = "settings.azure_endpoint";
    pub const AZURE_MODEL: &str = "settings.azure_model";
    pub const GCP_PROJECT_NAME: &str = "settings.gcp_project_name";
    pub const GCP_REGION: &str = "settings.gcp_region";
    pub const GCP_MODEL: &str = "settings.gcp_model";
    pub const TEMPERATURE: &str = "settings.temperature";
    pub const ASSISTANT_ROLE: &str = "settings.assistant_role";
    pub const SCOPE_LEARNING: &str = "settings.scope_learning";
    pub const SYSTEM_PROMPTS: &str = "system_prompts";
}

/// Loads and persists the settings model over a key-value store.
pub struct SettingsRepository {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the full model, applying the default for every missing or
    /// unreadable key.
    pub async fn load(&self) -> StorageResult<SettingsModel> {
        let defaults = SettingsModel::default();
        Ok(SettingsModel {
            sources: self
                .read(keys::SOURCES)
                .await?
                .unwrap_or(defaults.sources),
            selected_repositories: self
                .read(keys::SELECTED_REPOSITORIES)
                .await?
                .unwrap_or(defaults.selected_repositories),
            search_query: String::new(),
            api_provider: self
                .read(keys::API_PROVIDER)
                .await?
                .unwrap_or(defaults.api_provider),
            azure_api_key: self
                .read(keys::AZURE_API_KEY)
                .await?
                .unwrap_or(defaults.azure_api_key),
            azure_endpoint: self
                .read(keys::AZURE_ENDPOINT)
                .await?
                .unwrap_or(defaults.azure_endpoint),
            azure_model: self
                .read(keys::AZURE_MODEL)
                .await?
                .unwrap_or(defaults.azure_model),
            gcp_project_name: self
                .read(keys::GCP_PROJECT_NAME)
                .await?
                .unwrap_or(defaults.gcp_project_name),
            gcp_region: self
                .read(keys::GCP_REGION)
                .await?
                .unwrap_or(defaults.gcp_region),
            gcp_model: self
                .read(keys::GCP_MODEL)
                .await?
                .unwrap_or(defaults.gcp_model),
            temperature: self
                .read(keys::TEMPERATURE)
                .await?
                .unwrap_or(defaults.temperature),
            assistant_role: self
                .read(keys::ASSISTANT_ROLE)
                .await?
                .unwrap_or(defaults.assistant_role),
            scope_learning: self
                .read(keys::SCOPE_LEARNING)
                .await?
                .unwrap_or(defaults.scope_learning),
        })
    }

    /// Persist every persisted field of the model under its own key.
    pub async fn save(&self, settings: &SettingsModel) -> StorageResult<()> {
        self.write(keys::SOURCES, &settings.sources).await?;
        self.write(keys::SELECTED_REPOSITORIES, &settings.selected_repositories)
            .await?;
        self.write(keys::API_PROVIDER, &settings.api_provider)
            .await?;
        self.write(keys::AZURE_API_KEY, &settings.azure_api_key)
            .await?;
        self.write(keys::AZURE_ENDPOINT, &settings.azure_endpoint)
            .await?;
        self.write(keys::AZURE_MODEL, &settings.azure_model).await?;
        self.write(keys::GCP_PROJECT_NAME, &settings.gcp_project_name)
            .await?;
        self.write(keys::GCP_REGION, &settings.gcp_region).await?;
        self.write(keys::GCP_MODEL, &settings.gcp_model).await?;
        self.write(keys::TEMPERATURE, &settings.temperature).await?;
        self.write(keys::ASSISTANT_ROLE, &settings.assistant_role)
            .await?;
        self.write(keys::SCOPE_LEARNING, &settings.scope_learning)
            .await?;
        Ok(())
    }

    /// Toggle scope learning. Enabling it clears the configured sources;
    /// scope sessions always start from an empty source list.
    pub async fn set_scope_learning(
        &self,
        settings: &mut SettingsModel,
        enabled: bool,
    ) -> StorageResult<()> {
        settings.scope_learning = enabled;
        if enabled {
            settings.sources.clear();
            self.write(keys::SOURCES, &settings.sources).await?;
        }
        self.write(keys::SCOPE_LEARNING, &enabled).await
    }

    pub async fn load_system_prompts(&self) -> StorageResult<SystemPrompts> {
        Ok(self
            .read(keys::SYSTEM_PROMPTS)
            .await?
            .unwrap_or_default())
    }

    pub async fn save_system_prompts(&self, prompts: &SystemPrompts) -> StorageResult<()> {
        self.write(keys::SYSTEM_PROMPTS, prompts).await
    }

    /// Read one key. A corrupt value is logged and treated as absent so the
    /// caller falls back to the default rather than failing the whole load.
    async fn read<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(key, error = %err, "discarding unreadable settings value");
                Ok(None)
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let raw = serde_json::to_string(value).map_err(StorageError::Serde)?;
        self.store.put(key, raw).await
    }
}
