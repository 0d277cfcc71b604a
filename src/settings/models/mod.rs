pub mod settings_model;
pub mod system_prompts;

pub use settings_model::{ApiProvider, SettingsModel};
pub use system_prompts::{AssistantRole, SystemPrompts};
