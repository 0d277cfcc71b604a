pub mod settings_repository;

pub use settings_repository::SettingsRepository;
