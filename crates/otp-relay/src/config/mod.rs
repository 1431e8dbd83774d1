pub mod loader;
pub mod schema;
pub mod settings;

pub use loader::{load_config, load_config_from_str};
pub use schema::{
    default_config_path, Config, FilterCriteria, MailboxConfig, StoreConfig, TelegramConfig,
};
pub use settings::SettingsSource;
