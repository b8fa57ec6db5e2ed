pub mod config;
pub mod logger;
pub mod settings;

pub use config::*;
pub use logger::{set_verbose, setup_logging};
pub use settings::{
    RunConfig, SettingsFile, apply_env_to_config, apply_file_to_config, load_dotenv,
    load_settings_file,
};
