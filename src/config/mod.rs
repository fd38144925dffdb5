// Configuration management module
// TOML settings per configuration directory plus the interactive setup wizard

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{CONFIG_DIR_ENV, Config, ConfigError, OllamaConfig, StoreConfig};

/// Resolve the configuration directory and load the configuration from it
#[inline]
pub fn load_config(explicit_dir: Option<&std::path::Path>) -> anyhow::Result<Config> {
    let config_dir = Config::config_dir(explicit_dir)?;
    Config::load(config_dir)
}
