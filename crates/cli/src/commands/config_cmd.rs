//! `keepsake config` — Show the effective configuration.

use keepsake_config::AppConfig;

pub fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
