//! CLI command implementations.

pub mod chat;
pub mod config_cmd;
pub mod memory;
pub mod teach;

use keepsake_agent::Coordinator;
use keepsake_config::AppConfig;
use keepsake_core::generator::Generator;
use keepsake_core::memory::MemoryStore;
use keepsake_memory::SqliteStore;
use std::sync::Arc;

use crate::GlobalArgs;

/// Load the config file and apply command-line overrides on top.
pub fn load_config(globals: &GlobalArgs) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    apply_globals(&mut config, globals)?;
    Ok(config)
}

fn apply_globals(
    config: &mut AppConfig,
    globals: &GlobalArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    for pair in &globals.overrides {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Expected KEY=VALUE, got '{pair}'"))?;
        config.set(key.trim(), value.trim())?;
    }
    if let Some(db) = &globals.db {
        config.memory.path = Some(db.clone());
    }
    if globals.offline {
        config.online = false;
    }
    Ok(())
}

/// Open the memory database named by the config, creating its directory.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn MemoryStore>, Box<dyn std::error::Error>> {
    let path = config.memory.db_path();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = SqliteStore::open(&path)
        .await
        .map_err(|e| format!("Failed to open memory at {}: {e}", path.display()))?
        .with_export_limit(config.memory.export_limit);
    Ok(Arc::new(store))
}

/// Everything a chat session needs: the coordinator plus its backend.
pub async fn open_session(
    config: &AppConfig,
) -> Result<(Coordinator, Arc<dyn Generator>), Box<dyn std::error::Error>> {
    let store = open_store(config).await?;
    let generator = keepsake_providers::build_from_config(&config.backend);
    let coordinator = Coordinator::from_config(config, store, generator.clone());
    Ok((coordinator, generator))
}
