//! `keepsake memory` and `keepsake stats`.

use keepsake_agent::Coordinator;
use keepsake_config::AppConfig;
use keepsake_core::agent::MemoryStats;
use keepsake_core::memory::MemorySnapshot;

pub async fn export(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = open(config).await?;
    let snapshot = coordinator.export_memory().await?;
    print_snapshot(&snapshot)?;
    coordinator.shutdown().await;
    Ok(())
}

pub async fn stats(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = open(config).await?;
    let stats = coordinator.stats().await;
    println!("  Memory:      {}", config.memory.db_path().display());
    print_stats(&stats);
    coordinator.shutdown().await;
    Ok(())
}

/// A coordinator for read-only commands; the backend is never called.
async fn open(config: &AppConfig) -> Result<Coordinator, Box<dyn std::error::Error>> {
    let (coordinator, _) = super::open_session(config).await?;
    Ok(coordinator)
}

pub(crate) fn print_snapshot(snapshot: &MemorySnapshot) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(snapshot)?);
    Ok(())
}

pub(crate) fn print_stats(stats: &MemoryStats) {
    println!("  Chats:       {}", stats.interaction_count);
    println!("  Facts:       {}", stats.facts_count);
    if stats.procedures.is_empty() {
        println!("  Procedures:  (none)");
    } else {
        println!("  Procedures:  {}", stats.procedures.join(", "));
    }
    println!("  Online:      {}", if stats.online { "yes" } else { "no" });
}
