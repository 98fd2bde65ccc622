//! `keepsake teach` and `keepsake recall` — the direct teaching interface.

use keepsake_agent::ProcedureRecall;
use keepsake_config::AppConfig;

pub async fn teach(
    config: &AppConfig,
    name: &str,
    steps: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (coordinator, _) = super::open_session(config).await?;
    let confirmation = coordinator.teach_procedure(name.trim(), &steps).await?;
    println!("  {confirmation}");
    coordinator.shutdown().await;
    Ok(())
}

pub async fn recall(config: &AppConfig, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (coordinator, _) = super::open_session(config).await?;
    let found = coordinator.recall_procedure(name.trim()).await?;
    coordinator.shutdown().await;

    match found {
        Some(recall) => {
            print_procedure(&recall);
            Ok(())
        }
        None => Err(format!("No procedure named '{name}'").into()),
    }
}

pub(crate) fn print_procedure(recall: &ProcedureRecall) {
    println!("  How to {}:", recall.name);
    for (i, step) in recall.steps.iter().enumerate() {
        println!("    {}. {step}", i + 1);
    }
}
