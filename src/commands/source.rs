//! `stoker source list|get|apply|delete|status`
//!
//! Data-source administration against a running daemon.

use anyhow::{Context, Result};
use colored::Colorize;

use crate::client::StokerClient;
use crate::domain::data_source::Schedule;

pub async fn list(client: &StokerClient) -> Result<()> {
    let sources = client.sources().await?;

    if sources.is_empty() {
        println!("{} No data sources configured", "::".blue().bold());
        return Ok(());
    }

    println!("{}", "Data Sources".bold());
    println!();
    for source in sources {
        let state = if source.enabled {
            "enabled".green().bold()
        } else {
            "disabled".dimmed()
        };
        let schedule = match source.run_param.schedule {
            Schedule::Scheduled(p) => format!("every {}s", p.as_secs()),
            Schedule::NoSchedule(_) => "on trigger only".to_string(),
        };
        println!(
            "  {} {} ({}) — {}",
            state,
            source.id.bold(),
            source.name,
            schedule.dimmed()
        );
    }
    println!();
    Ok(())
}

pub async fn get(client: &StokerClient, id: &str) -> Result<()> {
    let source = client.source(id).await?;
    println!("{}", serde_json::to_string_pretty(&source)?);
    Ok(())
}

/// Read a descriptor JSON file (wire schema) and save it on the daemon.
pub async fn apply(client: &StokerClient, file: &str) -> Result<()> {
    let content = std::fs::read_to_string(file).with_context(|| format!("reading {}", file))?;
    let source = serde_json::from_str(&content).with_context(|| format!("parsing {}", file))?;
    client.save_source(&source).await?;
    println!("{} Data source applied", "ok".green().bold());
    Ok(())
}

pub async fn delete(client: &StokerClient, id: &str) -> Result<()> {
    client.delete_source(id).await?;
    println!("{} Data source '{}' deleted", "ok".green().bold(), id.bold());
    Ok(())
}

pub async fn status(client: &StokerClient) -> Result<()> {
    let status = client.source_status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
