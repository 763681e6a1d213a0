//! `stoker refresh [--source <id>] [--node <id>]`
//!
//! Ask the daemon to run data sources now. Scoping to a source and/or a
//! node narrows the request; the daemon answers as soon as the trigger is
//! queued, not when the runs finish.

use anyhow::Result;
use colored::Colorize;

use crate::client::StokerClient;

pub async fn run(client: &StokerClient, source: Option<&str>, node: Option<&str>) -> Result<()> {
    match (source, node) {
        (None, None) => {
            client.reload_all().await?;
            println!("{} Refresh of all data sources queued", "ok".green().bold());
        }
        (Some(source_id), None) => {
            client.reload_source(source_id).await?;
            println!(
                "{} Refresh of '{}' queued for all nodes",
                "ok".green().bold(),
                source_id.bold()
            );
        }
        (None, Some(node_id)) => {
            client.fetch_node(node_id).await?;
            println!(
                "{} Refresh of node '{}' queued for all data sources",
                "ok".green().bold(),
                node_id.bold()
            );
        }
        (Some(source_id), Some(node_id)) => {
            client.fetch_node_for(node_id, source_id).await?;
            println!(
                "{} Refresh of node '{}' queued for '{}'",
                "ok".green().bold(),
                node_id.bold(),
                source_id.bold()
            );
        }
    }
    Ok(())
}
