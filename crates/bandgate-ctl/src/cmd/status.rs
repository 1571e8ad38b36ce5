//! Daemon status command.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};
use super::sessions::format_bytes;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    sessions: usize,
    active_downloads: u64,
    total_bytes_transferred: u64,
    subscribers: usize,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port)), None).await?;

    println!("═══════════════════════════════════════");
    println!("  Bandgate Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Tracked sessions : {}", resp.sessions);
    println!("  Active downloads : {}", resp.active_downloads);
    println!("  Transferred      : {}", format_bytes(resp.total_bytes_transferred));
    println!("  Dashboards       : {}", resp.subscribers);

    Ok(())
}
