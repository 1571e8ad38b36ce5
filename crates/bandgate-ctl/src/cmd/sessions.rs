//! Session listing and clearing commands. Both need the admin token.

use anyhow::Result;
use serde::Deserialize;

use bandgate_core::SessionStatsDto;
use bandgate_core::config::BYTES_PER_SECOND_PER_MBPS;

use super::http::{base_url, delete_json, get_json};

pub async fn cmd_sessions(port: u16, token: Option<&str>) -> Result<()> {
    let sessions: Vec<SessionStatsDto> =
        get_json(&format!("{}/bandwidth/sessions", base_url(port)), token).await?;

    if sessions.is_empty() {
        println!("No tracked sessions.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Tracked Sessions ({})", sessions.len());
    println!("═══════════════════════════════════════");

    for s in &sessions {
        let games: Vec<String> = s.active_game_ids.iter().map(|id| id.to_string()).collect();
        let peak = s.bandwidth_history.iter().copied().max().unwrap_or(0);

        println!("  ┌─ {}", s.session_id);
        println!("  │  user      : {}", s.username.as_deref().unwrap_or("-"));
        println!("  │  remote ip : {}", s.remote_ip);
        println!("  │  since     : {}", s.start_time.to_rfc3339());
        println!("  │  downloads : {} [{}]", s.active_downloads, games.join(", "));
        println!("  │  rate      : {} (peak {})", format_rate(s.current_bytes_per_second), format_rate(peak));
        println!("  └─ total     : {}", format_bytes(s.total_bytes_transferred));
    }

    Ok(())
}

pub async fn cmd_session_clear(port: u16, token: Option<&str>, session_id: &str) -> Result<()> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ClearResponse {
        session_id: String,
        cleared: bool,
    }

    let resp: ClearResponse = delete_json(
        &format!("{}/bandwidth/sessions/{}", base_url(port), session_id),
        token,
    )
    .await?;

    if resp.cleared {
        println!("✓ Session cleared: {}", resp.session_id);
    } else {
        println!("Session not tracked: {}", resp.session_id);
    }

    Ok(())
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Rates are shown in megabits, the unit the limit is configured in.
pub fn format_rate(bytes_per_second: u64) -> String {
    format!("{:.2} Mbps", bytes_per_second as f64 / BYTES_PER_SECOND_PER_MBPS as f64)
}
