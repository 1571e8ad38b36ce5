//! bandgate-ctl: command-line interface for the bandgate daemon.

mod cmd;

use anyhow::{Context, Result};

const DEFAULT_PORT: u16 = 9101;

fn print_usage() {
    println!("Usage: bandgate-ctl [--port N] [--token T] <command>");
    println!();
    println!("Commands:");
    println!("  status                  Aggregate counters (default)");
    println!("  sessions                Per-session bandwidth (admin)");
    println!("  sessions clear <id>     Drop a session's accounting (admin)");
    println!("  help                    Show this message");
    println!();
    println!("The admin token may also be given in BANDGATE_ADMIN_TOKEN.");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_PORT;
    let mut token = std::env::var("BANDGATE_ADMIN_TOKEN")
        .ok()
        .filter(|t| !t.is_empty());
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--token" => {
                i += 1;
                token = Some(args.get(i).context("--token requires a value")?.clone());
            }
            other => remaining.push(other),
        }
        i += 1;
    }
    let token = token.as_deref();

    match remaining.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["sessions"] => cmd::sessions::cmd_sessions(port, token).await,
        ["sessions", "clear", id] => cmd::sessions::cmd_session_clear(port, token, id).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
