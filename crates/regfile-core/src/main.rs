use anyhow::{Context, Result};
use clap::Parser;
use rvoip_regfile_core::api::console::{execute, Command};
use rvoip_regfile_core::RegfileService;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Interval;
use tracing::{info, warn};

/// Regfile: file-backed SIP registrar and call router
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Profile file with [general] settings and one section per identity
    #[arg(short, long, default_value = "regfile.toml")]
    config: PathBuf,

    /// Host timer tick period in seconds (0 disables ticking)
    #[arg(long, default_value_t = 1)]
    tick_secs: u64,

    /// Log Level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Regfile v{} starting", env!("CARGO_PKG_VERSION"));
    let service = RegfileService::from_profile_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    // The background sweeper replaces host ticks unless ticks are requested
    let mut ticker = if args.tick_secs > 0 {
        Some(tokio::time::interval(Duration::from_secs(args.tick_secs)))
    } else {
        service.start();
        None
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => match Command::parse(&line) {
                        Ok(Some(command)) => println!("{}", execute(&service, command)),
                        Ok(None) => {}
                        Err(e) => println!("error: {}", e),
                    },
                    None => {
                        info!("Input closed");
                        break;
                    }
                }
            }
            _ = next_tick(&mut ticker) => {
                service.handle_timer_tick();
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Shutdown signal received");
                break;
            }
        }
    }

    service.shutdown();
    info!("Regfile stopped");
    Ok(())
}
