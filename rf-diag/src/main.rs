//! rfdiag - diagnostics service for RF bridge traffic and logs
//!
//! Serves live traffic statistics, log search and merged message queries
//! over a JSON-lines TCP socket.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rf_logs::{
    LogFileLocator, LogSearchEngine, PacketLogProvider, SystemLogProvider, TracebackConfig,
};
use rf_query::{LiveProvider, PacketLogSource, SystemLogSource, UnifiedMessageQuery};
use rf_traffic::{EventBus, TrafficService};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod dispatcher;
mod rpc;
mod server;
mod settings;

use dispatcher::Dispatcher;
use settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "rfdiag")]
#[command(about = "Diagnostics service for RF bridge traffic and logs")]
struct Cli {
    /// Settings file (defaults to settings.json in $RFDIAG_CONFIG_DIR or $XDG_CONFIG_HOME/rfdiag)
    #[arg(short, long, env = "RFDIAG_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (host:port)
    #[arg(short, long, env = "RFDIAG_LISTEN")]
    listen: Option<String>,

    /// Log file family, as ID=PATH (repeatable)
    #[arg(long = "log-path", value_name = "ID=PATH", value_parser = parse_log_path)]
    log_paths: Vec<(String, PathBuf)>,

    /// Print the effective settings as JSON and exit
    #[arg(long)]
    print_config: bool,
}

fn parse_log_path(arg: &str) -> Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((id, path)) if !id.is_empty() && !path.is_empty() => {
            Ok((id.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected ID=PATH, got '{}'", arg)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rfdiag=info,rf_traffic=info,rf_logs=info,rf_query=info,rf_protocol=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        settings.listen = listen;
    }
    settings.log_paths.extend(cli.log_paths);

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    info!("Starting rfdiag on {}", settings.listen);
    for (id, path) in &settings.log_paths {
        info!("Log path '{}' -> {}", id, path.display());
    }

    let locator = Arc::new(LogFileLocator::new(settings.log_paths.clone()));
    let traceback = TracebackConfig::new(&settings.traceback_patterns)
        .context("Invalid traceback pattern in settings")?;
    let engine = Arc::new(LogSearchEngine::new(Arc::clone(&locator), traceback));

    let bus = Arc::new(EventBus::new());
    let service = TrafficService::start(&bus, &settings.event_name, settings.traffic);

    let mut system =
        SystemLogProvider::new(Arc::clone(&locator), settings.system_log_path_id.clone());
    if let Some(prefix) = &settings.system_log_logger_prefix {
        system = system.with_logger_prefix(prefix.clone());
    }
    let query = UnifiedMessageQuery::new()
        .with_provider(Arc::new(LiveProvider::new(service.handle())))
        .with_provider(Arc::new(PacketLogSource::new(
            PacketLogProvider::new(Arc::clone(&locator), settings.packet_log_path_id.clone()),
            settings.include_rotated,
        )))
        .with_provider(Arc::new(SystemLogSource::new(system, settings.include_rotated)));

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&bus),
        settings.event_name.clone(),
        service.handle(),
        engine,
        query,
        settings.search,
    ));

    let listener = TcpListener::bind(&settings.listen)
        .await
        .with_context(|| format!("Failed to bind {}", settings.listen))?;
    info!("Listening on {}", listener.local_addr()?);

    server::serve(listener, dispatcher, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    })
    .await?;

    let aggregator = service.stop(&bus).await?;
    info!(
        "Traffic service stopped after {} messages",
        aggregator.totals().total_count
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_path() {
        assert_eq!(
            parse_log_path("packet=/var/log/packet.log").unwrap(),
            ("packet".to_string(), PathBuf::from("/var/log/packet.log"))
        );
        assert!(parse_log_path("packet").is_err());
        assert!(parse_log_path("=/tmp/x").is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "rfdiag",
            "--listen",
            "0.0.0.0:9999",
            "--log-path",
            "system=/tmp/ha.log",
            "--log-path",
            "extra=/tmp/extra.log",
        ])
        .unwrap();
        assert_eq!(cli.listen.as_deref(), Some("0.0.0.0:9999"));
        assert_eq!(cli.log_paths.len(), 2);
        assert!(!cli.print_config);
    }
}
